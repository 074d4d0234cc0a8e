//! crates/devotional_core/src/session.rs
//!
//! The persisted generation session: the durable record that lets a restarted
//! process notice a job that was still running when it last closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Error,
    Complete,
}

impl SessionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Error => "error",
            Self::Complete => "complete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "error" => Some(Self::Error),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot move generation session from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

/// One record per series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSession {
    pub series_id: Uuid,
    pub status: SessionStatus,
    pub total_days: u32,
    /// Sorted, de-duplicated.
    pub generated_days: Vec<u32>,
    pub title: Option<String>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationSession {
    pub fn idle(series_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            series_id,
            status: SessionStatus::Idle,
            total_days: 0,
            generated_days: Vec::new(),
            title: None,
            last_error: None,
            started_at: None,
            updated_at: now,
        }
    }

    /// `idle -> running`. Resets the generated-day set.
    pub fn start(&mut self, total_days: u32, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.require(SessionStatus::Idle, SessionStatus::Running)?;
        self.status = SessionStatus::Running;
        self.total_days = total_days;
        self.generated_days.clear();
        self.last_error = None;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Records a completed batch while running. Clears any recorded error.
    pub fn record_progress(
        &mut self,
        day_numbers: impl IntoIterator<Item = u32>,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.require(SessionStatus::Running, SessionStatus::Running)?;
        self.generated_days.extend(day_numbers);
        self.generated_days.sort_unstable();
        self.generated_days.dedup();
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            self.title = Some(title.to_string());
        }
        self.last_error = None;
        self.updated_at = now;
        Ok(())
    }

    /// `running -> complete`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.require(SessionStatus::Running, SessionStatus::Complete)?;
        self.status = SessionStatus::Complete;
        self.updated_at = now;
        Ok(())
    }

    /// `running -> error`.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.require(SessionStatus::Running, SessionStatus::Error)?;
        self.status = SessionStatus::Error;
        self.last_error = Some(message.into());
        self.updated_at = now;
        Ok(())
    }

    /// Any state back to `idle`. Used before starting a new job on a series
    /// whose previous job finished or failed.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        let series_id = self.series_id;
        *self = Self::idle(series_id, now);
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    fn require(&self, required: SessionStatus, to: SessionStatus) -> Result<(), SessionError> {
        if self.status == required {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> GenerationSession {
        let mut session = GenerationSession::idle(Uuid::new_v4(), Utc::now());
        session.start(7, Utc::now()).unwrap();
        session
    }

    #[test]
    fn test_start_records_target_and_resets_days() {
        let mut session = GenerationSession::idle(Uuid::new_v4(), Utc::now());
        session.generated_days = vec![1, 2];
        session.start(14, Utc::now()).unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.total_days, 14);
        assert!(session.generated_days.is_empty());
        assert!(session.started_at.is_some());
    }

    #[test]
    fn test_progress_merges_sorted_unique_days_and_clears_error() {
        let mut session = running();
        session.last_error = Some("stale".to_string());
        session.record_progress([3, 2], Some("Still Waters"), Utc::now()).unwrap();
        session.record_progress([2, 1], None, Utc::now()).unwrap();
        assert_eq!(session.generated_days, vec![1, 2, 3]);
        assert_eq!(session.title.as_deref(), Some("Still Waters"));
        assert!(session.last_error.is_none());
    }

    #[test]
    fn test_terminal_states_require_clear() {
        let mut session = running();
        session.fail("upstream unavailable", Utc::now()).unwrap();
        assert_eq!(session.last_error.as_deref(), Some("upstream unavailable"));

        let err = session.start(7, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: SessionStatus::Error,
                to: SessionStatus::Running
            }
        );
        assert!(session.record_progress([1], None, Utc::now()).is_err());
        assert!(session.complete(Utc::now()).is_err());

        session.clear(Utc::now());
        assert_eq!(session.status, SessionStatus::Idle);
        assert!(session.last_error.is_none());
        session.start(7, Utc::now()).unwrap();
    }

    #[test]
    fn test_complete_only_from_running() {
        let mut session = GenerationSession::idle(Uuid::new_v4(), Utc::now());
        assert!(session.complete(Utc::now()).is_err());
        session.start(3, Utc::now()).unwrap();
        session.complete(Utc::now()).unwrap();
        assert!(session.fail("late", Utc::now()).is_err());
        assert_eq!(session.status, SessionStatus::Complete);
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            SessionStatus::Idle,
            SessionStatus::Running,
            SessionStatus::Error,
            SessionStatus::Complete,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("paused"), None);
    }
}

//! services/generator/src/adapters/memory.rs
//!
//! A process-local implementation of both persistence ports. Selected with
//! `DATABASE_URL=memory` and used by the orchestration tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devotional_core::ports::{PortError, PortResult, SeriesRepository, SessionRepository};
use devotional_core::{Day, GenerationSession, Series, SessionStatus};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    series: HashMap<Uuid, Series>,
    sessions: HashMap<Uuid, GenerationSession>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn series_not_found(series_id: Uuid) -> PortError {
    PortError::NotFound(format!("Series {} not found", series_id))
}

#[async_trait]
impl SeriesRepository for MemoryStore {
    async fn create_series(&self, series: &Series) -> PortResult<()> {
        let mut tables = self.tables();
        if tables.series.contains_key(&series.id) {
            return Err(PortError::Unexpected(format!("Series {} already exists", series.id)));
        }
        tables.series.insert(series.id, series.clone());
        Ok(())
    }

    async fn get_series(&self, series_id: Uuid) -> PortResult<Series> {
        self.tables()
            .series
            .get(&series_id)
            .cloned()
            .ok_or_else(|| series_not_found(series_id))
    }

    async fn save_batch(
        &self,
        series_id: Uuid,
        title: Option<&str>,
        days: Vec<Day>,
        requested_total: Option<u32>,
    ) -> PortResult<Series> {
        let mut tables = self.tables();
        let series = tables
            .series
            .get_mut(&series_id)
            .ok_or_else(|| series_not_found(series_id))?;
        if let Some(title) = title {
            series.title = title.to_string();
        }
        if let Some(total) = requested_total {
            series.raise_total(total);
        }
        series.apply_batch(days, Utc::now());
        Ok(series.clone())
    }

    async fn mark_read(&self, series_id: Uuid, day_number: u32, at: DateTime<Utc>) -> PortResult<Day> {
        let mut tables = self.tables();
        let series = tables
            .series
            .get_mut(&series_id)
            .ok_or_else(|| series_not_found(series_id))?;
        series
            .mark_read(day_number, at)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Day {} of series {} not found", day_number, series_id)))
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn get_session(&self, series_id: Uuid) -> PortResult<Option<GenerationSession>> {
        Ok(self.tables().sessions.get(&series_id).cloned())
    }

    async fn save_session(&self, session: &GenerationSession) -> PortResult<()> {
        self.tables().sessions.insert(session.series_id, session.clone());
        Ok(())
    }

    async fn clear_session(&self, series_id: Uuid) -> PortResult<()> {
        self.tables().sessions.remove(&series_id);
        Ok(())
    }

    async fn running_sessions(&self) -> PortResult<Vec<GenerationSession>> {
        Ok(self
            .tables()
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Running)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devotional_core::{DayDuration, GenerationContext, RequesterProfile, SeriesLength};

    fn series() -> Series {
        let context = GenerationContext {
            requester: RequesterProfile {
                name: "Ada".to_string(),
                life_season: None,
                story: None,
                prayer_focus: None,
            },
            series_length: SeriesLength::Three,
            day_duration: DayDuration::FiveMinutes,
            translation: "NIV".to_string(),
            theme: None,
            devotional_type: None,
            subject: None,
            avoid_references: vec![],
        };
        Series::new(Uuid::new_v4(), context, Utc::now())
    }

    #[tokio::test]
    async fn test_save_batch_merges_and_keeps_read_days() {
        let store = MemoryStore::new();
        let series = series();
        store.create_series(&series).await.unwrap();

        store
            .save_batch(series.id, Some("Held"), vec![Day::new(1, "One", "Ps 1", "...")], None)
            .await
            .unwrap();
        store.mark_read(series.id, 1, Utc::now()).await.unwrap();

        let stored = store
            .save_batch(
                series.id,
                None,
                vec![Day::new(1, "One again", "Ps 2", "..."), Day::new(2, "Two", "Ps 3", "...")],
                Some(5),
            )
            .await
            .unwrap();

        assert_eq!(stored.title, "Held");
        assert_eq!(stored.total_days, 5);
        assert_eq!(stored.days.len(), 2);
        assert!(stored.days[0].is_read);
        assert_eq!(stored.days[0].title, "One again");
    }

    #[tokio::test]
    async fn test_missing_series_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_series(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}

//! services/generator/src/orchestrator/events.rs
//!
//! Progress events published by the job controller. Consumers subscribe to a
//! broadcast channel, so a caller whose request was collapsed into another
//! caller's job still sees that job's progress.

use devotional_core::{Day, JobError};
use serde::Serialize;
use uuid::Uuid;

pub const PHASE_READING_STORY: &str = "Reading your story";
pub const PHASE_SELECTING_SCRIPTURE: &str = "Selecting scripture";
pub const PHASE_WRITING_DEVOTIONAL: &str = "Writing your devotional";

pub fn writing_days_label(range: devotional_core::DayRange) -> String {
    format!("Writing day {}", range)
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationEvent {
    pub series_id: Uuid,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A job for this series has begun.
    Started { total_days: u32 },

    /// Cosmetic phase label.
    Phase { label: String },

    /// One completed day, emitted after its batch is stored.
    Day {
        day: Day,
        /// 0-based position within the job.
        index: usize,
        series_title: String,
    },

    Completed { generated_days: u32 },

    Failed { kind: &'static str, message: String, retriable: bool },
}

impl EventKind {
    pub fn failed(error: &JobError) -> Self {
        Self::Failed {
            kind: error.kind(),
            message: error.to_string(),
            retriable: error.is_retriable(),
        }
    }
}

//! crates/devotional_core/src/domain.rs
//!
//! Defines the pure, core data structures for devotional generation.
//! These structs are independent of any database or transport, but they are
//! serde-serializable because the same shapes travel to and from the
//! generation backend and the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::reconcile::{merge_days, MergeOutcome};

//=========================================================================================
// Series Length and Per-Day Budget
//=========================================================================================

/// The series lengths a user may choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SeriesLength {
    Three,
    Five,
    Seven,
    Fourteen,
    TwentyOne,
    Thirty,
}

impl SeriesLength {
    pub const fn days(self) -> u32 {
        match self {
            Self::Three => 3,
            Self::Five => 5,
            Self::Seven => 7,
            Self::Fourteen => 14,
            Self::TwentyOne => 21,
            Self::Thirty => 30,
        }
    }
}

impl TryFrom<u32> for SeriesLength {
    type Error = String;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        match days {
            3 => Ok(Self::Three),
            5 => Ok(Self::Five),
            7 => Ok(Self::Seven),
            14 => Ok(Self::Fourteen),
            21 => Ok(Self::TwentyOne),
            30 => Ok(Self::Thirty),
            other => Err(format!("{} is not a supported series length", other)),
        }
    }
}

impl From<SeriesLength> for u32 {
    fn from(length: SeriesLength) -> Self {
        length.days()
    }
}

/// How long a single day's reading should take. This is the per-day content
/// budget the batch planner sizes its chunks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DayDuration {
    FiveMinutes,
    TenMinutes,
    FifteenMinutes,
    TwentyMinutes,
}

impl DayDuration {
    pub const fn minutes(self) -> u32 {
        match self {
            Self::FiveMinutes => 5,
            Self::TenMinutes => 10,
            Self::FifteenMinutes => 15,
            Self::TwentyMinutes => 20,
        }
    }

    /// Short readings are cheap enough to be generated several days at a time.
    pub const fn is_small(self) -> bool {
        matches!(self, Self::FiveMinutes | Self::TenMinutes)
    }
}

impl TryFrom<u32> for DayDuration {
    type Error = String;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        match minutes {
            5 => Ok(Self::FiveMinutes),
            10 => Ok(Self::TenMinutes),
            15 => Ok(Self::FifteenMinutes),
            20 => Ok(Self::TwentyMinutes),
            other => Err(format!("{} minutes is not a supported day duration", other)),
        }
    }
}

impl From<DayDuration> for u32 {
    fn from(duration: DayDuration) -> Self {
        duration.minutes()
    }
}

//=========================================================================================
// Generation Input
//=========================================================================================

/// Who the series is written for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterProfile {
    pub name: String,
    #[serde(default)]
    pub life_season: Option<String>,
    /// Free text the user wrote about their situation.
    #[serde(default)]
    pub story: Option<String>,
    #[serde(default)]
    pub prayer_focus: Option<String>,
}

/// Immutable description of what to write. Owned by the caller and passed by
/// value into the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub requester: RequesterProfile,
    pub series_length: SeriesLength,
    pub day_duration: DayDuration,
    pub translation: String,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub devotional_type: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    /// Scripture references used by earlier series, to avoid repetition.
    #[serde(default)]
    pub avoid_references: Vec<String>,
}

//=========================================================================================
// Generated Content
//=========================================================================================

/// One unit of generated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    #[serde(default)]
    pub day_number: u32,
    pub title: String,
    /// The primary scripture reference.
    pub reference: String,
    pub body: String,
    #[serde(default)]
    pub secondary_references: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<String>,
    #[serde(default)]
    pub reflection_prompts: Vec<String>,
    #[serde(default)]
    pub context_note: Option<String>,
    #[serde(default)]
    pub closing: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl Day {
    /// A day with only the required fields set. Mostly useful in tests and
    /// prompt examples.
    pub fn new(day_number: u32, title: impl Into<String>, reference: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            day_number,
            title: title.into(),
            reference: reference.into(),
            body: body.into(),
            secondary_references: Vec::new(),
            quotes: Vec::new(),
            reflection_prompts: Vec::new(),
            context_note: None,
            closing: None,
            is_read: false,
            read_at: None,
        }
    }

    /// Marks the day read. The first read timestamp is kept.
    pub fn mark_read(&mut self, at: DateTime<Utc>) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(at);
        }
    }
}

/// An inclusive, 1-based range of day numbers requested in one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DayRange {
    pub start: u32,
    pub end: u32,
}

impl DayRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub const fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub const fn contains(&self, day_number: u32) -> bool {
        day_number >= self.start && day_number <= self.end
    }
}

impl fmt::Display for DayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// An ordered collection of days plus the declared target length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: Uuid,
    pub title: String,
    /// High-water mark; never reduced.
    pub total_days: u32,
    pub current_day: u32,
    pub context: GenerationContext,
    pub days: Vec<Day>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Series {
    /// Creates an empty series with day 1 pending.
    pub fn new(id: Uuid, context: GenerationContext, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: String::new(),
            total_days: context.series_length.days(),
            current_day: 1,
            context,
            days: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn generated_days(&self) -> u32 {
        self.days.len() as u32
    }

    /// Whether at least `total_days` days exist.
    pub fn is_complete(&self) -> bool {
        self.generated_days() >= self.total_days
    }

    pub fn day_titles(&self) -> Vec<String> {
        self.days.iter().map(|d| d.title.clone()).collect()
    }

    /// Raises the declared total when the user asked for a longer series than
    /// was originally generated. Never lowers it.
    pub fn raise_total(&mut self, requested_total: u32) {
        self.total_days = self.total_days.max(requested_total);
    }

    /// Folds a completed batch into the series through the merge rule.
    pub fn apply_batch(&mut self, incoming: Vec<Day>, now: DateTime<Utc>) {
        let MergeOutcome { days, total_days } = merge_days(&self.days, incoming, self.total_days);
        self.days = days;
        self.total_days = total_days;
        self.updated_at = now;
    }

    /// Marks a day read and moves the reading pointer past it.
    pub fn mark_read(&mut self, day_number: u32, at: DateTime<Utc>) -> Option<&Day> {
        let day = self.days.iter_mut().find(|d| d.day_number == day_number)?;
        day.mark_read(at);
        self.current_day = self.current_day.max((day_number + 1).min(self.total_days));
        self.updated_at = at;
        self.days.iter().find(|d| d.day_number == day_number)
    }
}

/// Final result of a full generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSeries {
    pub series_id: Uuid,
    pub title: String,
    pub days: Vec<Day>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_length_round_trips_through_integer() {
        let length: SeriesLength = serde_json::from_str("14").unwrap();
        assert_eq!(length, SeriesLength::Fourteen);
        assert_eq!(serde_json::to_string(&length).unwrap(), "14");
        assert!(serde_json::from_str::<SeriesLength>("4").is_err());
    }

    #[test]
    fn test_day_duration_rejects_unknown_minutes() {
        assert_eq!(DayDuration::try_from(15), Ok(DayDuration::FifteenMinutes));
        assert!(DayDuration::try_from(12).is_err());
        assert!(DayDuration::FiveMinutes.is_small());
        assert!(!DayDuration::TwentyMinutes.is_small());
    }

    #[test]
    fn test_day_deserializes_backend_shape_with_missing_optionals() {
        let json = r#"{"dayNumber": 2, "title": "Rest", "reference": "Psalm 23", "body": "..."}"#;
        let day: Day = serde_json::from_str(json).unwrap();
        assert_eq!(day.day_number, 2);
        assert!(day.quotes.is_empty());
        assert!(!day.is_read);
        assert!(day.read_at.is_none());
    }

    #[test]
    fn test_day_mark_read_keeps_first_timestamp() {
        let first = Utc::now();
        let later = first + chrono::Duration::hours(2);
        let mut day = Day::new(1, "A", "John 1", "...");
        day.mark_read(first);
        day.mark_read(later);
        assert!(day.is_read);
        assert_eq!(day.read_at, Some(first));
    }

    #[test]
    fn test_day_range_display() {
        assert_eq!(DayRange::new(1, 1).to_string(), "1");
        assert_eq!(DayRange::new(2, 7).to_string(), "2-7");
        assert_eq!(DayRange::new(2, 7).len(), 6);
    }
}

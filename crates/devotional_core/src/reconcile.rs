//! crates/devotional_core/src/reconcile.rs
//!
//! The day-merge rule. Every write of generated days into a stored series goes
//! through `merge_days`; nothing overwrites a series wholesale.

use std::collections::BTreeMap;

use crate::domain::Day;

/// Result of folding an incoming batch into the existing days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Sorted ascending by day number, one entry per day number.
    pub days: Vec<Day>,
    pub total_days: u32,
}

/// Merges `incoming` into `existing` by day number.
///
/// Incoming content replaces existing content, but read status is sticky: a
/// day that was already read keeps `is_read` and its original `read_at`.
/// Days only present on one side pass through. The declared total is a
/// high-water mark and is never reduced.
pub fn merge_days(existing: &[Day], incoming: Vec<Day>, old_total: u32) -> MergeOutcome {
    let mut merged: BTreeMap<u32, Day> = existing
        .iter()
        .map(|day| (day.day_number, day.clone()))
        .collect();

    for mut day in incoming {
        if let Some(previous) = merged.get(&day.day_number) {
            if previous.is_read {
                day.is_read = true;
                day.read_at = previous.read_at;
            }
        }
        merged.insert(day.day_number, day);
    }

    let days: Vec<Day> = merged.into_values().collect();
    let total_days = old_total.max(days.len() as u32);
    MergeOutcome { days, total_days }
}

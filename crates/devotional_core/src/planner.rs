//! crates/devotional_core/src/planner.rs
//!
//! Splits a series into the day ranges requested from the backend, one
//! network call per range.

use crate::domain::{DayDuration, DayRange};

/// Days per batch for a given per-day budget. Longer readings cost more to
/// generate, so they are requested in smaller groups.
pub const fn chunk_size(budget: DayDuration) -> u32 {
    match budget {
        DayDuration::FiveMinutes => 6,
        DayDuration::TenMinutes => 4,
        DayDuration::FifteenMinutes => 3,
        DayDuration::TwentyMinutes => 2,
    }
}

/// Plans a full series. Day 1 is always its own first batch.
pub fn plan(total_days: u32, budget: DayDuration) -> Vec<DayRange> {
    plan_from(1, total_days, budget)
}

/// Plans days `first_day..=total_days`, as used by continuations.
///
/// Day 1 is only isolated when the plan starts at day 1. Returns an empty plan
/// when there is nothing left to generate.
pub fn plan_from(first_day: u32, total_days: u32, budget: DayDuration) -> Vec<DayRange> {
    let first_day = first_day.max(1);
    if total_days < first_day {
        return Vec::new();
    }

    let mut ranges = Vec::new();
    let mut next = first_day;

    if next == 1 {
        ranges.push(DayRange::new(1, 1));
        next = 2;
        if next > total_days {
            return ranges;
        }
        if total_days <= 3 && budget.is_small() {
            ranges.push(DayRange::new(next, total_days));
            return ranges;
        }
    }

    let size = chunk_size(budget);
    while next <= total_days {
        let end = (next + size - 1).min(total_days);
        ranges.push(DayRange::new(next, end));
        next = end + 1;
    }
    ranges
}

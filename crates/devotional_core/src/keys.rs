//! crates/devotional_core/src/keys.rs
//!
//! Canonical job keys. Two requests with the same key describe the same job
//! and are collapsed into one execution.

use uuid::Uuid;

use crate::domain::{DayDuration, GenerationContext};

/// Free-text fields are cut to this many characters before keying.
const FREE_TEXT_KEY_LIMIT: usize = 200;

/// Lowercases, trims and collapses internal whitespace.
fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn normalize_free_text(value: Option<&str>) -> String {
    let normalized = normalize(value.unwrap_or_default());
    normalized.chars().take(FREE_TEXT_KEY_LIMIT).collect()
}

fn normalize_opt(value: Option<&str>) -> String {
    normalize(value.unwrap_or_default())
}

/// Key for a "generate a new series" request.
pub fn generation_key(context: &GenerationContext) -> String {
    let requester = &context.requester;
    [
        "generate".to_string(),
        normalize(&requester.name),
        context.series_length.days().to_string(),
        context.day_duration.minutes().to_string(),
        normalize(&context.translation),
        normalize_opt(context.theme.as_deref()),
        normalize_opt(context.devotional_type.as_deref()),
        normalize_opt(context.subject.as_deref()),
        normalize_opt(requester.life_season.as_deref()),
        normalize_free_text(requester.story.as_deref()),
        normalize_free_text(requester.prayer_focus.as_deref()),
    ]
    .join("|")
}

/// Key for a "continue an existing series" request.
pub fn continuation_key(
    series_id: Uuid,
    current_days: u32,
    target_total: u32,
    duration: DayDuration,
    translation: &str,
) -> String {
    format!(
        "continue|{}|{}|{}|{}|{}",
        series_id,
        current_days,
        target_total,
        duration.minutes(),
        normalize(translation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RequesterProfile, SeriesLength};

    fn context() -> GenerationContext {
        GenerationContext {
            requester: RequesterProfile {
                name: "Ada".to_string(),
                life_season: Some("new parent".to_string()),
                story: Some("Tired  and\nthankful".to_string()),
                prayer_focus: None,
            },
            series_length: SeriesLength::Seven,
            day_duration: DayDuration::TenMinutes,
            translation: "ESV".to_string(),
            theme: Some("Rest".to_string()),
            devotional_type: None,
            subject: None,
            avoid_references: vec![],
        }
    }

    #[test]
    fn test_generation_key_ignores_case_and_spacing() {
        let mut other = context();
        other.requester.name = "  ada ".to_string();
        other.requester.story = Some("tired and thankful".to_string());
        other.translation = "esv".to_string();
        assert_eq!(generation_key(&context()), generation_key(&other));
    }

    #[test]
    fn test_generation_key_distinguishes_lengths_and_themes() {
        let mut longer = context();
        longer.series_length = SeriesLength::Fourteen;
        assert_ne!(generation_key(&context()), generation_key(&longer));

        let mut themed = context();
        themed.theme = Some("Courage".to_string());
        assert_ne!(generation_key(&context()), generation_key(&themed));
    }

    #[test]
    fn test_generation_key_caps_free_text() {
        let mut a = context();
        let mut b = context();
        let prefix = "x".repeat(FREE_TEXT_KEY_LIMIT);
        a.requester.story = Some(format!("{}tail one", prefix));
        b.requester.story = Some(format!("{}tail two", prefix));
        assert_eq!(generation_key(&a), generation_key(&b));
    }

    #[test]
    fn test_generation_key_ignores_avoid_list() {
        let mut other = context();
        other.avoid_references = vec!["John 3:16".to_string()];
        assert_eq!(generation_key(&context()), generation_key(&other));
    }

    #[test]
    fn test_continuation_key_tracks_day_count() {
        let id = Uuid::new_v4();
        let a = continuation_key(id, 3, 7, DayDuration::TenMinutes, "ESV");
        let b = continuation_key(id, 3, 7, DayDuration::TenMinutes, " esv");
        let c = continuation_key(id, 4, 7, DayDuration::TenMinutes, "ESV");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

//! crates/devotional_core/src/profiles.rs
//!
//! The escalation ladder used by the degraded-retry loop. Each retry moves one
//! step down the ladder to a simpler, less personal request.

use serde::Serialize;

use crate::domain::{DayRange, GenerationContext};

/// How much of the requester's personal context goes into the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Personalization {
    Full,
    Softened,
    None,
}

/// Which instruction set the system prompt is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionSet {
    Elaborate,
    Structural,
    Essential,
}

/// One rung of the escalation ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestProfile {
    pub level: u32,
    pub name: &'static str,
    pub personalization: Personalization,
    pub include_biography: bool,
    pub instructions: InstructionSet,
}

pub const PROFILES: [RequestProfile; 3] = [
    RequestProfile {
        level: 0,
        name: "full",
        personalization: Personalization::Full,
        include_biography: true,
        instructions: InstructionSet::Elaborate,
    },
    RequestProfile {
        level: 1,
        name: "moderate",
        personalization: Personalization::Softened,
        include_biography: false,
        instructions: InstructionSet::Structural,
    },
    RequestProfile {
        level: 2,
        name: "minimal",
        personalization: Personalization::None,
        include_biography: false,
        instructions: InstructionSet::Essential,
    },
];

/// Profile for a 0-based attempt number. Attempts past the end of the ladder
/// stay on the last rung.
pub fn profile_for(attempt: u32) -> &'static RequestProfile {
    let index = (attempt as usize).min(PROFILES.len() - 1);
    &PROFILES[index]
}

/// Everything a prompt builder needs to describe one batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchPrompt<'a> {
    pub context: &'a GenerationContext,
    pub range: DayRange,
    /// Set once the first batch has named the series.
    pub series_title: Option<&'a str>,
    /// Titles of days already written, so new days do not repeat them.
    pub prior_titles: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// The wire request sent to the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            system: system.into(),
            messages: vec![ChatMessage {
                role: "user",
                content: user.into(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_escalates_and_saturates() {
        assert_eq!(profile_for(0).personalization, Personalization::Full);
        assert!(profile_for(0).include_biography);
        assert_eq!(profile_for(1).personalization, Personalization::Softened);
        assert_eq!(profile_for(2).instructions, InstructionSet::Essential);
        assert_eq!(profile_for(7), profile_for(2));

        for (index, profile) in PROFILES.iter().enumerate() {
            assert_eq!(profile.level as usize, index);
        }
    }

    #[test]
    fn test_generation_request_wire_shape() {
        let request = GenerationRequest::new("model-x", 4000, "be brief", "write day 1");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "model-x");
        assert_eq!(json["max_tokens"], 4000);
        assert_eq!(json["system"], "be brief");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "write day 1");
    }
}

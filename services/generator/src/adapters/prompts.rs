//! services/generator/src/adapters/prompts.rs
//!
//! This module contains the prompt builder, which implements the `PromptBuilder`
//! port from the core crate. Each rung of the escalation ladder gets its own
//! system instructions; the user message carries the batch and the requester's
//! context, trimmed to what the rung allows.

use devotional_core::profiles::{InstructionSet, Personalization, RequestProfile};
use devotional_core::{BatchPrompt, GenerationRequest, PromptBuilder};

const ELABORATE_INSTRUCTIONS: &str = r#"You write daily Christian devotionals for one specific reader.

Each day has a title, one primary scripture reference, a body of reflection grounded in that passage, optional secondary references, optional quotes, two or three reflection prompts, an optional short note on the historical context of the passage and a closing prayer.

Write warmly and personally. Let the reader's story shape which passages you choose and how you apply them, without repeating their details back to them."#;

const STRUCTURAL_INSTRUCTIONS: &str = r#"You write daily Christian devotionals.

Each day has a title, one primary scripture reference, a reflection on that passage, reflection prompts and a closing prayer. Keep the tone encouraging and general."#;

const ESSENTIAL_INSTRUCTIONS: &str = r#"Write short daily scripture reflections. Each day needs a title, a scripture reference and a brief reflection."#;

const OUTPUT_SCHEMA: &str = r#"Respond with ONE JSON object and nothing else:
{"title": "series title", "days": [{"dayNumber": 1, "title": "...", "reference": "...", "body": "...", "secondaryReferences": [], "quotes": [], "reflectionPrompts": [], "contextNote": null, "closing": null}]}"#;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Debug, Clone)]
pub struct TemplatePromptBuilder {
    model: String,
    max_tokens: u32,
}

impl TemplatePromptBuilder {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
        }
    }
}

impl PromptBuilder for TemplatePromptBuilder {
    fn build(&self, profile: &RequestProfile, prompt: &BatchPrompt<'_>) -> GenerationRequest {
        let system = match profile.instructions {
            InstructionSet::Elaborate => ELABORATE_INSTRUCTIONS,
            InstructionSet::Structural => STRUCTURAL_INSTRUCTIONS,
            InstructionSet::Essential => ESSENTIAL_INSTRUCTIONS,
        };
        GenerationRequest::new(&self.model, self.max_tokens, system, user_message(profile, prompt))
    }
}

//=========================================================================================
// User Message
//=========================================================================================

fn user_message(profile: &RequestProfile, prompt: &BatchPrompt<'_>) -> String {
    let context = prompt.context;
    let requester = &context.requester;
    let range = prompt.range;
    let mut lines = Vec::new();

    if range.start == range.end {
        lines.push(format!(
            "Write day {} of a {}-day devotional series.",
            range.start,
            context.series_length.days()
        ));
    } else {
        lines.push(format!(
            "Write days {} through {} of a {}-day devotional series.",
            range.start,
            range.end,
            context.series_length.days()
        ));
    }
    lines.push(format!(
        "Each day should take about {} minutes to read. Quote scripture from the {}.",
        context.day_duration.minutes(),
        context.translation
    ));

    match prompt.series_title {
        Some(title) => lines.push(format!("The series is titled \"{}\". Keep the same title.", title)),
        None => lines.push("Give the series a short title.".to_string()),
    }

    for (label, value) in [
        ("Theme", context.theme.as_deref()),
        ("Devotional style", context.devotional_type.as_deref()),
        ("Subject", context.subject.as_deref()),
    ] {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            lines.push(format!("{}: {}", label, value));
        }
    }

    match profile.personalization {
        Personalization::Full => {
            lines.push(format!("The reader's name is {}.", requester.name));
            if let Some(season) = &requester.life_season {
                lines.push(format!("Season of life: {}", season));
            }
            if profile.include_biography {
                if let Some(story) = &requester.story {
                    lines.push(format!("In their own words: {}", story));
                }
            }
            if let Some(focus) = &requester.prayer_focus {
                lines.push(format!("They are praying about: {}", focus));
            }
        }
        Personalization::Softened => {
            if let Some(season) = &requester.life_season {
                lines.push(format!("The reader is in this season of life: {}", season));
            }
        }
        Personalization::None => {}
    }

    if !prompt.prior_titles.is_empty() {
        lines.push(format!(
            "Days already written, do not repeat them: {}",
            prompt.prior_titles.join("; ")
        ));
    }
    if !context.avoid_references.is_empty() {
        lines.push(format!(
            "Avoid these primary references: {}",
            context.avoid_references.join(", ")
        ));
    }

    lines.push(OUTPUT_SCHEMA.to_string());
    lines.join("\n")
}

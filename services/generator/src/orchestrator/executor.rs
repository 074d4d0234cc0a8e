//! services/generator/src/orchestrator/executor.rs
//!
//! Runs one batch against the backend, retrying transient failures with a
//! progressively simpler request.

use devotional_core::ports::{PromptBuilder, TransportResponse};
use devotional_core::{
    profile_for, BatchPrompt, Day, DayRange, GenerationContext, GenerationError, GenerationRequest,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GenerationSettings;
use crate::orchestrator::gateway::BackendGateway;

//=========================================================================================
// Retry Policy
//=========================================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub content_filter_delay: Duration,
    pub transient_delay_step: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after `error` on the 0-based `attempt`.
    pub fn delay_for(&self, error: &GenerationError, attempt: u32) -> Duration {
        match error {
            GenerationError::ContentFilter(_) => self.content_filter_delay,
            _ => self.transient_delay_step * (attempt + 1),
        }
    }
}

impl From<&GenerationSettings> for RetryPolicy {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            content_filter_delay: settings.content_filter_delay,
            transient_delay_step: settings.transient_delay_step,
        }
    }
}

//=========================================================================================
// The Executor
//=========================================================================================

/// The days (and, on the first batch, the series title) produced by one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    pub title: String,
    pub days: Vec<Day>,
}

#[derive(Clone)]
pub struct BatchExecutor {
    gateway: BackendGateway,
    prompts: Arc<dyn PromptBuilder>,
    path: String,
    request_timeout: Duration,
    policy: RetryPolicy,
}

impl BatchExecutor {
    pub fn new(
        gateway: BackendGateway,
        prompts: Arc<dyn PromptBuilder>,
        path: impl Into<String>,
        request_timeout: Duration,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            prompts,
            path: path.into(),
            request_timeout,
            policy,
        }
    }

    /// Generates the days in `range`.
    ///
    /// The 0-based attempt number selects the request profile, so every retry
    /// escalates to a simpler request. Content-filter, upstream and network
    /// failures are retried up to `max_retries` times; anything else returns
    /// immediately.
    pub async fn execute_batch(
        &self,
        context: &GenerationContext,
        range: DayRange,
        series_title: Option<&str>,
        prior_titles: &[String],
    ) -> Result<BatchOutput, GenerationError> {
        let mut attempt = 0;
        loop {
            let profile = profile_for(attempt);
            let prompt = BatchPrompt {
                context,
                range,
                series_title,
                prior_titles,
            };
            let request = self.prompts.build(profile, &prompt);
            debug!(range = %range, attempt, profile = profile.name, "Requesting batch");

            match self.attempt(&request, range).await {
                Ok(output) => {
                    if attempt > 0 {
                        info!(range = %range, attempt, "Batch succeeded after retry");
                    }
                    return Ok(output);
                }
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(&err, attempt);
                    warn!(
                        range = %range,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Batch failed, retrying with a simpler request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(range = %range, attempt, error = %err, "Batch failed");
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, request: &GenerationRequest, range: DayRange) -> Result<BatchOutput, GenerationError> {
        let payload = serde_json::to_value(request).map_err(|e| GenerationError::Unknown(e.to_string()))?;
        let response = self.gateway.send(&self.path, &payload, self.request_timeout).await?;
        let text = response_text(&response)?;
        let batch = parse_batch(&text)?;
        into_output(batch, range)
    }
}

//=========================================================================================
// Response Handling
//=========================================================================================

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawBatch {
    #[serde(default)]
    title: String,
    #[serde(default)]
    days: Vec<Day>,
}

/// Classifies the response and extracts the model's text.
fn response_text(response: &TransportResponse) -> Result<String, GenerationError> {
    let envelope = serde_json::from_str::<Envelope>(&response.body).ok();
    let error = envelope.as_ref().and_then(|e| e.error.as_ref());
    let message = error
        .map(|e| e.message.clone())
        .unwrap_or_else(|| response.body.clone());
    let upstream_tagged = error.is_some_and(|e| matches!(e.kind.as_str(), "upstream_error" | "overloaded_error"));

    if error.is_some_and(|e| e.kind == "content_filter") {
        return Err(GenerationError::ContentFilter(message));
    }

    if !response.is_success() {
        return Err(match response.status {
            401 | 403 => GenerationError::Auth(message),
            429 => GenerationError::RateLimited(message),
            status if status >= 500 || upstream_tagged => GenerationError::Upstream { status, message },
            status => GenerationError::Unknown(format!("HTTP {}: {}", status, message)),
        });
    }

    if upstream_tagged {
        return Err(GenerationError::Upstream {
            status: response.status,
            message,
        });
    }

    match envelope {
        Some(envelope) if !envelope.content.is_empty() => {
            let text: String = envelope
                .content
                .into_iter()
                .filter(|block| block.kind == "text")
                .filter_map(|block| block.text)
                .collect();
            if text.trim().is_empty() {
                Err(GenerationError::Parse("response contained no text".to_string()))
            } else {
                Ok(text)
            }
        }
        // Some deployments return the model's JSON directly.
        _ => Ok(response.body.clone()),
    }
}

fn trailing_comma() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r",\s*([}\]])").ok()).as_ref()
}

/// Strict parse first, then one best-effort pass over the outermost object.
fn parse_batch(text: &str) -> Result<RawBatch, GenerationError> {
    let strict_error = match serde_json::from_str::<RawBatch>(text.trim()) {
        Ok(batch) => return Ok(batch),
        Err(e) => e,
    };

    let recovered = text.find('{').zip(text.rfind('}')).and_then(|(start, end)| {
        if end <= start {
            return None;
        }
        let block = &text[start..=end];
        let cleaned = match trailing_comma() {
            Some(pattern) => pattern.replace_all(block, "$1").into_owned(),
            None => block.to_string(),
        };
        serde_json::from_str::<RawBatch>(&cleaned).ok()
    });

    match recovered {
        Some(batch) => {
            debug!("Recovered batch from loosely formatted response");
            Ok(batch)
        }
        None => Err(GenerationError::Parse(strict_error.to_string())),
    }
}

/// Renumbers days to match the requested range and marks them unread.
fn into_output(batch: RawBatch, range: DayRange) -> Result<BatchOutput, GenerationError> {
    if batch.days.is_empty() {
        return Err(GenerationError::Parse(format!("no days returned for day {}", range)));
    }
    let days = batch
        .days
        .into_iter()
        .take(range.len() as usize)
        .zip(range.start..)
        .map(|(mut day, day_number)| {
            day.day_number = day_number;
            day.is_read = false;
            day.read_at = None;
            day
        })
        .collect();

    Ok(BatchOutput {
        title: batch.title.trim().to_string(),
        days,
    })
}

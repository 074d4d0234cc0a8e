//! crates/devotional_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the generation core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the storage engine, the HTTP client and the prompt text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Day, Series};
use crate::error::GenerationError;
use crate::profiles::{BatchPrompt, GenerationRequest, RequestProfile};
use crate::session::GenerationSession;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for storage and collaborator operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

#[async_trait]
pub trait SeriesRepository: Send + Sync {
    async fn create_series(&self, series: &Series) -> PortResult<()>;

    async fn get_series(&self, series_id: Uuid) -> PortResult<Series>;

    /// Folds a batch of days into the stored series using the merge rule and
    /// returns the series as stored. `title` replaces the series title when
    /// given; `requested_total` may raise, never lower, the declared total.
    async fn save_batch(
        &self,
        series_id: Uuid,
        title: Option<&str>,
        days: Vec<Day>,
        requested_total: Option<u32>,
    ) -> PortResult<Series>;

    async fn mark_read(&self, series_id: Uuid, day_number: u32, at: DateTime<Utc>) -> PortResult<Day>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get_session(&self, series_id: Uuid) -> PortResult<Option<GenerationSession>>;

    async fn save_session(&self, session: &GenerationSession) -> PortResult<()>;

    async fn clear_session(&self, series_id: Uuid) -> PortResult<()>;

    /// Sessions persisted in the `running` state.
    async fn running_sessions(&self) -> PortResult<Vec<GenerationSession>>;
}

//=========================================================================================
// Backend Ports
//=========================================================================================

/// A raw HTTP response from one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts a JSON body to `url`. Only connection-level failures are errors;
    /// any HTTP status is returned as a response.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<TransportResponse, GenerationError>;
}

pub trait PromptBuilder: Send + Sync {
    /// Builds the backend request for one batch at one escalation level.
    fn build(&self, profile: &RequestProfile, prompt: &BatchPrompt<'_>) -> GenerationRequest;
}

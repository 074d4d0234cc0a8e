//! services/generator/src/orchestrator/mod.rs
//!
//! Generation orchestration: the backend gateway, the degraded-retry batch
//! executor, job deduplication, the job controller and background auto-retry.

pub mod active;
pub mod auto_retry;
pub mod controller;
pub mod dedup;
pub mod events;
pub mod executor;
pub mod gateway;

pub use auto_retry::{AutoRetryHandle, AutoRetryPolicy, AutoRetryScheduler, AutoRetryState};
pub use controller::GenerationService;
pub use events::{EventKind, GenerationEvent};
pub use executor::{BatchExecutor, RetryPolicy};
pub use gateway::BackendGateway;

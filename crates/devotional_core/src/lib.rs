pub mod domain;
pub mod error;
pub mod keys;
pub mod planner;
pub mod ports;
pub mod profiles;
pub mod reconcile;
pub mod session;

pub use domain::{
    Day, DayDuration, DayRange, GeneratedSeries, GenerationContext, RequesterProfile, Series,
    SeriesLength,
};
pub use error::{GenerationError, JobError};
pub use ports::{
    PortError, PortResult, PromptBuilder, SeriesRepository, SessionRepository, Transport,
    TransportResponse,
};
pub use profiles::{profile_for, BatchPrompt, GenerationRequest, RequestProfile};
pub use session::{GenerationSession, SessionError, SessionStatus};

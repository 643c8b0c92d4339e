//! # Calculation Pipeline
//!
//! The calculation trigger pipeline and its supporting pieces: the activity
//! state machine behind the in-progress projections, the payload-keyed
//! response cache, and the trigger precedence model.

pub mod cache;
pub mod service;
pub mod state;
pub mod triggers;

pub use cache::CalculationCache;
pub use service::{
    CalculationError, CalculationService, QuoteRequestBuilder, ValidityHandle, ValidityKind,
};
pub use state::{ActivityProjection, ActivityState, CalculationActivity};
pub use triggers::{CalculationResponse, Trigger, TriggerKind};

#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # FormsApp Core
//!
//! Operation orchestration core for the embeddable FormsApp insurance
//! quote/claim client.
//!
//! ## Overview
//!
//! The backend aggregate behind a quote or claim form cannot tolerate
//! concurrent writes. This crate serializes every mutating operation through
//! a single-concurrency execution slot while still letting calculations
//! preempt, deduplicate, and run silently in the background - so the form
//! stays responsive without ever racing the backend.
//!
//! ## Architecture
//!
//! Two services carry the orchestration logic:
//!
//! - **OperationInstructionService**: three FIFO queues (priority,
//!   foreground, background) feeding one execution slot, with a priority
//!   bypass path, duplicate abort for calculations, and blocking-operation
//!   barriers for critical work
//! - **CalculationService**: validity-gated calculation triggers, two-tier
//!   debounce (micro-coalescing + quiet-period), a payload-keyed response
//!   cache enabling silent background calculations, and edge-triggered
//!   in-progress projections
//!
//! Everything else is a boundary: operations are supplied by the host
//! through [`operation::OperationFactory`], and outcomes surface through
//! alert, portal-message, and broadcast-event channels.
//!
//! ## Module Organization
//!
//! - [`instruction`] - Instruction model and the queueing/execution engine
//! - [`calculation`] - Calculation trigger pipeline
//! - [`operation`] - The operation capability consumed by the engine
//! - [`services`] - Application state, alerts, portal messages
//! - [`events`] - Broadcast event publishing
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling

pub mod calculation;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod instruction;
pub mod logging;
pub mod operation;
pub mod services;

pub use calculation::{
    CalculationError, CalculationResponse, CalculationService, QuoteRequestBuilder, Trigger,
    TriggerKind, ValidityHandle, ValidityKind,
};
pub use config::{ConfigManager, FormsConfig};
pub use constants::{outcomes, status_groups, system};
pub use error::{FormsCoreError, Result};
pub use events::EventPublisher;
pub use instruction::{
    ExecutionError, InstructionId, InstructionStatus, OperationArgs, OperationInstruction,
    OperationInstructionService, OperationName, OperationStatusService,
};
pub use operation::{Operation, OperationError, OperationFactory, OperationResponse};
pub use services::{
    Alert, AlertService, AlertSeverity, ApplicationState, ContextEntityLoader, FormType,
    PortalMessage, PortalMessenger,
};

//! # System Constants
//!
//! Core constants and operation groupings that define the operational
//! boundaries of the FormsApp orchestration core.
//!
//! This module keeps wire-visible strings (event names, outcome codes) in one
//! place so the host client and the core agree on vocabulary.

// Re-export instruction types for convenience
pub use crate::instruction::{InstructionStatus, OperationName};

/// Core application events published through the [`crate::events::EventPublisher`]
pub mod events {
    /// Broadcast after any HTTP-level operation failure, on a short delay,
    /// so the host UI can offer a retry prompt once alerts have rendered.
    pub const OPERATION_ERROR_PROMPT: &str = "operation.error_prompt";

    /// Fired when a bind was refused because the quote is stale; the UI is
    /// expected to run a fresh calculation cycle before retrying.
    pub const CALCULATION_RETRIGGER_REQUESTED: &str = "calculation.retrigger_requested";
}

/// Human-readable outcome codes carried on instruction completion
/// notifications. Diagnostic strings, not machine contracts.
pub mod outcomes {
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
    pub const ABORTED: &str = "aborted before completion";
    pub const REMOVED_AS_DUPLICATE: &str = "removed as duplicate";
    pub const SUPERSEDED: &str = "superseded by a newer request";
}

/// Operation groupings used for completion side effects
pub mod status_groups {
    use super::OperationName;

    /// Operations that conclude a workflow and hand control back to the host
    /// portal (save-initiated message, close-button relabel).
    pub const WORKFLOW_COMPLETION_OPERATIONS: [OperationName; 5] = [
        OperationName::Policy,
        OperationName::Submission,
        OperationName::Invoice,
        OperationName::Bind,
        OperationName::Settle,
    ];

    /// Check whether an operation concludes a workflow
    pub fn is_workflow_completion(name: OperationName) -> bool {
        WORKFLOW_COMPLETION_OPERATIONS.contains(&name)
    }
}

/// System-wide defaults and sentinels
pub mod system {
    /// Name published on the operation-in-progress channel while any
    /// priority-path operation is active, regardless of its actual name.
    pub const CALCULATION_SENTINEL: &str = "calculation";

    /// Coalescing window for near-simultaneous calculation triggers.
    pub const DEFAULT_MICRO_DEBOUNCE_MS: u64 = 20;

    /// Quiet period required before a non-immediate calculation is issued.
    pub const DEFAULT_LONG_DEBOUNCE_MS: u64 = 1500;

    /// Delay before the error-prompt event is broadcast after an HTTP failure.
    pub const DEFAULT_ERROR_PROMPT_DELAY_MS: u64 = 500;

    /// Bounded capacity of the calculation response cache.
    pub const DEFAULT_CACHE_CAPACITY: usize = 128;
}

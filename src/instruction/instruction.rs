//! Operation instruction model and status state machine.
//!
//! An [`OperationInstruction`] is one request to perform a named backend
//! operation. It is created by a caller immediately before being handed to
//! the queueing engine, carries its own completion and abort channels, and
//! is shared behind an `Arc` between the engine, the status service, and any
//! caller awaiting its outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::FormsConfig;

use super::completion::{CancellationSignal, CompletionChannel, CompletionReceiver};

static NEXT_INSTRUCTION_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic instruction identity token. Creation-ordered process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstructionId(u64);

impl InstructionId {
    fn next() -> Self {
        Self(NEXT_INSTRUCTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oi-{}", self.0)
    }
}

/// Backend operation kinds the engine knows how to sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationName {
    /// Premium/claim calculation against the backend aggregate
    Calculation,
    /// Push current form state to the backend without calculating
    FormUpdate,
    /// Issue a policy
    Policy,
    /// Submit the form for manual processing
    Submission,
    /// Raise an invoice
    Invoice,
    /// Bind cover
    Bind,
    /// Settle a claim
    Settle,
    /// Persist a workflow step transition
    WorkflowStep,
    /// Clone an expired quote into a fresh working copy
    CopyExpiredQuote,
}

impl OperationName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calculation => "calculation",
            Self::FormUpdate => "form_update",
            Self::Policy => "policy",
            Self::Submission => "submission",
            Self::Invoice => "invoice",
            Self::Bind => "bind",
            Self::Settle => "settle",
            Self::WorkflowStep => "workflow_step",
            Self::CopyExpiredQuote => "copy_expired_quote",
        }
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calculation" => Ok(Self::Calculation),
            "form_update" => Ok(Self::FormUpdate),
            "policy" => Ok(Self::Policy),
            "submission" => Ok(Self::Submission),
            "invoice" => Ok(Self::Invoice),
            "bind" => Ok(Self::Bind),
            "settle" => Ok(Self::Settle),
            "workflow_step" => Ok(Self::WorkflowStep),
            "copy_expired_quote" => Ok(Self::CopyExpiredQuote),
            _ => Err(format!("Invalid operation name: {s}")),
        }
    }
}

/// Instruction lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionStatus {
    /// Created and possibly queued, not yet executing
    Created,
    /// Occupying an execution path
    Started,
    /// Finished successfully
    Completed,
    /// Finished with a business or transport failure
    Failed,
    /// Aborted, removed as a duplicate, or superseded
    Cancelled,
}

impl InstructionStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Check if the instruction is occupying an execution path
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Started)
    }

    /// Whether a transition from `self` to `to` is legal.
    fn allows(self, to: InstructionStatus) -> bool {
        match self {
            Self::Created => matches!(
                to,
                Self::Started | Self::Cancelled | Self::Failed | Self::Completed
            ),
            Self::Started => to.is_terminal(),
            _ => false,
        }
    }
}

impl Default for InstructionStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for InstructionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Started => write!(f, "started"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for InstructionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid instruction status: {s}")),
        }
    }
}

/// Operation-specific options carried alongside the request payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationArgs {
    /// Silent operations update backend state without driving UI spinners
    #[serde(default)]
    pub silent: bool,
    /// Additional options forwarded verbatim to the operation implementation
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl OperationArgs {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct InstructionTimeline {
    status: InstructionStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

/// One request to perform a named backend operation.
#[derive(Debug)]
pub struct OperationInstruction {
    id: InstructionId,
    name: OperationName,
    destination_step_name: Option<String>,
    params: Value,
    args: OperationArgs,
    background_execution: bool,
    timeline: RwLock<InstructionTimeline>,
    completion: CompletionChannel,
    cancellation: CancellationSignal,
}

impl OperationInstruction {
    /// Build an instruction, computing its execution classification once from
    /// the operation name and the loaded configuration.
    pub fn new(
        name: OperationName,
        destination_step_name: Option<String>,
        params: Value,
        args: OperationArgs,
        config: &FormsConfig,
    ) -> Self {
        Self {
            id: InstructionId::next(),
            name,
            destination_step_name,
            params,
            args,
            background_execution: config.operations.is_background(name),
            timeline: RwLock::new(InstructionTimeline::default()),
            completion: CompletionChannel::new(),
            cancellation: CancellationSignal::new(),
        }
    }

    pub fn id(&self) -> InstructionId {
        self.id
    }

    pub fn name(&self) -> OperationName {
        self.name
    }

    pub fn destination_step_name(&self) -> Option<&str> {
        self.destination_step_name.as_deref()
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn args(&self) -> &OperationArgs {
        &self.args
    }

    /// May run without blocking the UI
    pub fn background_execution(&self) -> bool {
        self.background_execution
    }

    /// Calculation and form-update must complete before certain later
    /// operations proceed against the backend aggregate.
    pub fn is_critical(&self) -> bool {
        matches!(
            self.name,
            OperationName::Calculation | OperationName::FormUpdate
        )
    }

    /// Alias used when registering as a barrier for critical-waiting
    pub fn is_blocking_operation(&self) -> bool {
        self.is_critical()
    }

    /// A new calculation supersedes an in-flight one of the same name
    pub fn should_abort_existing_operations(&self) -> bool {
        matches!(self.name, OperationName::Calculation)
    }

    pub fn status(&self) -> InstructionStatus {
        self.timeline.read().status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.timeline.read().started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.timeline.read().ended_at
    }

    /// Subscribe to the single-fire completion notification.
    pub fn subscribe_completion(&self) -> CompletionReceiver {
        self.completion.subscribe()
    }

    pub fn completion_outcome(&self) -> Option<String> {
        self.completion.outcome()
    }

    /// Handle to the cooperative abort signal, passed into the operation.
    pub fn cancellation(&self) -> CancellationSignal {
        self.cancellation.clone()
    }

    /// Raise the abort signal. No-op once the completion has fired.
    pub fn abort(&self) {
        if self.completion.has_fired() {
            return;
        }
        self.cancellation.cancel();
    }

    /// Mark the instruction as occupying an execution path.
    pub fn mark_started(&self) {
        let mut timeline = self.timeline.write();
        if !timeline.status.allows(InstructionStatus::Started) {
            warn!(
                instruction_id = %self.id,
                operation = %self.name,
                status = %timeline.status,
                "Refusing illegal transition to started"
            );
            return;
        }
        timeline.status = InstructionStatus::Started;
        timeline.started_at = Some(Utc::now());
    }

    /// Terminal transition: completed. Fires the completion notification.
    pub fn complete_with(&self, outcome: &str) {
        self.finish(InstructionStatus::Completed, outcome);
    }

    /// Terminal transition: failed. Fires the completion notification.
    pub fn fail_with(&self, outcome: &str) {
        self.finish(InstructionStatus::Failed, outcome);
    }

    /// Terminal transition: cancelled. Fires the completion notification.
    pub fn cancel_with(&self, outcome: &str) {
        self.finish(InstructionStatus::Cancelled, outcome);
    }

    fn finish(&self, status: InstructionStatus, outcome: &str) {
        {
            let mut timeline = self.timeline.write();
            if !timeline.status.allows(status) {
                warn!(
                    instruction_id = %self.id,
                    operation = %self.name,
                    from = %timeline.status,
                    to = %status,
                    "Refusing illegal terminal transition"
                );
                return;
            }
            timeline.status = status;
            timeline.ended_at = Some(Utc::now());
        }
        self.completion.fire(outcome);
    }
}

//! # Operation Instruction Queueing/Execution Engine
//!
//! Guarantees that mutating backend operations occur one at a time (the
//! backend aggregate cannot tolerate concurrent writes), while allowing
//! calculations to preempt via a priority bypass path, be deduplicated by
//! name, and run silently in the background.
//!
//! ## Scheduling model
//!
//! Three FIFO queues (priority, foreground, background) feed one execution
//! slot. The scheduler is self-triggering: every completion re-invokes
//! [`OperationInstructionService::check_and_process_queue`], so draining is
//! exhaustive without polling. Priority-path instructions bypass the slot
//! entirely; while any is in flight the scheduler refuses to start slot
//! work.
//!
//! ## Known limitation
//!
//! No timeout is modeled. A hung operation blocks the slot indefinitely;
//! recovery is the embedding host's responsibility.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::FormsConfig;
use crate::constants::{events, outcomes, status_groups};
use crate::events::EventPublisher;
use crate::operation::{
    OperationError, OperationFactory, OperationResponse, TransportErrorKind, TransportFailure,
};
use crate::operation::types::SUCCESS_STATUS;
use crate::services::{Alert, AlertService, ApplicationState, ContextEntityLoader, PortalMessenger};

use super::completion::CompletionReceiver;
use super::instruction::{InstructionId, OperationInstruction, OperationName};
use super::status_service::OperationStatusService;

/// Errors surfaced to callers that await the underlying execution result
/// (priority and foreground paths). Queued background callers never see
/// these; their failures go through the alert/broadcast side channels only.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Backend accepted the request but rejected it at the business level
    #[error("operation rejected with status '{0}'")]
    Business(String),

    /// HTTP-level failure
    #[error("transport failure: {}", .0.kind)]
    Transport(TransportFailure),

    /// Code-level failure inside the operation implementation
    #[error(transparent)]
    Operation(#[from] OperationError),
}

/// Result of executing one instruction: the success payload, or `None` for
/// cancellations and queued-background completions.
pub type ExecutionResult = Result<Option<Value>, ExecutionError>;

struct QueuedEntry {
    instruction: Arc<OperationInstruction>,
    /// Present for foreground callers awaiting the underlying result
    responder: Option<oneshot::Sender<ExecutionResult>>,
}

#[derive(Default)]
struct InstructionQueues {
    priority: VecDeque<QueuedEntry>,
    foreground: VecDeque<QueuedEntry>,
    background: VecDeque<QueuedEntry>,
}

/// Pairs a blocking instruction with its completion subscription, so later
/// critical instructions can await it as a barrier.
struct BlockingRecord {
    instruction: Arc<OperationInstruction>,
    completion: CompletionReceiver,
}

/// The queueing/execution engine
pub struct OperationInstructionService {
    id: Uuid,
    config: Arc<FormsConfig>,
    factory: Arc<dyn OperationFactory>,
    app: Arc<ApplicationState>,
    status: Arc<OperationStatusService>,
    alerts: Arc<AlertService>,
    events: EventPublisher,
    messenger: PortalMessenger,
    context_entities: Option<Arc<dyn ContextEntityLoader>>,
    queues: Mutex<InstructionQueues>,
    blocking: Mutex<Vec<BlockingRecord>>,
}

impl OperationInstructionService {
    pub fn new(
        config: Arc<FormsConfig>,
        factory: Arc<dyn OperationFactory>,
        app: Arc<ApplicationState>,
        alerts: Arc<AlertService>,
        events: EventPublisher,
        messenger: PortalMessenger,
    ) -> Self {
        let status = Arc::new(OperationStatusService::new(app.clone()));
        Self {
            id: Uuid::new_v4(),
            config,
            factory,
            app,
            status,
            alerts,
            events,
            messenger,
            context_entities: None,
            queues: Mutex::new(InstructionQueues::default()),
            blocking: Mutex::new(Vec::new()),
        }
    }

    /// Attach the host's context entity loader. Chainable before the service
    /// is shared.
    pub fn context_entity_loader(mut self, loader: Arc<dyn ContextEntityLoader>) -> Self {
        self.context_entities = Some(loader);
        self
    }

    /// Shared execution status tracking (read-only for callers)
    pub fn status(&self) -> Arc<OperationStatusService> {
        self.status.clone()
    }

    /// Current queue depths (priority, foreground, background)
    pub fn queue_depths(&self) -> (usize, usize, usize) {
        let queues = self.queues.lock();
        (
            queues.priority.len(),
            queues.foreground.len(),
            queues.background.len(),
        )
    }

    /// Execute an instruction, honoring its execution classification.
    ///
    /// Background instructions resolve when the instruction completes,
    /// whatever the outcome; their failures surface only through the alert
    /// and broadcast side channels. Priority and foreground paths return the
    /// underlying execution result, which does propagate failures.
    pub async fn execute(
        self: &Arc<Self>,
        instruction: Arc<OperationInstruction>,
        priority: bool,
    ) -> ExecutionResult {
        // Critical instructions must not race prior blocking work against
        // the backend aggregate.
        if instruction.is_critical() {
            self.wait_for_blocking_operations_to_complete().await;
        }

        if instruction.background_execution() {
            self.register_blocking(&instruction);

            let run_now = priority
                && match self.status.executing_instruction() {
                    None => true,
                    Some(executing) => executing.name() == OperationName::Calculation,
                };
            if run_now {
                return self.execute_priority_operation(instruction).await;
            }

            let (responder, receiver) = oneshot::channel();
            {
                let mut queues = self.queues.lock();
                let entry = QueuedEntry {
                    instruction: instruction.clone(),
                    responder: Some(responder),
                };
                if priority {
                    queues.priority.push_back(entry);
                } else {
                    queues.background.push_back(entry);
                }
            }
            debug!(
                service_id = %self.id,
                instruction_id = %instruction.id(),
                operation = %instruction.name(),
                priority = priority,
                "Queued background instruction"
            );
            self.check_and_process_queue();

            // Background callers resolve on completion whatever the outcome;
            // failures have already been surfaced through the side channels.
            return match receiver.await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(error)) => {
                    debug!(
                        instruction_id = %instruction.id(),
                        error = %error,
                        "Background instruction settled with failure"
                    );
                    Ok(None)
                }
                Err(_) => Ok(None),
            };
        }

        if priority {
            return self.execute_priority_operation(instruction).await;
        }

        let (responder, receiver) = oneshot::channel();
        {
            let mut queues = self.queues.lock();
            queues.foreground.push_back(QueuedEntry {
                instruction: instruction.clone(),
                responder: Some(responder),
            });
        }
        debug!(
            service_id = %self.id,
            instruction_id = %instruction.id(),
            operation = %instruction.name(),
            "Queued foreground instruction"
        );
        self.check_and_process_queue();

        match receiver.await {
            Ok(result) => result,
            // The engine dropped the entry without executing it.
            Err(_) => Ok(None),
        }
    }

    /// Execute a batch in order, stopping the chain once any instruction in
    /// the batch has reached Failed status.
    pub async fn execute_all(self: &Arc<Self>, instructions: &[Arc<OperationInstruction>]) {
        for instruction in instructions {
            if instructions.iter().any(|i| i.status().is_failed()) {
                info!(
                    "Skipping remaining instructions: an instruction in this batch has failed"
                );
                break;
            }
            if let Err(error) = self.execute(instruction.clone(), false).await {
                warn!(
                    instruction_id = %instruction.id(),
                    operation = %instruction.name(),
                    error = %error,
                    "Batch instruction failed"
                );
            }
        }
    }

    /// Abort the calculation currently executing (slot or priority path) and
    /// delete any queued calculations, firing their completion with the
    /// removed-as-duplicate outcome. Called before a fresh calculation is
    /// issued so a stale in-flight one never races it.
    pub fn abort_executing_and_delete_queued_calculation_operations(&self) {
        if let Some(executing) = self.status.executing_instruction() {
            if executing.name() == OperationName::Calculation {
                executing.abort();
            }
        }
        for instruction in self.status.priority_snapshot() {
            if instruction.name() == OperationName::Calculation {
                instruction.abort();
            }
        }

        let removed = self.remove_queued_by_name(OperationName::Calculation, None);
        for entry in removed {
            debug!(
                instruction_id = %entry.instruction.id(),
                "Removing queued calculation as duplicate"
            );
            entry.instruction.cancel_with(outcomes::REMOVED_AS_DUPLICATE);
            self.release_blocking(entry.instruction.id());
            if let Some(responder) = entry.responder {
                let _ = responder.send(Ok(None));
            }
        }
    }

    /// Start the next queued instruction if the slot is free and no priority
    /// operation is in flight. Self-rescheduling: every execution's
    /// continuation re-invokes this.
    pub fn check_and_process_queue(self: &Arc<Self>) {
        let entry = {
            let mut queues = self.queues.lock();
            if self.status.operation_in_progress() || self.status.any_priority_in_progress() {
                return;
            }
            let Some(entry) = queues
                .priority
                .pop_front()
                .or_else(|| queues.foreground.pop_front())
                .or_else(|| queues.background.pop_front())
            else {
                return;
            };
            // Claim the slot under the queue lock so concurrent scheduler
            // invocations cannot both start work.
            self.status.set_executing(Some(entry.instruction.clone()));
            entry
        };

        if entry.instruction.should_abort_existing_operations() {
            self.abort_duplicates_of(&entry.instruction);
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.do_execute(entry.instruction.clone()).await;
            if let Some(responder) = entry.responder {
                let _ = responder.send(result);
            }
            service.status.set_executing(None);
            service.check_and_process_queue();
        });
    }

    /// Execute via the priority bypass path, preempting slot-based work.
    async fn execute_priority_operation(
        self: &Arc<Self>,
        instruction: Arc<OperationInstruction>,
    ) -> ExecutionResult {
        self.status.push_priority(instruction.clone());
        debug!(
            instruction_id = %instruction.id(),
            operation = %instruction.name(),
            "Executing via priority path"
        );

        // A priority operation supersedes in-flight work of the same name.
        if let Some(executing) = self.status.executing_instruction() {
            if executing.id() != instruction.id() && executing.name() == instruction.name() {
                executing.abort();
            }
        }
        for other in self.status.priority_snapshot() {
            if other.id() != instruction.id() && other.name() == instruction.name() {
                other.abort();
            }
        }

        let result = self.do_execute(instruction.clone()).await;
        self.status.remove_priority(instruction.id());
        // A priority completion may unblock the main queue.
        self.check_and_process_queue();
        result
    }

    /// Await completion of all tracked blocking instructions not yet in a
    /// terminal state. The registry is cleared wholesale: only this check's
    /// caller observes the drained records.
    async fn wait_for_blocking_operations_to_complete(&self) {
        let records: Vec<BlockingRecord> = {
            let mut blocking = self.blocking.lock();
            blocking.drain(..).collect()
        };
        for record in records {
            if record.instruction.status().is_terminal() {
                continue;
            }
            debug!(
                instruction_id = %record.instruction.id(),
                operation = %record.instruction.name(),
                "Waiting for blocking operation to settle"
            );
            // Failures are tolerated here; the barrier only needs settlement.
            let outcome = record.completion.wait().await;
            debug!(
                instruction_id = %record.instruction.id(),
                outcome = %outcome,
                "Blocking operation settled"
            );
        }
    }

    fn register_blocking(&self, instruction: &Arc<OperationInstruction>) {
        if !instruction.is_blocking_operation() {
            return;
        }
        let record = BlockingRecord {
            instruction: instruction.clone(),
            completion: instruction.subscribe_completion(),
        };
        self.blocking.lock().push(record);
    }

    fn release_blocking(&self, id: InstructionId) {
        self.blocking
            .lock()
            .retain(|record| record.instruction.id() != id);
    }

    /// Remove and abort duplicates of an instruction about to start.
    fn abort_duplicates_of(&self, target: &Arc<OperationInstruction>) {
        let removed = self.remove_queued_by_name(target.name(), Some(target.id()));
        for entry in removed {
            entry.instruction.cancel_with(outcomes::REMOVED_AS_DUPLICATE);
            self.release_blocking(entry.instruction.id());
            if let Some(responder) = entry.responder {
                let _ = responder.send(Ok(None));
            }
        }
        if let Some(executing) = self.status.executing_instruction() {
            if executing.id() != target.id() && executing.name() == target.name() {
                executing.abort();
            }
        }
        for instruction in self.status.priority_snapshot() {
            if instruction.id() != target.id() && instruction.name() == target.name() {
                instruction.abort();
            }
        }
    }

    fn remove_queued_by_name(
        &self,
        name: OperationName,
        excluding: Option<InstructionId>,
    ) -> Vec<QueuedEntry> {
        fn drain(
            queue: &mut VecDeque<QueuedEntry>,
            name: OperationName,
            excluding: Option<InstructionId>,
            removed: &mut Vec<QueuedEntry>,
        ) {
            let mut kept = VecDeque::with_capacity(queue.len());
            while let Some(entry) = queue.pop_front() {
                let matches = entry.instruction.name() == name
                    && excluding.map_or(true, |id| entry.instruction.id() != id);
                if matches {
                    removed.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            *queue = kept;
        }

        let mut removed = Vec::new();
        let mut queues = self.queues.lock();
        drain(&mut queues.priority, name, excluding, &mut removed);
        drain(&mut queues.foreground, name, excluding, &mut removed);
        drain(&mut queues.background, name, excluding, &mut removed);
        removed
    }

    /// Run one instruction to a terminal status.
    async fn do_execute(&self, instruction: Arc<OperationInstruction>) -> ExecutionResult {
        instruction.mark_started();
        debug!(
            instruction_id = %instruction.id(),
            operation = %instruction.name(),
            "Executing instruction"
        );

        let operation = self.factory.create(instruction.name());
        let cancellation = instruction.cancellation();

        let response = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                info!(
                    instruction_id = %instruction.id(),
                    operation = %instruction.name(),
                    "Instruction aborted"
                );
                instruction.cancel_with(outcomes::ABORTED);
                return Ok(None);
            }
            response = operation.execute(
                instruction.params().clone(),
                instruction.args(),
                instruction.id(),
                cancellation.clone(),
            ) => response,
        };

        match response {
            Ok(OperationResponse::Success { status, payload }) if status == SUCCESS_STATUS => {
                self.apply_completion_side_effects(&instruction);
                instruction.complete_with(outcomes::COMPLETED);
                Ok(Some(payload))
            }
            Ok(OperationResponse::Success { status, .. }) => {
                warn!(
                    instruction_id = %instruction.id(),
                    operation = %instruction.name(),
                    status = %status,
                    "Operation rejected at the business level"
                );
                instruction.fail_with(&format!("rejected with status '{status}'"));
                Err(ExecutionError::Business(status))
            }
            Ok(OperationResponse::Error(failure)) => {
                self.surface_transport_failure(&instruction, &failure);
                instruction.fail_with(outcomes::FAILED);
                Err(ExecutionError::Transport(failure))
            }
            Ok(OperationResponse::Skipped) => {
                debug!(
                    instruction_id = %instruction.id(),
                    "Operation determined it was redundant"
                );
                instruction.cancel_with(outcomes::SUPERSEDED);
                Ok(None)
            }
            Err(error) => {
                self.surface_operation_error(&instruction, &error);
                instruction.fail_with(outcomes::FAILED);
                Err(ExecutionError::Operation(error))
            }
        }
    }

    /// Side effects applied after a successful, non-cancelled completion.
    fn apply_completion_side_effects(&self, instruction: &Arc<OperationInstruction>) {
        let name = instruction.name();

        if status_groups::is_workflow_completion(name) {
            self.messenger.save_initiated(name);
            if let Some(step) = instruction.destination_step_name() {
                if let Some(label) = self.config.text_elements.close_button_label(step) {
                    self.messenger.close_button_label(label);
                }
            }
        }

        let rules = self.config.context_entities.rules_for(self.app.form_type());
        if rules.should_reload_for(name) {
            if let Some(loader) = &self.context_entities {
                let loader = Arc::clone(loader);
                tokio::spawn(async move {
                    if let Err(error) = loader.load_context_entities().await {
                        warn!(error = %error, "Context entity reload failed");
                    }
                });
            }
        }
    }

    fn surface_transport_failure(
        &self,
        instruction: &Arc<OperationInstruction>,
        failure: &TransportFailure,
    ) {
        let name = instruction.name();
        let alert = match &failure.kind {
            TransportErrorKind::ProblemDetails(details) => Alert::error(
                details.title.clone(),
                details.detail.clone().unwrap_or_default(),
            ),
            TransportErrorKind::ServerError(_) => Alert::error(
                "Something went wrong",
                "The service is temporarily unavailable. Please try again.",
            ),
            TransportErrorKind::Other(code) => Alert::error(
                "Request failed",
                format!("The request was rejected (HTTP {code})."),
            ),
        };
        self.alerts.display(alert.for_operation(name));

        self.events.publish_delayed(
            events::OPERATION_ERROR_PROMPT,
            json!({
                "operation": name.as_str(),
                "instruction_id": instruction.id().value(),
            }),
            Duration::from_millis(self.config.operations.error_prompt_delay_ms),
        );
    }

    fn surface_operation_error(
        &self,
        instruction: &Arc<OperationInstruction>,
        error: &OperationError,
    ) {
        let name = instruction.name();
        match error {
            OperationError::PaymentProvider { provider, message } => {
                warn!(provider = %provider, message = %message, "Payment provider error");
                self.alerts.display(
                    Alert::error(
                        "Payment could not be processed",
                        "Your payment was not taken. Please check your details and try again.",
                    )
                    .for_operation(name),
                );
            }
            OperationError::BindNotPermitted { code, message } => {
                warn!(code = %code, message = %message, "Bind not permitted");
                self.events.publish(
                    events::CALCULATION_RETRIGGER_REQUESTED,
                    json!({ "code": code }),
                );
                self.alerts.display(
                    Alert::error(
                        "Bind not permitted",
                        "The quote has changed and must be recalculated before binding.",
                    )
                    .for_operation(name),
                );
            }
            OperationError::Named {
                name: error_name,
                message,
            } => {
                self.alerts
                    .display(Alert::error(error_name.clone(), message.clone()).for_operation(name));
            }
            OperationError::Other(error) => {
                self.alerts.display(
                    Alert::error("Something went wrong", error.to_string()).for_operation(name),
                );
            }
        }
    }
}

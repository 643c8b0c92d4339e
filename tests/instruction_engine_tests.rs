//! Integration tests for the operation instruction queueing/execution engine:
//! slot serialization, priority preemption, calculation dedup, blocking
//! barriers, batch short-circuiting, and failure side channels.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use formsapp_core::config::{FormsConfig, WorkflowTextElements};
use formsapp_core::constants::{events as event_names, outcomes};
use formsapp_core::instruction::{ExecutionError, InstructionStatus, OperationName};
use formsapp_core::operation::OperationError;
use formsapp_core::services::PortalMessage;

use common::{settle, Behavior, Gate, TestHarness};

fn spawn_execute(
    harness: &TestHarness,
    instruction: &Arc<formsapp_core::instruction::OperationInstruction>,
    priority: bool,
) -> tokio::task::JoinHandle<formsapp_core::instruction::ExecutionResult> {
    let engine = harness.engine.clone();
    let instruction = instruction.clone();
    tokio::spawn(async move { engine.execute(instruction, priority).await })
}

#[tokio::test(start_paused = true)]
async fn test_single_concurrency_slot_serializes_background_work() {
    let mut config = FormsConfig::default();
    config
        .operations
        .background_operations
        .push(OperationName::WorkflowStep);
    let harness = TestHarness::with_config(config);

    let gate = Gate::new();
    harness.factory.script(
        OperationName::WorkflowStep,
        Behavior::Hold(gate.clone(), json!({})),
    );

    let first = harness.instruction(OperationName::WorkflowStep);
    let second = harness.instruction(OperationName::WorkflowStep);
    let first_task = spawn_execute(&harness, &first, false);
    let second_task = spawn_execute(&harness, &second, false);
    settle().await;

    // Only one instruction may hold the slot; the other stays queued.
    assert_eq!(harness.log.total(), 1);
    assert_eq!(first.status(), InstructionStatus::Started);
    assert_eq!(second.status(), InstructionStatus::Created);

    gate.release();
    settle().await;
    assert_eq!(harness.log.total(), 2);
    assert_eq!(second.status(), InstructionStatus::Started);

    gate.release();
    first_task.await.unwrap().unwrap();
    second_task.await.unwrap().unwrap();
    assert_eq!(first.status(), InstructionStatus::Completed);
    assert_eq!(second.status(), InstructionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_priority_path_preempts_occupied_slot() {
    let harness = TestHarness::new();
    let gate = Gate::new();
    harness
        .factory
        .script(OperationName::Bind, Behavior::Hold(gate.clone(), json!({})));

    let bind = harness.instruction(OperationName::Bind);
    let bind_task = spawn_execute(&harness, &bind, false);
    settle().await;
    assert_eq!(bind.status(), InstructionStatus::Started);
    assert_eq!(
        harness.app.operation_in_progress().as_deref(),
        Some("bind")
    );

    // A priority foreground instruction bypasses the slot entirely.
    let policy = harness.instruction(OperationName::Policy);
    let result = harness.engine.execute(policy.clone(), true).await;
    assert!(result.is_ok());
    assert_eq!(policy.status(), InstructionStatus::Completed);

    // The slot occupant was not disturbed.
    assert_eq!(bind.status(), InstructionStatus::Started);
    assert_eq!(
        harness.log.names(),
        vec![OperationName::Bind, OperationName::Policy]
    );

    gate.release();
    bind_task.await.unwrap().unwrap();
    assert_eq!(bind.status(), InstructionStatus::Completed);
    assert_eq!(harness.app.operation_in_progress(), None);
}

#[tokio::test(start_paused = true)]
async fn test_priority_sentinel_published_while_priority_op_runs() {
    let harness = TestHarness::new();
    let gate = Gate::new();
    harness.factory.script(
        OperationName::Calculation,
        Behavior::Hold(gate.clone(), json!({})),
    );

    let calc = harness.instruction(OperationName::Calculation);
    let calc_task = spawn_execute(&harness, &calc, true);
    settle().await;

    assert_eq!(calc.status(), InstructionStatus::Started);
    assert_eq!(
        harness.app.operation_in_progress().as_deref(),
        Some("calculation")
    );

    gate.release();
    calc_task.await.unwrap().unwrap();
    assert_eq!(harness.app.operation_in_progress(), None);
}

#[tokio::test(start_paused = true)]
async fn test_queued_calculation_removed_as_duplicate() {
    let harness = TestHarness::new();
    let gate = Gate::new();
    harness
        .factory
        .script(OperationName::Bind, Behavior::Hold(gate.clone(), json!({})));

    let bind = harness.instruction(OperationName::Bind);
    let bind_task = spawn_execute(&harness, &bind, false);
    settle().await;

    // Slot is busy with a non-calculation, so a priority calculation queues.
    let stale = harness.instruction(OperationName::Calculation);
    let stale_task = spawn_execute(&harness, &stale, true);
    settle().await;
    assert_eq!(harness.engine.queue_depths().0, 1);
    assert_eq!(stale.status(), InstructionStatus::Created);

    // A fresh calculation clears stale ones before being issued.
    harness
        .engine
        .abort_executing_and_delete_queued_calculation_operations();
    settle().await;

    assert_eq!(stale.status(), InstructionStatus::Cancelled);
    assert_eq!(
        stale.completion_outcome().as_deref(),
        Some(outcomes::REMOVED_AS_DUPLICATE)
    );
    assert!(stale_task.await.unwrap().unwrap().is_none());
    assert_eq!(harness.engine.queue_depths().0, 0);

    let fresh = harness.instruction(OperationName::Calculation);
    let fresh_task = spawn_execute(&harness, &fresh, true);
    settle().await;

    gate.release();
    settle().await;
    bind_task.await.unwrap().unwrap();
    fresh_task.await.unwrap().unwrap();
    assert_eq!(fresh.status(), InstructionStatus::Completed);
    // The stale calculation never reached the network.
    assert_eq!(harness.log.count_for(OperationName::Calculation), 1);
}

#[tokio::test(start_paused = true)]
async fn test_executing_calculation_aborted_by_fresh_submission() {
    let harness = TestHarness::new();
    let gate = Gate::new();
    harness.factory.script(
        OperationName::Calculation,
        Behavior::Hold(gate.clone(), json!({"premium": 1})),
    );

    let stale = harness.instruction(OperationName::Calculation);
    let stale_task = spawn_execute(&harness, &stale, true);
    settle().await;
    assert_eq!(stale.status(), InstructionStatus::Started);

    harness
        .engine
        .abort_executing_and_delete_queued_calculation_operations();
    assert!(stale.cancellation().is_cancelled());

    let fresh = harness.instruction(OperationName::Calculation);
    let fresh_task = spawn_execute(&harness, &fresh, true);
    settle().await;

    assert_eq!(stale.status(), InstructionStatus::Cancelled);
    assert!(stale_task.await.unwrap().unwrap().is_none());

    gate.release();
    fresh_task.await.unwrap().unwrap();
    assert_eq!(fresh.status(), InstructionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_critical_instruction_waits_for_blocking_completion() {
    let harness = TestHarness::new();
    let gate = Gate::new();
    harness.factory.script(
        OperationName::Calculation,
        Behavior::Hold(gate.clone(), json!({})),
    );

    let calc = harness.instruction(OperationName::Calculation);
    let calc_task = spawn_execute(&harness, &calc, true);
    settle().await;
    assert_eq!(calc.status(), InstructionStatus::Started);

    // A form update is critical: it must not start while the calculation is
    // outstanding.
    let form_update = harness.instruction(OperationName::FormUpdate);
    let form_update_task = spawn_execute(&harness, &form_update, false);
    settle().await;
    assert_eq!(form_update.status(), InstructionStatus::Created);
    assert_eq!(harness.log.count_for(OperationName::FormUpdate), 0);

    gate.release();
    settle().await;
    calc_task.await.unwrap().unwrap();
    form_update_task.await.unwrap().unwrap();

    assert_eq!(calc.status(), InstructionStatus::Completed);
    assert_eq!(form_update.status(), InstructionStatus::Completed);
    assert_eq!(
        harness.log.names(),
        vec![OperationName::Calculation, OperationName::FormUpdate]
    );
}

#[tokio::test(start_paused = true)]
async fn test_queue_drains_priority_then_foreground_then_background() {
    let mut config = FormsConfig::default();
    config
        .operations
        .background_operations
        .push(OperationName::WorkflowStep);
    let harness = TestHarness::with_config(config);

    let gate = Gate::new();
    harness.factory.script(
        OperationName::Policy,
        Behavior::Hold(gate.clone(), json!({})),
    );

    let policy = harness.instruction(OperationName::Policy);
    let policy_task = spawn_execute(&harness, &policy, false);
    settle().await;

    let background = harness.instruction(OperationName::WorkflowStep);
    let background_task = spawn_execute(&harness, &background, false);
    settle().await;
    let foreground = harness.instruction(OperationName::Submission);
    let foreground_task = spawn_execute(&harness, &foreground, false);
    settle().await;
    let priority = harness.instruction(OperationName::Calculation);
    let priority_task = spawn_execute(&harness, &priority, true);
    settle().await;

    assert_eq!(harness.engine.queue_depths(), (1, 1, 1));

    gate.release();
    settle().await;
    policy_task.await.unwrap().unwrap();
    priority_task.await.unwrap().unwrap();
    foreground_task.await.unwrap().unwrap();
    background_task.await.unwrap().unwrap();

    assert_eq!(
        harness.log.names(),
        vec![
            OperationName::Policy,
            OperationName::Calculation,
            OperationName::Submission,
            OperationName::WorkflowStep,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_completion_fires_exactly_once_with_terminal_status() {
    let harness = TestHarness::new();
    let policy = harness.instruction(OperationName::Policy);

    let early = policy.subscribe_completion();
    harness.engine.execute(policy.clone(), false).await.unwrap();

    assert_eq!(policy.status(), InstructionStatus::Completed);
    assert_eq!(early.wait().await, outcomes::COMPLETED);

    // Late subscribers observe the same single outcome immediately.
    let late = policy.subscribe_completion();
    assert_eq!(late.wait().await, outcomes::COMPLETED);
    assert_eq!(
        policy.completion_outcome().as_deref(),
        Some(outcomes::COMPLETED)
    );
}

#[tokio::test(start_paused = true)]
async fn test_business_rejection_fails_and_propagates_status() {
    let harness = TestHarness::new();
    harness
        .factory
        .script(OperationName::Bind, Behavior::Reject("declined".to_string()));

    let bind = harness.instruction(OperationName::Bind);
    let result = harness.engine.execute(bind.clone(), false).await;

    assert_eq!(bind.status(), InstructionStatus::Failed);
    match result {
        Err(ExecutionError::Business(status)) => assert_eq!(status, "declined"),
        other => panic!("expected business rejection, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_skipped_operation_resolves_cancelled() {
    let harness = TestHarness::new();
    harness
        .factory
        .script(OperationName::FormUpdate, Behavior::Skip);

    let form_update = harness.instruction(OperationName::FormUpdate);
    let result = harness
        .engine
        .execute(form_update.clone(), false)
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(form_update.status(), InstructionStatus::Cancelled);
    assert_eq!(
        form_update.completion_outcome().as_deref(),
        Some(outcomes::SUPERSEDED)
    );
}

#[tokio::test(start_paused = true)]
async fn test_execute_all_stops_chain_on_first_failure() {
    let harness = TestHarness::new();
    harness
        .factory
        .script(OperationName::Bind, Behavior::Reject("declined".to_string()));

    let failing = harness.instruction(OperationName::Bind);
    let skipped = harness.instruction(OperationName::Policy);
    harness
        .engine
        .execute_all(&[failing.clone(), skipped.clone()])
        .await;

    assert_eq!(failing.status(), InstructionStatus::Failed);
    assert_eq!(skipped.status(), InstructionStatus::Created);
    assert_eq!(harness.log.count_for(OperationName::Policy), 0);
}

#[tokio::test(start_paused = true)]
async fn test_execute_all_skips_everything_when_batch_already_failed() {
    let harness = TestHarness::new();

    let prefailed = harness.instruction(OperationName::Policy);
    prefailed.fail_with(outcomes::FAILED);
    let never_run = harness.instruction(OperationName::Submission);

    harness
        .engine
        .execute_all(&[prefailed, never_run.clone()])
        .await;

    assert_eq!(harness.log.total(), 0);
    assert_eq!(never_run.status(), InstructionStatus::Created);
}

#[tokio::test(start_paused = true)]
async fn test_workflow_completion_sends_portal_messages_and_reloads_entities() {
    let mut config = FormsConfig::default();
    config.text_elements.workflow.insert(
        "confirmation".to_string(),
        WorkflowTextElements {
            close_button_label: Some("Back to portal".to_string()),
        },
    );
    config.context_entities.quotes.reload_with_operations = vec![OperationName::Policy];
    let harness = TestHarness::with_config(config);

    let mut messages = harness.messenger.subscribe();
    let policy = harness.instruction_for_step(OperationName::Policy, "confirmation");
    harness.engine.execute(policy, false).await.unwrap();
    settle().await;

    assert_eq!(
        messages.recv().await.unwrap(),
        PortalMessage::SaveInitiated {
            operation: OperationName::Policy
        }
    );
    assert_eq!(
        messages.recv().await.unwrap(),
        PortalMessage::CloseButtonLabel {
            label: "Back to portal".to_string()
        }
    );
    assert_eq!(*harness.context_loader.reloads.lock(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_surfaces_alert_then_delayed_prompt() {
    let harness = TestHarness::new();
    harness
        .factory
        .script(OperationName::Bind, Behavior::TransportStatus(503));

    let mut alerts = harness.alerts.subscribe();
    let mut events = harness.events.subscribe();

    let bind = harness.instruction(OperationName::Bind);
    let result = harness.engine.execute(bind.clone(), false).await;
    assert!(matches!(result, Err(ExecutionError::Transport(_))));
    assert_eq!(bind.status(), InstructionStatus::Failed);

    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.title, "Something went wrong");

    // The error prompt broadcast lands only after the configured delay.
    settle().await;
    assert!(events.try_recv().is_err());
    tokio::time::sleep(Duration::from_millis(600)).await;
    let event = events.recv().await.unwrap();
    assert_eq!(event.name, event_names::OPERATION_ERROR_PROMPT);
}

#[tokio::test(start_paused = true)]
async fn test_problem_details_render_as_titled_alert() {
    let harness = TestHarness::new();
    harness.factory.script(
        OperationName::Submission,
        Behavior::Problem {
            title: "Quote expired".to_string(),
            status: 422,
        },
    );

    let mut alerts = harness.alerts.subscribe();
    let submission = harness.instruction(OperationName::Submission);
    let result = harness.engine.execute(submission, false).await;
    assert!(matches!(result, Err(ExecutionError::Transport(_))));

    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.title, "Quote expired");
}

#[tokio::test(start_paused = true)]
async fn test_bind_not_permitted_fires_recalculation_retrigger() {
    let harness = TestHarness::new();
    harness.factory.script(
        OperationName::Bind,
        Behavior::Fail(|| OperationError::BindNotPermitted {
            code: "BIND_NOT_PERMITTED".to_string(),
            message: "quote is stale".to_string(),
        }),
    );

    let mut events = harness.events.subscribe();
    let mut alerts = harness.alerts.subscribe();

    let bind = harness.instruction(OperationName::Bind);
    let result = harness.engine.execute(bind.clone(), false).await;
    assert!(matches!(result, Err(ExecutionError::Operation(_))));
    assert_eq!(bind.status(), InstructionStatus::Failed);

    let event = events.recv().await.unwrap();
    assert_eq!(event.name, event_names::CALCULATION_RETRIGGER_REQUESTED);
    let alert = alerts.recv().await.unwrap();
    assert_eq!(alert.title, "Bind not permitted");
}

//! Shared execution status tracking.
//!
//! Single source of truth for "what is executing right now". Mutated only by
//! the queueing engine; everything else reads through accessors or the
//! application-state watch channel this service mirrors into.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::system;
use crate::services::ApplicationState;

use super::instruction::{InstructionId, OperationInstruction};

#[derive(Debug, Default)]
struct StatusInner {
    /// Instruction occupying the single-concurrency execution slot
    executing: Option<Arc<OperationInstruction>>,
    /// Instructions executing via the priority bypass path. More than one is
    /// present only while a newer priority calculation supersedes an older
    /// one still winding down.
    priority_in_progress: Vec<Arc<OperationInstruction>>,
}

/// Tracks slot occupancy and priority-path execution
#[derive(Debug)]
pub struct OperationStatusService {
    inner: RwLock<StatusInner>,
    app: Arc<ApplicationState>,
}

impl OperationStatusService {
    pub fn new(app: Arc<ApplicationState>) -> Self {
        Self {
            inner: RwLock::new(StatusInner::default()),
            app,
        }
    }

    /// The instruction in the execution slot, if any
    pub fn executing_instruction(&self) -> Option<Arc<OperationInstruction>> {
        self.inner.read().executing.clone()
    }

    /// Whether the execution slot is occupied
    pub fn operation_in_progress(&self) -> bool {
        self.inner.read().executing.is_some()
    }

    pub fn any_priority_in_progress(&self) -> bool {
        !self.inner.read().priority_in_progress.is_empty()
    }

    /// Snapshot of the priority-path instructions currently executing
    pub fn priority_snapshot(&self) -> Vec<Arc<OperationInstruction>> {
        self.inner.read().priority_in_progress.clone()
    }

    pub(crate) fn set_executing(&self, instruction: Option<Arc<OperationInstruction>>) {
        {
            let mut inner = self.inner.write();
            inner.executing = instruction;
        }
        self.publish_current();
    }

    pub(crate) fn push_priority(&self, instruction: Arc<OperationInstruction>) {
        {
            let mut inner = self.inner.write();
            inner.priority_in_progress.push(instruction);
        }
        self.publish_current();
    }

    pub(crate) fn remove_priority(&self, id: InstructionId) {
        {
            let mut inner = self.inner.write();
            inner
                .priority_in_progress
                .retain(|instruction| instruction.id() != id);
        }
        self.publish_current();
    }

    /// Mirror the current occupancy into the application-wide channel: the
    /// priority sentinel while any priority op is active, otherwise the slot
    /// occupant's name, otherwise `None`.
    fn publish_current(&self) {
        let name = {
            let inner = self.inner.read();
            if !inner.priority_in_progress.is_empty() {
                Some(system::CALCULATION_SENTINEL.to_string())
            } else {
                inner
                    .executing
                    .as_ref()
                    .map(|instruction| instruction.name().as_str().to_string())
            }
        };
        self.app.set_operation_in_progress(name);
    }
}

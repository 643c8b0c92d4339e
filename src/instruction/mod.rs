//! # Operation Instructions
//!
//! The instruction model and the queueing/execution engine built around it.
//!
//! ## Core Components
//!
//! - **OperationInstruction**: one request to perform a named backend
//!   operation, with status tracking and completion/abort channels
//! - **OperationStatusService**: single source of truth for slot occupancy
//!   and priority-path execution
//! - **OperationInstructionService**: the queueing engine - three FIFO
//!   queues, one execution slot, priority preemption, duplicate abort, and
//!   blocking-operation barriers

pub mod completion;
pub mod instruction;
pub mod service;
pub mod status_service;

pub use completion::{CancellationSignal, CompletionChannel, CompletionReceiver};
pub use instruction::{
    InstructionId, InstructionStatus, OperationArgs, OperationInstruction, OperationName,
};
pub use service::{ExecutionError, ExecutionResult, OperationInstructionService};
pub use status_service::OperationStatusService;

//! # Operation Capability
//!
//! The abstract unit of backend work consumed by the queueing engine. An
//! [`Operation`] issues one network call and yields exactly one tagged
//! [`OperationResponse`] (or an [`OperationError`] for code-level failures),
//! observing the instruction's cancellation signal cooperatively.
//!
//! Implementations live in the embedding host; a [`OperationFactory`] keyed
//! by operation name supplies them to the engine.

pub mod traits;
pub mod types;

pub use traits::{Operation, OperationFactory};
pub use types::{
    OperationError, OperationResponse, ProblemDetails, TransportErrorKind, TransportFailure,
};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::instruction::{CancellationSignal, InstructionId, OperationArgs, OperationName};

use super::types::{OperationError, OperationResponse};

/// An abstract unit of backend work.
///
/// `execute` issues one network call and yields exactly one envelope. The
/// cancellation signal is cooperative: implementations should abandon the
/// request and return [`OperationResponse::Skipped`] (or let the engine's
/// abort race win) once it is raised.
#[async_trait]
pub trait Operation: Send + Sync {
    async fn execute(
        &self,
        params: Value,
        args: &OperationArgs,
        instruction_id: InstructionId,
        cancellation: CancellationSignal,
    ) -> Result<OperationResponse, OperationError>;
}

/// Supplies [`Operation`] implementations keyed by operation name
pub trait OperationFactory: Send + Sync {
    fn create(&self, name: OperationName) -> Arc<dyn Operation>;
}

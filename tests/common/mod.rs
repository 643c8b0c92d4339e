//! Shared test fixtures: controllable mock operations, a scripted operation
//! factory, and a wired-up engine harness.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use formsapp_core::calculation::QuoteRequestBuilder;
use formsapp_core::config::{DebugConfig, FormsConfig};
use formsapp_core::instruction::{
    CancellationSignal, InstructionId, OperationArgs, OperationInstruction,
    OperationInstructionService, OperationName,
};
use formsapp_core::operation::{
    Operation, OperationError, OperationFactory, OperationResponse, ProblemDetails,
    TransportErrorKind, TransportFailure,
};
use formsapp_core::services::{
    AlertService, ApplicationState, ContextEntityLoader, FormType, PortalMessenger,
};
use formsapp_core::EventPublisher;

/// Gate that holds a mock operation open until the test releases it
#[derive(Debug)]
pub struct Gate {
    permits: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            permits: Semaphore::new(0),
        })
    }

    /// Allow one held execution to proceed
    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    async fn passed(&self) {
        let permit = self.permits.acquire().await.expect("gate closed");
        permit.forget();
    }
}

/// Scripted behavior for a mock operation
#[derive(Clone)]
pub enum Behavior {
    /// Resolve immediately with a success envelope
    Succeed(Value),
    /// Resolve with a business-level rejection status
    Reject(String),
    /// Resolve with a bare 5xx/4xx transport failure
    TransportStatus(u16),
    /// Resolve with a structured problem-details failure
    Problem { title: String, status: u16 },
    /// Raise a code-level operation error
    Fail(fn() -> OperationError),
    /// Report that the operation determined it was redundant
    Skip,
    /// Hold until the gate releases (or cancellation wins), then succeed
    Hold(Arc<Gate>, Value),
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub instruction_id: InstructionId,
    pub name: OperationName,
    pub silent: bool,
}

/// Records every mock execution in arrival order
#[derive(Default)]
pub struct ExecutionLog {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl ExecutionLog {
    pub fn total(&self) -> usize {
        self.records.lock().len()
    }

    pub fn count_for(&self, name: OperationName) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.name == name)
            .count()
    }

    pub fn names(&self) -> Vec<OperationName> {
        self.records.lock().iter().map(|record| record.name).collect()
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().clone()
    }

    fn push(&self, record: ExecutionRecord) {
        self.records.lock().push(record);
    }
}

struct MockOperation {
    name: OperationName,
    behavior: Behavior,
    log: Arc<ExecutionLog>,
}

#[async_trait::async_trait]
impl Operation for MockOperation {
    async fn execute(
        &self,
        _params: Value,
        args: &OperationArgs,
        instruction_id: InstructionId,
        cancellation: CancellationSignal,
    ) -> Result<OperationResponse, OperationError> {
        self.log.push(ExecutionRecord {
            instruction_id,
            name: self.name,
            silent: args.silent,
        });

        match &self.behavior {
            Behavior::Succeed(payload) => Ok(OperationResponse::success(payload.clone())),
            Behavior::Reject(status) => Ok(OperationResponse::Success {
                status: status.clone(),
                payload: Value::Null,
            }),
            Behavior::TransportStatus(code) => Ok(OperationResponse::Error(TransportFailure {
                kind: if *code >= 500 {
                    TransportErrorKind::ServerError(*code)
                } else {
                    TransportErrorKind::Other(*code)
                },
                payload: Value::Null,
            })),
            Behavior::Problem { title, status } => Ok(OperationResponse::Error(TransportFailure {
                kind: TransportErrorKind::ProblemDetails(ProblemDetails {
                    title: title.clone(),
                    detail: Some("details".to_string()),
                    status: *status,
                    type_uri: None,
                }),
                payload: Value::Null,
            })),
            Behavior::Fail(make_error) => Err(make_error()),
            Behavior::Skip => Ok(OperationResponse::Skipped),
            Behavior::Hold(gate, payload) => {
                tokio::select! {
                    _ = cancellation.cancelled() => Ok(OperationResponse::Skipped),
                    _ = gate.passed() => Ok(OperationResponse::success(payload.clone())),
                }
            }
        }
    }
}

/// Factory serving scripted behaviors per operation name
pub struct MockOperationFactory {
    behaviors: Mutex<HashMap<OperationName, Behavior>>,
    log: Arc<ExecutionLog>,
}

impl MockOperationFactory {
    pub fn new(log: Arc<ExecutionLog>) -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            log,
        }
    }

    pub fn script(&self, name: OperationName, behavior: Behavior) {
        self.behaviors.lock().insert(name, behavior);
    }
}

impl OperationFactory for MockOperationFactory {
    fn create(&self, name: OperationName) -> Arc<dyn Operation> {
        let behavior = self
            .behaviors
            .lock()
            .get(&name)
            .cloned()
            .unwrap_or_else(|| Behavior::Succeed(json!({"ok": true})));
        Arc::new(MockOperation {
            name,
            behavior,
            log: self.log.clone(),
        })
    }
}

/// Counts context entity reloads requested by the engine
#[derive(Default)]
pub struct RecordingContextLoader {
    pub reloads: Mutex<usize>,
}

#[async_trait::async_trait]
impl ContextEntityLoader for RecordingContextLoader {
    async fn load_context_entities(&self) -> anyhow::Result<()> {
        *self.reloads.lock() += 1;
        Ok(())
    }
}

/// Request builder returning a settable fixed payload
pub struct StaticRequestBuilder {
    payload: Mutex<Value>,
}

impl StaticRequestBuilder {
    pub fn new(payload: Value) -> Arc<Self> {
        Arc::new(Self {
            payload: Mutex::new(payload),
        })
    }

    pub fn set_payload(&self, payload: Value) {
        *self.payload.lock() = payload;
    }
}

impl QuoteRequestBuilder for StaticRequestBuilder {
    fn build(&self, _for_premium: bool, _for_trigger: bool) -> Value {
        self.payload.lock().clone()
    }
}

/// A fully wired engine with scripted operations
pub struct TestHarness {
    pub config: Arc<FormsConfig>,
    pub app: Arc<ApplicationState>,
    pub alerts: Arc<AlertService>,
    pub events: EventPublisher,
    pub messenger: PortalMessenger,
    pub factory: Arc<MockOperationFactory>,
    pub log: Arc<ExecutionLog>,
    pub context_loader: Arc<RecordingContextLoader>,
    pub engine: Arc<OperationInstructionService>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(FormsConfig::default())
    }

    pub fn with_config(config: FormsConfig) -> Self {
        let config = Arc::new(config);
        let debug = DebugConfig {
            enabled: true,
            level: 2,
        };
        let app = Arc::new(ApplicationState::new(FormType::Quote, debug));
        let alerts = Arc::new(AlertService::new());
        let events = EventPublisher::default();
        let messenger = PortalMessenger::new();
        let log = Arc::new(ExecutionLog::default());
        let factory = Arc::new(MockOperationFactory::new(log.clone()));
        let context_loader = Arc::new(RecordingContextLoader::default());
        let engine = Arc::new(
            OperationInstructionService::new(
                config.clone(),
                factory.clone(),
                app.clone(),
                alerts.clone(),
                events.clone(),
                messenger.clone(),
            )
            .context_entity_loader(context_loader.clone()),
        );
        Self {
            config,
            app,
            alerts,
            events,
            messenger,
            factory,
            log,
            context_loader,
            engine,
        }
    }

    pub fn instruction(&self, name: OperationName) -> Arc<OperationInstruction> {
        Arc::new(OperationInstruction::new(
            name,
            None,
            json!({}),
            OperationArgs::default(),
            &self.config,
        ))
    }

    pub fn instruction_for_step(
        &self,
        name: OperationName,
        step: &str,
    ) -> Arc<OperationInstruction> {
        Arc::new(OperationInstruction::new(
            name,
            Some(step.to_string()),
            json!({}),
            OperationArgs::default(),
            &self.config,
        ))
    }
}

/// Let spawned engine tasks make progress without advancing time
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

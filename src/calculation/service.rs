//! # Calculation Trigger Pipeline
//!
//! Decides if and when a calculation is sent: validity-gates triggers,
//! coalesces bursts under a two-tier debounce, consults the response cache
//! to run silently when a cached answer already satisfies the UI, and feeds
//! instructions into the queueing engine with priority.
//!
//! ## Debounce tiers
//!
//! - A trigger arriving while no calculation is in progress and the line has
//!   been quiet longer than the long debounce window proceeds immediately,
//!   modulo a short micro-debounce that coalesces near-simultaneous
//!   triggers (a field change that also reveals a dependent default).
//! - Anything else waits in a debounced queue keyed on
//!   `(for_premium, for_trigger, silent)` until the line has been quiet for
//!   the long debounce window.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::FormsConfig;
use crate::instruction::{
    OperationArgs, OperationInstruction, OperationInstructionService, OperationName,
};
use crate::services::{ApplicationState, FormType};

use super::cache::CalculationCache;
use super::state::CalculationActivity;
use super::triggers::CalculationResponse;

/// Errors from the trigger pipeline. Validity-gate drops are not errors;
/// only misuse is.
#[derive(Debug, thiserror::Error)]
pub enum CalculationError {
    /// Calculating after the form reached its terminal complete state is a
    /// product-configuration bug, not a retryable condition.
    #[error("calculation requested after the {form_type} form was completed")]
    FormAlreadyComplete { form_type: FormType },
}

/// Builds the calculation request payload from current form state.
/// Implemented by the embedding host.
pub trait QuoteRequestBuilder: Send + Sync {
    fn build(&self, for_premium: bool, for_trigger: bool) -> Value;
}

/// What kind of input is required for calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityKind {
    Field,
    QuestionSet,
}

impl fmt::Display for ValidityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field => write!(f, "field"),
            Self::QuestionSet => write!(f, "question set"),
        }
    }
}

struct RequiredEntry {
    name: String,
    kind: ValidityKind,
    valid: Arc<AtomicBool>,
}

/// Handle through which the UI layer reports validity of one registered
/// required input
#[derive(Clone)]
pub struct ValidityHandle {
    valid: Arc<AtomicBool>,
}

impl ValidityHandle {
    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy)]
struct MicroBatch {
    for_premium: bool,
    for_trigger: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DebounceKey {
    for_premium: bool,
    for_trigger: bool,
    silent: bool,
}

struct DebouncedEntry {
    generation: u64,
    payload: Value,
}

/// The calculation trigger pipeline
pub struct CalculationService {
    config: Arc<FormsConfig>,
    app: Arc<ApplicationState>,
    instructions: Arc<OperationInstructionService>,
    request_builder: Arc<dyn QuoteRequestBuilder>,
    cache: CalculationCache,
    activity: Mutex<CalculationActivity>,
    validity: RwLock<Vec<RequiredEntry>>,
    last_trigger_at: Mutex<Option<Instant>>,
    micro: Mutex<Option<MicroBatch>>,
    debounced: Mutex<HashMap<DebounceKey, DebouncedEntry>>,
    generation: AtomicU64,
    responses: broadcast::Sender<CalculationResponse>,
}

impl CalculationService {
    pub fn new(
        config: Arc<FormsConfig>,
        app: Arc<ApplicationState>,
        instructions: Arc<OperationInstructionService>,
        request_builder: Arc<dyn QuoteRequestBuilder>,
    ) -> Self {
        let cache = CalculationCache::new(config.calculation.cache_capacity);
        Self {
            config,
            app,
            instructions,
            request_builder,
            cache,
            activity: Mutex::new(CalculationActivity::default()),
            validity: RwLock::new(Vec::new()),
            last_trigger_at: Mutex::new(None),
            micro: Mutex::new(None),
            debounced: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            responses: broadcast::channel(32).0,
        }
    }

    /// The payload-keyed response cache
    pub fn cache(&self) -> &CalculationCache {
        &self.cache
    }

    /// Subscribe to processed calculation responses
    pub fn subscribe_responses(&self) -> broadcast::Receiver<CalculationResponse> {
        self.responses.subscribe()
    }

    /// Register an input that must be valid before any calculation is sent.
    /// Inputs start invalid until the UI reports otherwise.
    pub fn register_required_for_calculation(
        &self,
        name: impl Into<String>,
        kind: ValidityKind,
    ) -> ValidityHandle {
        let valid = Arc::new(AtomicBool::new(false));
        self.validity.write().push(RequiredEntry {
            name: name.into(),
            kind,
            valid: valid.clone(),
        });
        ValidityHandle { valid }
    }

    /// True only if every registered required input currently reports valid.
    pub fn can_proceed_with_calculation(&self) -> bool {
        let validity = self.validity.read();
        let offenders: Vec<String> = validity
            .iter()
            .filter(|entry| !entry.valid.load(Ordering::Acquire))
            .map(|entry| format!("{} '{}'", entry.kind, entry.name))
            .collect();
        if offenders.is_empty() {
            return true;
        }
        if self.app.debug_enabled() {
            debug!(
                offenders = %offenders.join(", "),
                "Calculation skipped: required inputs are invalid"
            );
        }
        false
    }

    /// Accept a calculation trigger.
    ///
    /// Invalid required inputs drop the request silently. Requesting a
    /// calculation after the form completed is a hard error.
    pub fn generate_quote_request(
        self: &Arc<Self>,
        for_premium: bool,
        for_trigger: bool,
    ) -> Result<(), CalculationError> {
        if self.app.form_completed() {
            return Err(CalculationError::FormAlreadyComplete {
                form_type: self.app.form_type(),
            });
        }
        if !self.can_proceed_with_calculation() {
            return Ok(());
        }

        let long_debounce = Duration::from_millis(self.config.calculation.long_debounce_ms);
        let quiet_line = {
            let mut last = self.last_trigger_at.lock();
            let now = Instant::now();
            let quiet = last.map_or(true, |t| now.duration_since(t) > long_debounce);
            *last = Some(now);
            quiet
        };

        // A micro batch already waiting coalesces this trigger outright.
        if self.try_join_micro(for_premium, for_trigger) {
            return Ok(());
        }

        let immediate = !self.app.calculation_in_progress() && quiet_line;
        if immediate {
            self.start_micro(for_premium, for_trigger);
        } else {
            self.queue_debounced(for_premium, for_trigger);
        }
        Ok(())
    }

    fn try_join_micro(&self, for_premium: bool, for_trigger: bool) -> bool {
        {
            let mut micro = self.micro.lock();
            match micro.as_mut() {
                Some(batch) => {
                    batch.for_premium |= for_premium;
                    batch.for_trigger |= for_trigger;
                }
                None => return false,
            }
        }
        self.activity
            .lock()
            .request_pending(&self.app, for_premium, for_trigger);
        true
    }

    fn start_micro(self: &Arc<Self>, for_premium: bool, for_trigger: bool) {
        *self.micro.lock() = Some(MicroBatch {
            for_premium,
            for_trigger,
        });
        self.activity
            .lock()
            .request_pending(&self.app, for_premium, for_trigger);

        let window = Duration::from_millis(self.config.calculation.micro_debounce_ms);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let batch = service.micro.lock().take();
            if let Some(batch) = batch {
                service
                    .dispatch(batch.for_premium, batch.for_trigger, false, None)
                    .await;
            }
        });
    }

    fn queue_debounced(self: &Arc<Self>, for_premium: bool, for_trigger: bool) {
        // The payload is computed up front so the cache can be consulted
        // here: a hit makes this a silent request, and silence is part of
        // the debounce key.
        let payload = self.request_builder.build(for_premium, for_trigger);
        let mut silent = false;
        if let Some(cached) = self.cache.lookup(&payload) {
            self.publish_response(&cached);
            silent = true;
        }

        let key = DebounceKey {
            for_premium,
            for_trigger,
            silent,
        };
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let superseded = {
            let mut debounced = self.debounced.lock();
            debounced
                .insert(key, DebouncedEntry { generation, payload })
                .is_some()
        };
        {
            let mut activity = self.activity.lock();
            // A superseded silent entry must give back its background slot,
            // or the background flag would leak.
            if superseded && silent {
                activity.settle_background(&self.app);
            }
            if silent {
                activity.begin_background(&self.app);
            } else {
                activity.request_pending(&self.app, for_premium, for_trigger);
            }
        }

        let quiet = Duration::from_millis(self.config.calculation.long_debounce_ms);
        let service = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let entry = {
                let mut debounced = service.debounced.lock();
                match debounced.get(&key) {
                    Some(entry) if entry.generation == generation => debounced.remove(&key),
                    _ => None,
                }
            };
            if let Some(entry) = entry {
                service
                    .dispatch(key.for_premium, key.for_trigger, key.silent, Some(entry.payload))
                    .await;
            }
        });
    }

    /// Issue one calculation instruction and route its response.
    async fn dispatch(
        self: &Arc<Self>,
        for_premium: bool,
        for_trigger: bool,
        silent_enqueued: bool,
        payload: Option<Value>,
    ) {
        let payload = payload.unwrap_or_else(|| self.request_builder.build(for_premium, for_trigger));

        let mut silent = silent_enqueued;
        if !silent {
            if let Some(cached) = self.cache.lookup(&payload) {
                debug!("Publishing cached calculation response ahead of the network round trip");
                self.publish_response(&cached);
                silent = true;
            }
        }

        {
            let mut activity = self.activity.lock();
            activity.clear_pending(&self.app, for_premium, for_trigger);
            if silent {
                if !silent_enqueued {
                    activity.begin_background(&self.app);
                }
            } else {
                activity.begin_foreground(&self.app, for_premium, for_trigger);
            }
        }

        // A stale in-flight calculation must never race this fresher one.
        self.instructions
            .abort_executing_and_delete_queued_calculation_operations();

        let args = if silent {
            OperationArgs::silent()
        } else {
            OperationArgs::default()
        };
        let instruction = Arc::new(OperationInstruction::new(
            OperationName::Calculation,
            None,
            payload.clone(),
            args,
            &self.config,
        ));
        debug!(
            instruction_id = %instruction.id(),
            silent = silent,
            for_premium = for_premium,
            for_trigger = for_trigger,
            "🧮 CALCULATION: issuing"
        );

        let result = self.instructions.execute(instruction, true).await;
        match result {
            Ok(Some(value)) => {
                let response = CalculationResponse::from_payload(value);
                self.cache.store(&payload, response.clone());
                if !silent {
                    self.publish_response(&response);
                }
            }
            Ok(None) => {
                debug!("Calculation superseded or aborted before a response landed");
            }
            Err(error) => {
                warn!(error = %error, "Calculation failed; details surfaced via alerts");
            }
        }

        {
            let mut activity = self.activity.lock();
            if silent {
                activity.settle_background(&self.app);
            } else {
                activity.settle_foreground(&self.app, for_premium, for_trigger);
            }
        }
    }

    fn publish_response(&self, response: &CalculationResponse) {
        if let Some(trigger) = response.active_trigger() {
            debug!(
                trigger = %trigger.name,
                kind = ?trigger.kind,
                "Active trigger selected for display"
            );
        }
        let _ = self.responses.send(response.clone());
    }
}

//! # FormsApp Configuration System
//!
//! Typed product configuration consumed by the orchestration core: which
//! operations run in the background, when context entities reload, debounce
//! windows, and the workflow text elements used for portal messaging.
//!
//! Configuration is loaded from YAML with per-environment overrides (see
//! [`loader::ConfigManager`]); every structure also carries serde defaults so
//! an embedding host can start from `FormsConfig::default()` and override
//! selectively.

pub mod error;
pub mod loader;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::system;
use crate::instruction::OperationName;
use crate::services::FormType;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration for the orchestration core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormsConfig {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub calculation: CalculationConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    #[serde(default)]
    pub context_entities: ContextEntitiesConfig,
    #[serde(default)]
    pub text_elements: TextElementsConfig,
}

impl FormsConfig {
    /// Validate cross-field invariants after loading.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.calculation.long_debounce_ms == 0 {
            return Err(ConfigurationError::invalid(
                "calculation.long_debounce_ms",
                "must be greater than zero",
            ));
        }
        if self.calculation.micro_debounce_ms >= self.calculation.long_debounce_ms {
            return Err(ConfigurationError::invalid(
                "calculation.micro_debounce_ms",
                "must be shorter than the long debounce window",
            ));
        }
        if self.calculation.cache_capacity == 0 {
            return Err(ConfigurationError::invalid(
                "calculation.cache_capacity",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Host application behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Debug diagnostics switches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Verbosity, 0-3. Only consulted when `enabled` is set.
    #[serde(default)]
    pub level: u8,
}

/// Calculation trigger pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationConfig {
    /// Coalescing window for near-simultaneous triggers
    #[serde(default = "default_micro_debounce_ms")]
    pub micro_debounce_ms: u64,
    /// Quiet period before a non-immediate calculation is issued
    #[serde(default = "default_long_debounce_ms")]
    pub long_debounce_ms: u64,
    /// Bounded capacity of the payload-keyed response cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            micro_debounce_ms: default_micro_debounce_ms(),
            long_debounce_ms: default_long_debounce_ms(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_micro_debounce_ms() -> u64 {
    system::DEFAULT_MICRO_DEBOUNCE_MS
}

fn default_long_debounce_ms() -> u64 {
    system::DEFAULT_LONG_DEBOUNCE_MS
}

fn default_cache_capacity() -> usize {
    system::DEFAULT_CACHE_CAPACITY
}

/// Operation execution classification and error prompt tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationsConfig {
    /// Operations allowed to run without blocking the UI
    #[serde(default = "default_background_operations")]
    pub background_operations: Vec<OperationName>,
    /// Delay before the error-prompt broadcast after an HTTP failure
    #[serde(default = "default_error_prompt_delay_ms")]
    pub error_prompt_delay_ms: u64,
}

impl OperationsConfig {
    pub fn is_background(&self, name: OperationName) -> bool {
        self.background_operations.contains(&name)
    }
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            background_operations: default_background_operations(),
            error_prompt_delay_ms: default_error_prompt_delay_ms(),
        }
    }
}

fn default_background_operations() -> Vec<OperationName> {
    vec![OperationName::Calculation, OperationName::FormUpdate]
}

fn default_error_prompt_delay_ms() -> u64 {
    system::DEFAULT_ERROR_PROMPT_DELAY_MS
}

/// Per-form-type context entity rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextEntitiesConfig {
    #[serde(default)]
    pub quotes: ContextEntityRules,
    #[serde(default)]
    pub claims: ContextEntityRules,
}

impl ContextEntitiesConfig {
    pub fn rules_for(&self, form_type: FormType) -> &ContextEntityRules {
        match form_type {
            FormType::Quote => &self.quotes,
            FormType::Claim => &self.claims,
        }
    }
}

/// Which operation completions trigger a context entity reload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextEntityRules {
    #[serde(default)]
    pub reload_with_operations: Vec<OperationName>,
}

impl ContextEntityRules {
    pub fn should_reload_for(&self, name: OperationName) -> bool {
        self.reload_with_operations.contains(&name)
    }
}

/// Workflow text elements surfaced to the host portal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextElementsConfig {
    /// Keyed by workflow step name
    #[serde(default)]
    pub workflow: HashMap<String, WorkflowTextElements>,
}

impl TextElementsConfig {
    pub fn close_button_label(&self, step_name: &str) -> Option<&str> {
        self.workflow
            .get(step_name)
            .and_then(|elements| elements.close_button_label.as_deref())
    }
}

/// Text elements for a single workflow step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowTextElements {
    #[serde(default)]
    pub close_button_label: Option<String>,
}

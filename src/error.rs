use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FormsCoreError {
    ConfigurationError(String),
    StateTransitionError(String),
    OrchestrationError(String),
    CalculationError(String),
    EventError(String),
    ValidationError(String),
}

impl fmt::Display for FormsCoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormsCoreError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
            FormsCoreError::StateTransitionError(msg) => {
                write!(f, "State transition error: {msg}")
            }
            FormsCoreError::OrchestrationError(msg) => write!(f, "Orchestration error: {msg}"),
            FormsCoreError::CalculationError(msg) => write!(f, "Calculation error: {msg}"),
            FormsCoreError::EventError(msg) => write!(f, "Event error: {msg}"),
            FormsCoreError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for FormsCoreError {}

pub type Result<T> = std::result::Result<T, FormsCoreError>;

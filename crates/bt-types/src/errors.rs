use thiserror::Error;

/// Main error type for the blocktune system
#[derive(Error, Debug)]
pub enum BtError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Search space error: {0}")]
    Space(#[from] SpaceError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BtError {
    /// True for errors that describe a malformed study or search space.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Space(_))
    }
}

/// Search-space declaration and assignment errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    #[error("Search space declares no parameters")]
    Empty,

    #[error("Parameter {parameter} has an empty domain")]
    EmptyDomain { parameter: String },

    #[error("Parameter declared twice: {parameter}")]
    DuplicateParameter { parameter: String },

    #[error("Parameter {parameter} lists value {value} more than once")]
    DuplicateValue { parameter: String, value: String },

    #[error("Invalid integer range for {parameter}: low {low}, high {high}, step {step}")]
    InvalidRange {
        parameter: String,
        low: i64,
        high: i64,
        step: i64,
    },

    #[error("Configuration is missing parameter: {parameter}")]
    MissingParameter { parameter: String },

    #[error("Configuration assigns undeclared parameter: {parameter}")]
    UnknownParameter { parameter: String },

    #[error("Value {value} is outside the domain of {parameter}")]
    OutOfDomain { parameter: String, value: String },
}

/// Errors signaled by an external evaluation collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Evaluation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Device error: {message}")]
    Device { message: String },

    #[error("Invalid measurement: {message}")]
    InvalidResult { message: String },

    #[error("Evaluation panicked: {message}")]
    Panicked { message: String },

    #[error("Evaluation failed: {message}")]
    Other { message: String },
}

impl EvaluationError {
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Result type alias for blocktune operations
pub type BtResult<T> = Result<T, BtError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BtError::Config(format!($($arg)*))
    };
}

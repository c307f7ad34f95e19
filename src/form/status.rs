//! Validation result values

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The outcome level of a validation run.
///
/// `Ok`, `Warn` and `Error` form a severity ladder used when reducing
/// multiple statuses into one. `Canceled` marks a validation generation that
/// was superseded before it finished; it is a transient state, not a real
/// failure, and sits outside the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Ok,
    Warn,
    Error,
    Canceled,
}

impl ValidationLevel {
    /// Relative severity used by the overall-status reduction. A candidate
    /// status replaces the current one when its severity is greater or equal.
    pub(crate) fn severity(self) -> u8 {
        match self {
            ValidationLevel::Ok => 0,
            ValidationLevel::Warn => 1,
            ValidationLevel::Error => 2,
            ValidationLevel::Canceled => 3,
        }
    }

    pub fn is_error(self) -> bool {
        self == ValidationLevel::Error
    }
}

/// The result of validating a parameter, a form, or an action execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStatus {
    pub level: ValidationLevel,
    /// User-visible message. `None` for an unremarkable `ok`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Optional structured payload for consumers that need more than a
    /// message (e.g. per-field details from a remote validator)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// True when this status was produced by a forced validation run
    #[serde(default)]
    pub forced: bool,
}

impl ValidationStatus {
    pub fn new(level: ValidationLevel, message: Option<String>) -> Self {
        Self {
            level,
            message,
            data: None,
            forced: false,
        }
    }

    pub fn ok() -> Self {
        Self::new(ValidationLevel::Ok, None)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Warn, Some(message.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Error, Some(message.into()))
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ValidationLevel::Canceled, Some(message.into()))
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

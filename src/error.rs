//! Programmer-error taxonomy
//!
//! Validation failures are never expressed as errors; they flow through
//! [`ValidationStatus`](crate::form::ValidationStatus) instead. The variants
//! here cover misuse of the API surface itself. Registration helpers on
//! [`Form`](crate::form::Form) panic with these messages to fail fast at the
//! point of misuse; lookup helpers return them as `Err`.

use thiserror::Error;

/// Errors raised by incorrect use of the form or action APIs
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    /// An entry with the same name is already registered in the form
    #[error("an entry named \"{0}\" already exists in the form")]
    DuplicateEntry(String),

    /// No entry with the given name exists in the form
    #[error("no entry named \"{0}\" exists in the form")]
    NoSuchEntry(String),

    /// The named entry exists but is not a parameter
    #[error("entry \"{0}\" is not a parameter")]
    NotAParameter(String),

    /// The named entry exists but is not a section
    #[error("entry \"{0}\" is not a section")]
    NotASection(String),

    /// The named entry exists but is not a sub-form
    #[error("entry \"{0}\" is not a sub-form")]
    NotASubForm(String),

    /// The action's form was accessed before `initialize()` completed
    #[error("unable to get form: the action is not yet initialized")]
    NotInitialized,
}

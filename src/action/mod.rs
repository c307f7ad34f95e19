//! Actions: initialize a form, validate it, execute work against it

mod action;

pub use action::{Action, ActionExecutionResult, ActionHooks};

//! Typed form tree with dependency-aware, cancelable validation
//!
//! A [`Form`] owns an open record of values plus a registry of entries
//! describing them. Entries come in four kinds: [`Parameter`] (value-bound
//! and validatable), [`Section`] (grouping with cascading visibility),
//! [`Item`] (display-only) and [`SubForm`] (an independent child form
//! mounted as one entry). Validation runs in generations; starting a new
//! one cancels whatever was still in flight.

mod entry;
mod form;
mod parameter;
mod section;
mod snapshot;
mod status;
mod subform;
mod values;

pub use entry::{DynamicBool, DynamicProperties, DynamicString, Entry, EntryInit, Item};
pub use form::{
    AsyncFormValidator, ChangeHandler, Form, FormInit, FormValidator, Subscription,
    ValidateHandler,
};
pub use parameter::{
    AsyncParameterValidator, Parameter, ParameterInit, ParameterKind, ParameterValidator,
    ValidationRequest,
};
pub use section::{Section, SectionInit};
pub use snapshot::ValidationSnapshot;
pub use status::{ValidationLevel, ValidationStatus};
pub use subform::{SubForm, SubFormInit};
pub use values::FormValues;

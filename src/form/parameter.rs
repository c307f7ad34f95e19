//! Value-bound, validatable form entries

use crate::context::FormContext;
use crate::form::entry::{
    apply_dynamic_bool, apply_dynamic_string, DynamicProperties, EntryProps,
};
use crate::form::form::WeakForm;
use crate::form::section::Section;
use crate::form::status::ValidationStatus;
use crate::form::values::FormValues;
use crate::util::capitalize_first;
use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The closed set of parameter kinds.
///
/// Each kind contributes only its type-coercion rule; required-field and
/// dependency handling are shared by all parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// A free-form string value
    Text,
    /// A numeric value
    Number,
    /// A boolean value
    Flag,
    /// A list of string values
    TextList,
}

impl ParameterKind {
    /// Check a non-null value against this kind. Returns the translation key
    /// of the failure message when the value has the wrong shape.
    fn check(self, value: &Value) -> Result<(), &'static str> {
        let ok = match self {
            ParameterKind::Text => value.is_string(),
            ParameterKind::Number => value.is_number(),
            ParameterKind::Flag => value.is_boolean(),
            ParameterKind::TextList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        };
        if ok {
            Ok(())
        } else {
            Err(match self {
                ParameterKind::Text => "form.expected-text",
                ParameterKind::Number => "form.expected-number",
                ParameterKind::Flag => "form.expected-flag",
                ParameterKind::TextList => "form.expected-text-list",
            })
        }
    }
}

/// Synchronous custom validation callback
pub type ParameterValidator = Rc<dyn Fn(&ValidationRequest) -> ValidationStatus>;
/// Asynchronous custom validation callback
pub type AsyncParameterValidator =
    Rc<dyn Fn(ValidationRequest) -> LocalBoxFuture<'static, ValidationStatus>>;

/// Constructor options for a parameter
#[derive(Clone, Default)]
pub struct ParameterInit {
    pub label: Option<String>,
    pub description: Option<String>,
    pub placeholder: Option<String>,
    pub hide_label: bool,
    /// Fail validation when the value is absent or null
    pub required: bool,
    pub hidden: bool,
    pub disabled: bool,
    /// Initial value, written through the form (and firing a change event)
    /// at registration time
    pub value: Option<Value>,
    /// Logical dependency name -> the field name of another parameter in the
    /// same form. Lets a reusable parameter validate against a peer field
    /// without hardcoding its name.
    pub dependencies: HashMap<String, String>,
    pub dynamic: DynamicProperties,
    pub on_validate_sync: Option<ParameterValidator>,
    pub on_validate_async: Option<AsyncParameterValidator>,
}

/// The inputs handed to a custom validation callback: the parameter's value
/// at the time validation started, plus the resolved values of its declared
/// dependencies.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    parameter_name: String,
    value: Value,
    dependencies: HashMap<String, Value>,
}

impl ValidationRequest {
    /// The value under validation. Absent fields appear as `Value::Null`.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The resolved value of a declared dependency, or `None` if no
    /// dependency with that logical name was wired at construction time.
    pub fn dependency(&self, name: &str) -> Option<&Value> {
        let value = self.dependencies.get(name);
        if value.is_none() {
            tracing::error!(
                parameter = %self.parameter_name,
                dependency = %name,
                "parameter is missing a declared dependency"
            );
        }
        value
    }

    /// The resolved value of a declared dependency as a string. Returns
    /// `None` when the dependency is missing or its value is null; logs a
    /// warning and stringifies when the value is not a string.
    pub fn dependency_as_str(&self, name: &str) -> Option<String> {
        match self.dependency(name)? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => {
                tracing::warn!(
                    parameter = %self.parameter_name,
                    dependency = %name,
                    "dependency value is not a string"
                );
                Some(other.to_string())
            }
        }
    }
}

struct ParamExtra {
    required: bool,
    placeholder: Option<String>,
    hide_label: bool,
}

struct ParamState {
    name: String,
    kind: ParameterKind,
    form: WeakForm,
    parent_section: Option<Section>,
    props: RefCell<EntryProps>,
    extra: RefCell<ParamExtra>,
    dependencies: HashMap<String, String>,
    dynamic: DynamicProperties,
    on_validate_sync: Option<ParameterValidator>,
    on_validate_async: Option<AsyncParameterValidator>,
}

/// A typed, value-bound entry in a form.
///
/// The parameter never stores its value: reads go straight to the parent
/// form's current values and writes route through
/// [`Form::update_value`](crate::form::Form::update_value), so change events
/// fire uniformly regardless of whether mutation happened through the
/// parameter or the form.
#[derive(Clone)]
pub struct Parameter {
    state: Rc<ParamState>,
}

impl Parameter {
    pub(crate) fn new(
        form: WeakForm,
        name: &str,
        kind: ParameterKind,
        init: &ParameterInit,
        parent_section: Option<Section>,
    ) -> Self {
        Self {
            state: Rc::new(ParamState {
                name: name.to_string(),
                kind,
                form,
                parent_section,
                props: RefCell::new(EntryProps {
                    label: init.label.clone(),
                    description: init.description.clone(),
                    hidden: init.hidden,
                    disabled: init.disabled,
                }),
                extra: RefCell::new(ParamExtra {
                    required: init.required,
                    placeholder: init.placeholder.clone(),
                    hide_label: init.hide_label,
                }),
                dependencies: init.dependencies.clone(),
                dynamic: init.dynamic.clone(),
                on_validate_sync: init.on_validate_sync.clone(),
                on_validate_async: init.on_validate_async.clone(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.state.kind
    }

    /// The display label, defaulting to the parameter name
    pub fn label(&self) -> String {
        self.state
            .props
            .borrow()
            .label
            .clone()
            .unwrap_or_else(|| self.state.name.clone())
    }

    pub fn set_label(&self, label: Option<String>) {
        self.state.props.borrow_mut().label = label;
    }

    pub fn description(&self) -> Option<String> {
        self.state.props.borrow().description.clone()
    }

    pub fn placeholder(&self) -> Option<String> {
        self.state.extra.borrow().placeholder.clone()
    }

    pub fn set_placeholder(&self, placeholder: Option<String>) {
        self.state.extra.borrow_mut().placeholder = placeholder;
    }

    pub fn hide_label(&self) -> bool {
        self.state.extra.borrow().hide_label
    }

    pub fn required(&self) -> bool {
        self.state.extra.borrow().required
    }

    pub fn set_required(&self, required: bool) {
        self.state.extra.borrow_mut().required = required;
    }

    /// Effective visibility: hidden when this parameter or any ancestor
    /// section is hidden
    pub fn hidden(&self) -> bool {
        self.state.props.borrow().hidden
            || self
                .state
                .parent_section
                .as_ref()
                .is_some_and(Section::hidden)
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.state.props.borrow_mut().hidden = hidden;
    }

    pub fn disabled(&self) -> bool {
        self.state.props.borrow().disabled
            || self
                .state
                .parent_section
                .as_ref()
                .is_some_and(Section::disabled)
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.state.props.borrow_mut().disabled = disabled;
    }

    /// The parameter's current value from the parent form. Absent fields
    /// read as `Value::Null`.
    pub fn value(&self) -> Value {
        self.state.form.upgrade().values().field(&self.state.name)
    }

    /// Write the value through the parent form, firing a change event
    pub fn set_value(&self, value: Value) {
        self.state.form.upgrade().update_value(&self.state.name, value);
    }

    /// This parameter's status in the form's current validation snapshot
    pub fn validation_status(&self) -> Option<ValidationStatus> {
        self.state
            .form
            .upgrade()
            .validation_snapshot()
            .entry_status(&self.state.name)
    }

    /// The raw value of a declared dependency
    pub fn dependency_value(&self, name: &str) -> Option<Value> {
        self.validation_request().dependency(name).cloned()
    }

    /// The value of a declared dependency as a string
    pub fn dependency_value_as_str(&self, name: &str) -> Option<String> {
        self.validation_request().dependency_as_str(name)
    }

    /// Resolve the parameter's value and dependencies against the form's
    /// current values
    pub(crate) fn validation_request(&self) -> ValidationRequest {
        let form = self.state.form.upgrade();
        let values = form.values();
        let dependencies = self
            .state
            .dependencies
            .iter()
            .map(|(logical, field)| (logical.clone(), values.field(field)))
            .collect();
        ValidationRequest {
            parameter_name: self.state.name.clone(),
            value: values.field(&self.state.name),
            dependencies,
        }
    }

    /// Run the synchronous validations: the required check, the kind's
    /// type-coercion check, then the custom callback. The first failure wins.
    pub(crate) fn validate_sync(&self, context: &FormContext) -> ValidationStatus {
        let request = self.validation_request();

        if self.required() && request.value().is_null() {
            return ValidationStatus::error(context.translate(
                "form.entry-required",
                &[("label", capitalize_first(&self.label()))],
            ));
        }

        if !request.value().is_null() {
            if let Err(key) = self.state.kind.check(request.value()) {
                return ValidationStatus::error(context.translate(key, &[]));
            }
        }

        if let Some(validate) = &self.state.on_validate_sync {
            return validate(&request);
        }

        ValidationStatus::ok()
    }

    /// Run the custom async validation, if any. The request is resolved
    /// eagerly so the callback sees the values as of the call.
    pub(crate) fn validate_async(&self) -> LocalBoxFuture<'static, ValidationStatus> {
        match &self.state.on_validate_async {
            Some(validate) => validate(self.validation_request()),
            None => futures_util::future::ready(ValidationStatus::ok()).boxed_local(),
        }
    }

    pub(crate) fn apply_dynamic(&self, values: &FormValues) -> bool {
        let dynamic = &self.state.dynamic;
        let mut changed = false;
        {
            let mut props = self.state.props.borrow_mut();
            changed |= apply_dynamic_bool(&mut props.hidden, dynamic.hidden.as_ref(), values);
            changed |= apply_dynamic_bool(&mut props.disabled, dynamic.disabled.as_ref(), values);
            changed |= apply_dynamic_string(&mut props.label, dynamic.label.as_ref(), values);
        }
        {
            let mut extra = self.state.extra.borrow_mut();
            changed |= apply_dynamic_bool(&mut extra.required, dynamic.required.as_ref(), values);
            changed |=
                apply_dynamic_string(&mut extra.placeholder, dynamic.placeholder.as_ref(), values);
        }
        changed
    }
}

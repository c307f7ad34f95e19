//! Nesting one form inside another

use crate::form::entry::{
    apply_dynamic_bool, apply_dynamic_string, DynamicProperties, Entry, EntryInit, EntryProps, Item,
};
use crate::form::form::{Form, WeakForm};
use crate::form::parameter::{Parameter, ParameterInit, ParameterKind};
use crate::form::section::{Section, SectionInit};
use crate::form::snapshot::ValidationSnapshot;
use crate::form::status::ValidationStatus;
use crate::form::values::FormValues;
use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Constructor options for a sub-form
#[derive(Clone, Default)]
pub struct SubFormInit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub hidden: bool,
    pub disabled: bool,
    pub expanded: bool,
    pub dynamic: DynamicProperties,
}

struct SubFormState {
    name: String,
    parent: WeakForm,
    parent_section: Option<Section>,
    child: Form,
    props: RefCell<EntryProps>,
    expanded: Cell<bool>,
    dynamic: DynamicProperties,
}

/// An independent child form mounted as a single entry of a parent form.
///
/// The child keeps its own entries, events and validation generations. Its
/// full value record is mirrored into the parent under the sub-form's field
/// name, and during parent validation the child's overall status becomes
/// this entry's status.
#[derive(Clone)]
pub struct SubForm {
    state: Rc<SubFormState>,
}

impl SubForm {
    pub(crate) fn new(
        parent: WeakForm,
        name: &str,
        child: Form,
        init: &SubFormInit,
        parent_section: Option<Section>,
    ) -> Self {
        Self {
            state: Rc::new(SubFormState {
                name: name.to_string(),
                parent,
                parent_section,
                child,
                props: RefCell::new(EntryProps {
                    label: init.title.clone(),
                    description: init.description.clone(),
                    hidden: init.hidden,
                    disabled: init.disabled,
                }),
                expanded: Cell::new(init.expanded),
                dynamic: init.dynamic.clone(),
            }),
        }
    }

    /// Keep the parent's record for this entry in step with the child's
    /// values
    pub(crate) fn attach_mirror(&self) {
        let parent = self.state.parent.clone();
        let name = self.state.name.clone();
        self.state.child.on_change(move |new_values, _old_values| {
            parent.upgrade().update_value(&name, new_values.to_value());
        });
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// The display title, defaulting to the sub-form's name
    pub fn title(&self) -> String {
        self.state
            .props
            .borrow()
            .label
            .clone()
            .unwrap_or_else(|| self.state.name.clone())
    }

    pub fn set_title(&self, title: Option<String>) {
        self.state.props.borrow_mut().label = title;
    }

    pub fn description(&self) -> Option<String> {
        self.state.props.borrow().description.clone()
    }

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

    pub fn expanded(&self) -> bool {
        self.state.expanded.get()
    }

    pub fn set_expanded(&self, expanded: bool) {
        self.state.expanded.set(expanded);
    }

    /// The mounted child form
    pub fn form(&self) -> Form {
        self.state.child.clone()
    }

    pub fn values(&self) -> FormValues {
        self.state.child.values()
    }

    pub fn set_values(&self, values: FormValues) {
        self.state.child.set_values(values);
    }

    pub fn update_value(&self, name: &str, value: serde_json::Value) {
        self.state.child.update_value(name, value);
    }

    pub fn param(&self, name: &str, kind: ParameterKind, init: ParameterInit) -> Parameter {
        self.state.child.param(name, kind, init)
    }

    pub fn get_param(&self, name: &str) -> Result<Parameter, crate::error::FormError> {
        self.state.child.get_param(name)
    }

    pub fn section(&self, name: &str, init: SectionInit) -> Section {
        self.state.child.section(name, init)
    }

    pub fn item(&self, name: &str, init: EntryInit) -> Item {
        self.state.child.item(name, init)
    }

    pub fn get_entry(&self, name: &str) -> Option<Entry> {
        self.state.child.get_entry(name)
    }

    pub fn child_entries_count(&self) -> usize {
        self.state.child.child_entries_count()
    }

    pub fn all_entries_count(&self) -> usize {
        self.state.child.all_entries_count()
    }

    pub fn validation_status(&self) -> Option<ValidationStatus> {
        self.state.child.validation_status()
    }

    pub fn validation_snapshot(&self) -> ValidationSnapshot {
        self.state.child.validation_snapshot()
    }

    pub fn validate(&self) -> LocalBoxFuture<'static, ValidationSnapshot> {
        self.state.child.validate()
    }

    pub async fn wait_for_validation(&self) -> Option<ValidationStatus> {
        self.state.child.wait_for_validation().await
    }

    pub fn evaluate(&self) -> bool {
        self.state.child.evaluate()
    }

    /// Run the child's synchronous validation phase on a fresh child
    /// snapshot. Returns the child's overall status, which is normally still
    /// unset at this point.
    pub(crate) fn validate_child_sync(&self, force: bool) -> Option<ValidationStatus> {
        let child = &self.state.child;
        let snapshot = child.start_snapshot();
        child.validate_sync_phase(&snapshot, force);
        child.emit_validate(&snapshot);
        snapshot.overall_status()
    }

    /// Run the child's asynchronous validation phase on its in-flight
    /// snapshot and resolve to the child's overall status.
    pub(crate) fn validate_child_async(
        &self,
        force: bool,
    ) -> LocalBoxFuture<'static, Option<ValidationStatus>> {
        let child = self.state.child.clone();
        let snapshot = child.validation_snapshot();
        async move {
            child.validate_async_phase(snapshot.clone(), force).await;
            if !child.check_and_cancel(&snapshot, force) {
                child.finalize_snapshot(&snapshot);
            }
            snapshot.overall_status()
        }
        .boxed_local()
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
        if let Some(derive) = dynamic.expanded.as_ref() {
            let derived = derive(values);
            if derived != self.state.expanded.get() {
                self.state.expanded.set(derived);
                changed = true;
            }
        }
        changed
    }
}

//! Grouping entries with cascading visibility

use crate::form::entry::{
    apply_dynamic_bool, apply_dynamic_string, DynamicProperties, Entry, EntryInit, EntryProps, Item,
};
use crate::form::form::WeakForm;
use crate::form::parameter::{Parameter, ParameterInit, ParameterKind};
use crate::form::subform::{SubForm, SubFormInit};
use crate::form::values::FormValues;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Constructor options for a section
#[derive(Clone)]
pub struct SectionInit {
    pub label: Option<String>,
    pub description: Option<String>,
    pub hidden: bool,
    pub disabled: bool,
    /// Whether the section starts expanded in a disclosure-style UI
    pub expanded: bool,
    pub dynamic: DynamicProperties,
}

impl Default for SectionInit {
    fn default() -> Self {
        Self {
            label: None,
            description: None,
            hidden: false,
            disabled: false,
            expanded: true,
            dynamic: DynamicProperties::default(),
        }
    }
}

struct SectionState {
    name: String,
    form: WeakForm,
    parent_section: Option<Section>,
    props: RefCell<EntryProps>,
    expanded: Cell<bool>,
    children: RefCell<Vec<Entry>>,
    dynamic: DynamicProperties,
}

/// A named grouping of entries.
///
/// Sections carry no value of their own. Their hidden and disabled flags
/// cascade to every descendant entry, so hiding a section effectively hides
/// the whole subtree while each child keeps its own flag untouched.
#[derive(Clone)]
pub struct Section {
    state: Rc<SectionState>,
}

impl Section {
    pub(crate) fn new(
        form: WeakForm,
        name: &str,
        init: &SectionInit,
        parent_section: Option<Section>,
    ) -> Self {
        Self {
            state: Rc::new(SectionState {
                name: name.to_string(),
                form,
                parent_section,
                props: RefCell::new(EntryProps {
                    label: init.label.clone(),
                    description: init.description.clone(),
                    hidden: init.hidden,
                    disabled: init.disabled,
                }),
                expanded: Cell::new(init.expanded),
                children: RefCell::new(Vec::new()),
                dynamic: init.dynamic.clone(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

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

    /// Effective visibility: hidden when this section or any ancestor
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

    /// Effective expansion: expanded when this section or any ancestor
    /// section is expanded
    pub fn expanded(&self) -> bool {
        self.state.expanded.get()
            || self
                .state
                .parent_section
                .as_ref()
                .is_some_and(Section::expanded)
    }

    pub fn set_expanded(&self, expanded: bool) {
        self.state.expanded.set(expanded);
    }

    /// The section's direct children, in registration order
    pub fn children(&self) -> Vec<Entry> {
        self.state.children.borrow().clone()
    }

    pub fn child_entries_count(&self) -> usize {
        self.state.children.borrow().len()
    }

    /// Register a parameter inside this section
    pub fn param(&self, name: &str, kind: ParameterKind, init: ParameterInit) -> Parameter {
        let form = self.state.form.upgrade();
        let param = form.register_param(name, kind, init, Some(self.clone()));
        self.state
            .children
            .borrow_mut()
            .push(Entry::Parameter(param.clone()));
        param
    }

    /// Register a nested section inside this section
    pub fn section(&self, name: &str, init: SectionInit) -> Section {
        let form = self.state.form.upgrade();
        let section = form.register_section(name, init, Some(self.clone()));
        self.state
            .children
            .borrow_mut()
            .push(Entry::Section(section.clone()));
        section
    }

    /// Register a display-only item inside this section
    pub fn item(&self, name: &str, init: EntryInit) -> Item {
        let form = self.state.form.upgrade();
        let item = form.register_item(name, init, Some(self.clone()));
        self.state.children.borrow_mut().push(Entry::Item(item.clone()));
        item
    }

    /// Register a sub-form inside this section
    pub fn sub_form(
        &self,
        name: &str,
        child: crate::form::Form,
        init: SubFormInit,
    ) -> SubForm {
        let form = self.state.form.upgrade();
        let sub = form.register_sub_form(name, child, init, Some(self.clone()));
        self.state
            .children
            .borrow_mut()
            .push(Entry::SubForm(sub.clone()));
        sub
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

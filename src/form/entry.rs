//! Common entry machinery and display-only items

use crate::form::parameter::Parameter;
use crate::form::section::Section;
use crate::form::subform::SubForm;
use crate::form::values::FormValues;
use std::cell::RefCell;
use std::rc::Rc;

/// A dynamic property deriving a boolean from the current form values
pub type DynamicBool = Rc<dyn Fn(&FormValues) -> bool>;
/// A dynamic property deriving a string from the current form values
pub type DynamicString = Rc<dyn Fn(&FormValues) -> String>;

/// Value-derived property functions for an entry.
///
/// Dynamic properties are pure functions of the form's current values and
/// must tolerate absent fields. They are only recomputed when
/// [`Form::evaluate`](crate::form::Form::evaluate) is called explicitly,
/// never on individual value mutations, which keeps recomputation off the
/// hot path of value changes.
#[derive(Clone, Default)]
pub struct DynamicProperties {
    pub hidden: Option<DynamicBool>,
    pub disabled: Option<DynamicBool>,
    /// Parameters only
    pub required: Option<DynamicBool>,
    /// Sections and sub-forms only
    pub expanded: Option<DynamicBool>,
    pub label: Option<DynamicString>,
    /// Parameters only
    pub placeholder: Option<DynamicString>,
}

/// Constructor options shared by all entry kinds
#[derive(Clone, Default)]
pub struct EntryInit {
    pub label: Option<String>,
    pub description: Option<String>,
    pub hidden: bool,
    pub disabled: bool,
    pub dynamic: DynamicProperties,
}

/// Mutable properties common to every entry kind
pub(crate) struct EntryProps {
    pub label: Option<String>,
    pub description: Option<String>,
    pub hidden: bool,
    pub disabled: bool,
}

impl EntryProps {
    pub(crate) fn from_init(init: &EntryInit) -> Self {
        Self {
            label: init.label.clone(),
            description: init.description.clone(),
            hidden: init.hidden,
            disabled: init.disabled,
        }
    }
}

/// Recompute a dynamic boolean property. Returns true if the stored value
/// changed.
pub(crate) fn apply_dynamic_bool(
    target: &mut bool,
    dynamic: Option<&DynamicBool>,
    values: &FormValues,
) -> bool {
    if let Some(derive) = dynamic {
        let derived = derive(values);
        if derived != *target {
            *target = derived;
            return true;
        }
    }
    false
}

/// Recompute a dynamic string property. Returns true if the stored value
/// changed.
pub(crate) fn apply_dynamic_string(
    target: &mut Option<String>,
    dynamic: Option<&DynamicString>,
    values: &FormValues,
) -> bool {
    if let Some(derive) = dynamic {
        let derived = derive(values);
        if target.as_deref() != Some(derived.as_str()) {
            *target = Some(derived);
            return true;
        }
    }
    false
}

/// A registered node in a form tree
#[derive(Clone)]
pub enum Entry {
    Item(Item),
    Parameter(Parameter),
    Section(Section),
    SubForm(SubForm),
}

impl Entry {
    pub fn name(&self) -> String {
        match self {
            Entry::Item(item) => item.name().to_string(),
            Entry::Parameter(param) => param.name().to_string(),
            Entry::Section(section) => section.name().to_string(),
            Entry::SubForm(sub) => sub.name().to_string(),
        }
    }

    pub(crate) fn apply_dynamic(&self, values: &FormValues) -> bool {
        match self {
            Entry::Item(item) => item.apply_dynamic(values),
            Entry::Parameter(param) => param.apply_dynamic(values),
            Entry::Section(section) => section.apply_dynamic(values),
            Entry::SubForm(sub) => sub.apply_dynamic(values),
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Entry::Item(_) => "Item",
            Entry::Parameter(_) => "Parameter",
            Entry::Section(_) => "Section",
            Entry::SubForm(_) => "SubForm",
        };
        write!(f, "Entry::{}({:?})", kind, self.name())
    }
}

/// A display-only entry. Items take part in the entry registry and in
/// hidden/disabled cascading but carry no value and are never validated.
#[derive(Clone)]
pub struct Item {
    state: Rc<ItemState>,
}

struct ItemState {
    name: String,
    parent_section: Option<Section>,
    props: RefCell<EntryProps>,
    dynamic: DynamicProperties,
}

impl Item {
    pub(crate) fn new(name: &str, init: EntryInit, parent_section: Option<Section>) -> Self {
        Self {
            state: Rc::new(ItemState {
                name: name.to_string(),
                parent_section,
                props: RefCell::new(EntryProps::from_init(&init)),
                dynamic: init.dynamic,
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

    /// Effective visibility: hidden when this item or any ancestor section
    /// is hidden
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

    pub(crate) fn apply_dynamic(&self, values: &FormValues) -> bool {
        let mut props = self.state.props.borrow_mut();
        let dynamic = &self.state.dynamic;
        let mut changed = false;
        changed |= apply_dynamic_bool(&mut props.hidden, dynamic.hidden.as_ref(), values);
        changed |= apply_dynamic_bool(&mut props.disabled, dynamic.disabled.as_ref(), values);
        changed |= apply_dynamic_string(&mut props.label, dynamic.label.as_ref(), values);
        changed
    }
}

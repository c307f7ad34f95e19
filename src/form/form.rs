//! The form engine

use crate::context::FormContext;
use crate::error::FormError;
use crate::form::entry::{Entry, EntryInit, Item};
use crate::form::parameter::{Parameter, ParameterInit, ParameterKind};
use crate::form::section::{Section, SectionInit};
use crate::form::snapshot::ValidationSnapshot;
use crate::form::status::ValidationStatus;
use crate::form::subform::{SubForm, SubFormInit};
use crate::form::values::FormValues;
use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

// If there is an async validation in progress, how long to wait before
// starting another one
const ASYNC_VALIDATION_DELAY: Duration = Duration::from_millis(300);

/// Whole-form synchronous validation callback
pub type FormValidator = Rc<dyn Fn(&FormValues) -> ValidationStatus>;
/// Whole-form asynchronous validation callback
pub type AsyncFormValidator = Rc<dyn Fn(FormValues) -> LocalBoxFuture<'static, ValidationStatus>>;

/// Handler for value change events
pub type ChangeHandler = Rc<dyn Fn(&FormValues, &FormValues)>;
/// Handler for validation events
pub type ValidateHandler = Rc<dyn Fn(&ValidationSnapshot)>;

/// An opaque handle identifying a registered event handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

/// Constructor options for a form
#[derive(Clone, Default)]
pub struct FormInit {
    pub values: FormValues,
    pub title: Option<String>,
    pub description: Option<String>,
    pub on_validate_sync: Option<FormValidator>,
    pub on_validate_async: Option<AsyncFormValidator>,
    pub context: FormContext,
}

struct FormInner {
    context: FormContext,
    title: RefCell<Option<String>>,
    description: Option<String>,
    values: RefCell<FormValues>,
    // Kept for reset()
    initial_values: FormValues,
    // Every entry in the form, including those nested in sections, in
    // registration order. Does not include entries of mounted sub-forms.
    all_entries: RefCell<Vec<Entry>>,
    // Direct children only (top-level entries and sections)
    child_entries: RefCell<Vec<Entry>>,
    generation: Cell<u64>,
    // The current snapshot. Replaced as soon as a new validation starts, so
    // an in-flight older generation can detect it has been superseded.
    snapshot: RefCell<ValidationSnapshot>,
    change_handlers: RefCell<Vec<(Subscription, ChangeHandler)>>,
    validate_handlers: RefCell<Vec<(Subscription, ValidateHandler)>>,
    next_subscription: Cell<u64>,
    on_validate_sync: RefCell<Option<FormValidator>>,
    on_validate_async: RefCell<Option<AsyncFormValidator>>,
}

/// A non-owning handle to a form, held by its entries.
///
/// Entries are owned by the form's registry, so they hold weak references
/// back to it to avoid a reference cycle.
#[derive(Clone)]
pub(crate) struct WeakForm(Weak<FormInner>);

impl WeakForm {
    pub(crate) fn upgrade(&self) -> Form {
        match self.0.upgrade() {
            Some(inner) => Form { inner },
            None => panic!("form was dropped while an entry still held a handle to it"),
        }
    }
}

/// A reactive collection of named values with entry metadata, change events
/// and two-phase validation.
///
/// Handles are cheap to clone and all share the same underlying state. The
/// engine is single-threaded; forms and their entries are not `Send`.
#[derive(Clone)]
pub struct Form {
    inner: Rc<FormInner>,
}

impl Form {
    pub fn new(init: FormInit) -> Self {
        let snapshot = ValidationSnapshot::initial(init.values.clone());
        Self {
            inner: Rc::new(FormInner {
                context: init.context,
                title: RefCell::new(init.title),
                description: init.description,
                initial_values: init.values.clone(),
                values: RefCell::new(init.values),
                all_entries: RefCell::new(Vec::new()),
                child_entries: RefCell::new(Vec::new()),
                generation: Cell::new(0),
                snapshot: RefCell::new(snapshot),
                change_handlers: RefCell::new(Vec::new()),
                validate_handlers: RefCell::new(Vec::new()),
                next_subscription: Cell::new(0),
                on_validate_sync: RefCell::new(init.on_validate_sync),
                on_validate_async: RefCell::new(init.on_validate_async),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakForm {
        WeakForm(Rc::downgrade(&self.inner))
    }

    pub(crate) fn context(&self) -> &FormContext {
        &self.inner.context
    }

    pub fn title(&self) -> Option<String> {
        self.inner.title.borrow().clone()
    }

    pub fn set_title(&self, title: Option<String>) {
        *self.inner.title.borrow_mut() = title;
    }

    pub fn description(&self) -> Option<String> {
        self.inner.description.clone()
    }

    /// Replace the whole-form synchronous validation callback
    pub fn set_on_validate_sync(&self, validator: Option<FormValidator>) {
        *self.inner.on_validate_sync.borrow_mut() = validator;
    }

    /// Replace the whole-form asynchronous validation callback
    pub fn set_on_validate_async(&self, validator: Option<AsyncFormValidator>) {
        *self.inner.on_validate_async.borrow_mut() = validator;
    }

    // ----- entry registry -----

    /// Register a top-level parameter. Panics if an entry with the same name
    /// already exists.
    pub fn param(&self, name: &str, kind: ParameterKind, init: ParameterInit) -> Parameter {
        let param = self.register_param(name, kind, init, None);
        self.inner
            .child_entries
            .borrow_mut()
            .push(Entry::Parameter(param.clone()));
        param
    }

    /// Register a top-level section
    pub fn section(&self, name: &str, init: SectionInit) -> Section {
        let section = self.register_section(name, init, None);
        self.inner
            .child_entries
            .borrow_mut()
            .push(Entry::Section(section.clone()));
        section
    }

    /// Register a top-level display-only item
    pub fn item(&self, name: &str, init: EntryInit) -> Item {
        let item = self.register_item(name, init, None);
        self.inner
            .child_entries
            .borrow_mut()
            .push(Entry::Item(item.clone()));
        item
    }

    /// Mount a child form as a top-level sub-form entry
    pub fn sub_form(&self, name: &str, child: Form, init: SubFormInit) -> SubForm {
        let sub = self.register_sub_form(name, child, init, None);
        self.inner
            .child_entries
            .borrow_mut()
            .push(Entry::SubForm(sub.clone()));
        sub
    }

    pub(crate) fn register_param(
        &self,
        name: &str,
        kind: ParameterKind,
        init: ParameterInit,
        parent_section: Option<Section>,
    ) -> Parameter {
        let param = Parameter::new(self.downgrade(), name, kind, &init, parent_section);
        self.register_entry(Entry::Parameter(param.clone()));
        if let Some(value) = init.value {
            self.update_value(name, value);
        }
        param
    }

    pub(crate) fn register_section(
        &self,
        name: &str,
        init: SectionInit,
        parent_section: Option<Section>,
    ) -> Section {
        let section = Section::new(self.downgrade(), name, &init, parent_section);
        self.register_entry(Entry::Section(section.clone()));
        section
    }

    pub(crate) fn register_item(
        &self,
        name: &str,
        init: EntryInit,
        parent_section: Option<Section>,
    ) -> Item {
        let item = Item::new(name, init, parent_section);
        self.register_entry(Entry::Item(item.clone()));
        item
    }

    pub(crate) fn register_sub_form(
        &self,
        name: &str,
        child: Form,
        init: SubFormInit,
        parent_section: Option<Section>,
    ) -> SubForm {
        let sub = SubForm::new(self.downgrade(), name, child, &init, parent_section);
        // The duplicate-name check must run before the seeding write so a
        // rejected registration leaves values and subscribers untouched. The
        // write does not recurse into the child: the pushed-down record
        // equals the child's current values.
        self.register_entry(Entry::SubForm(sub.clone()));
        self.update_value(name, sub.values().to_value());
        sub.attach_mirror();
        sub
    }

    fn register_entry(&self, entry: Entry) {
        let name = entry.name();
        let mut all = self.inner.all_entries.borrow_mut();
        if all.iter().any(|existing| existing.name() == name) {
            panic!("{}", FormError::DuplicateEntry(name));
        }
        all.push(entry);
    }

    pub fn get_entry(&self, name: &str) -> Option<Entry> {
        self.inner
            .all_entries
            .borrow()
            .iter()
            .find(|entry| entry.name() == name)
            .cloned()
    }

    pub fn get_param(&self, name: &str) -> Result<Parameter, FormError> {
        match self.get_entry(name) {
            Some(Entry::Parameter(param)) => Ok(param),
            Some(_) => Err(FormError::NotAParameter(name.to_string())),
            None => Err(FormError::NoSuchEntry(name.to_string())),
        }
    }

    pub fn get_section(&self, name: &str) -> Result<Section, FormError> {
        match self.get_entry(name) {
            Some(Entry::Section(section)) => Ok(section),
            Some(_) => Err(FormError::NotASection(name.to_string())),
            None => Err(FormError::NoSuchEntry(name.to_string())),
        }
    }

    pub fn get_sub_form(&self, name: &str) -> Result<SubForm, FormError> {
        match self.get_entry(name) {
            Some(Entry::SubForm(sub)) => Ok(sub),
            Some(_) => Err(FormError::NotASubForm(name.to_string())),
            None => Err(FormError::NoSuchEntry(name.to_string())),
        }
    }

    /// Direct children in registration order (entries inside sections are
    /// reached through their section)
    pub fn child_entries(&self) -> Vec<Entry> {
        self.inner.child_entries.borrow().clone()
    }

    /// Every entry registered with this form, in registration order. Entries
    /// of mounted sub-forms are not included.
    pub fn all_entries(&self) -> Vec<Entry> {
        self.inner.all_entries.borrow().clone()
    }

    pub fn child_entries_count(&self) -> usize {
        self.inner.child_entries.borrow().len()
    }

    pub fn all_entries_count(&self) -> usize {
        self.inner.all_entries.borrow().len()
    }

    // ----- values -----

    /// A copy of the form's current values
    pub fn values(&self) -> FormValues {
        self.inner.values.borrow().clone()
    }

    /// Replace the whole value record, firing a change event. Writing a
    /// record equal to the current one is a no-op.
    pub fn set_values(&self, values: FormValues) {
        if *self.inner.values.borrow() == values {
            return;
        }
        let old_values = self.inner.values.replace(values.clone());
        self.emit_change(&values, &old_values);
    }

    /// Set a single field, firing a change event. Writing a value equal to
    /// the current one is a no-op.
    pub fn update_value(&self, name: &str, value: Value) {
        if self.values().field(name) == value {
            return;
        }
        let mut new_values = self.values();
        new_values.set(name, value.clone());
        self.set_values(new_values);

        // Writes to a mounted sub-form's field push down into the child
        if let Some(Entry::SubForm(sub)) = self.get_entry(name) {
            if let Some(child_values) = FormValues::from_object(value) {
                if child_values != sub.values() {
                    sub.set_values(child_values);
                }
            }
        }
    }

    /// Restore the values the form was constructed with
    pub fn reset(&self) {
        self.set_values(self.inner.initial_values.clone());
    }

    /// Recompute every entry's dynamic properties from the current values.
    /// Fires a change event and returns true if anything changed.
    pub fn evaluate(&self) -> bool {
        let values = self.values();
        let entries = self.all_entries();
        let mut changed = false;
        for entry in &entries {
            changed |= entry.apply_dynamic(&values);
        }
        if changed {
            self.emit_change(&values, &values);
        }
        changed
    }

    // ----- events -----

    pub fn on_change(&self, handler: impl Fn(&FormValues, &FormValues) + 'static) -> Subscription {
        let subscription = self.next_subscription();
        self.inner
            .change_handlers
            .borrow_mut()
            .push((subscription, Rc::new(handler)));
        subscription
    }

    pub fn off_change(&self, subscription: Subscription) {
        self.inner
            .change_handlers
            .borrow_mut()
            .retain(|(id, _)| *id != subscription);
    }

    pub fn on_validate(&self, handler: impl Fn(&ValidationSnapshot) + 'static) -> Subscription {
        let subscription = self.next_subscription();
        self.inner
            .validate_handlers
            .borrow_mut()
            .push((subscription, Rc::new(handler)));
        subscription
    }

    pub fn off_validate(&self, subscription: Subscription) {
        self.inner
            .validate_handlers
            .borrow_mut()
            .retain(|(id, _)| *id != subscription);
    }

    fn next_subscription(&self) -> Subscription {
        let id = self.inner.next_subscription.get();
        self.inner.next_subscription.set(id + 1);
        Subscription(id)
    }

    fn emit_change(&self, new_values: &FormValues, old_values: &FormValues) {
        // Handlers may re-enter the form and mutate the handler list, so
        // dispatch runs over a copy
        let handlers: Vec<ChangeHandler> = self
            .inner
            .change_handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in handlers {
            handler(new_values, old_values);
        }
    }

    pub(crate) fn emit_validate(&self, snapshot: &ValidationSnapshot) {
        let handlers: Vec<ValidateHandler> = self
            .inner
            .validate_handlers
            .borrow()
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();
        for handler in handlers {
            handler(snapshot);
        }
    }

    // ----- validation -----

    /// The current snapshot. This can be an in-flight generation which has
    /// not resolved yet.
    pub fn validation_snapshot(&self) -> ValidationSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// The overall status of the current snapshot, or `None` while it is
    /// still resolving (or no validation ever ran)
    pub fn validation_status(&self) -> Option<ValidationStatus> {
        self.validation_snapshot().overall_status()
    }

    pub fn entry_validation_status(&self, name: &str) -> Option<ValidationStatus> {
        self.validation_snapshot().entry_status(name)
    }

    /// Validate the form against its current values.
    ///
    /// The synchronous phase runs before this returns; the returned future
    /// drives the asynchronous phase and resolves to the snapshot. Starting
    /// a new validation supersedes any unresolved one, which then resolves
    /// with a `Canceled` overall status.
    pub fn validate(&self) -> LocalBoxFuture<'static, ValidationSnapshot> {
        self.validate_with(false)
    }

    /// Validate immune to cancellation. A forced run still supersedes any
    /// in-flight non-forced run and skips the in-progress throttle delay.
    pub fn validate_forced(&self) -> LocalBoxFuture<'static, ValidationSnapshot> {
        self.validate_with(true)
    }

    fn validate_with(&self, force: bool) -> LocalBoxFuture<'static, ValidationSnapshot> {
        let previous_in_progress = !self.inner.snapshot.borrow().is_complete();
        let started = self.inner.context.now();

        let snapshot = self.start_snapshot();
        self.validate_sync_phase(&snapshot, force);

        // Fire a validation event so consumers can react to synchronous
        // results immediately
        self.emit_validate(&snapshot);

        let form = self.clone();
        async move {
            // Yield before the async phase to let a competing validate()
            // call supersede this one. Go more slowly when an async
            // validation was already in flight to avoid piling up expensive
            // operations.
            if !force && previous_in_progress {
                tokio::time::sleep(ASYNC_VALIDATION_DELAY).await;
            } else {
                tokio::task::yield_now().await;
            }

            if form.check_and_cancel(&snapshot, force) {
                return snapshot;
            }

            form.validate_async_phase(snapshot.clone(), force).await;

            if form.check_and_cancel(&snapshot, force) {
                return snapshot;
            }

            form.finalize_snapshot(&snapshot);
            tracing::debug!(
                generation = snapshot.generation(),
                elapsed_ms = (form.context().now() - started).num_milliseconds(),
                "validation resolved"
            );
            snapshot
        }
        .boxed_local()
    }

    /// Start a new validation generation and make it the current snapshot
    pub(crate) fn start_snapshot(&self) -> ValidationSnapshot {
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);
        let snapshot = ValidationSnapshot::new(generation, self.values());
        *self.inner.snapshot.borrow_mut() = snapshot.clone();
        snapshot
    }

    /// Run per-entry synchronous validation plus the whole-form sync
    /// callback
    pub(crate) fn validate_sync_phase(&self, snapshot: &ValidationSnapshot, force: bool) {
        let entries = self.all_entries();
        for entry in &entries {
            match entry {
                Entry::Parameter(param) => {
                    let mut status = param.validate_sync(&self.inner.context);
                    status.forced = force;
                    snapshot.set_entry_status(param.name(), status);
                }
                Entry::SubForm(sub) => {
                    // The child's overall status is normally still unset
                    // until its async phase resolves
                    if let Some(status) = sub.validate_child_sync(force) {
                        snapshot.set_entry_status(sub.name(), status);
                    }
                }
                Entry::Item(_) | Entry::Section(_) => {}
            }
        }

        let validate = self.inner.on_validate_sync.borrow().clone();
        if let Some(validate) = validate {
            let mut status = validate(&snapshot.values());
            status.forced = force;
            snapshot.set_on_validate_sync_status(status);
        }

        snapshot.mark_sync_complete();
    }

    /// Fan out per-entry async validation, await all of it, then run the
    /// whole-form async callback
    pub(crate) fn validate_async_phase(
        &self,
        snapshot: ValidationSnapshot,
        force: bool,
    ) -> LocalBoxFuture<'static, ()> {
        let form = self.clone();
        async move {
            let entries = form.all_entries();
            let mut names: Vec<String> = Vec::new();
            let mut pending: Vec<LocalBoxFuture<'static, Option<ValidationStatus>>> = Vec::new();

            for entry in &entries {
                match entry {
                    Entry::Parameter(param) => {
                        let already_failed = snapshot
                            .entry_status(param.name())
                            .is_some_and(|status| status.level.is_error());
                        if already_failed {
                            // Skip async validation when sync validation
                            // already failed for this parameter
                            continue;
                        }
                        names.push(param.name().to_string());
                        pending.push(
                            param
                                .validate_async()
                                .map(move |mut status| {
                                    status.forced = force;
                                    Some(status)
                                })
                                .boxed_local(),
                        );
                    }
                    Entry::SubForm(sub) => {
                        names.push(sub.name().to_string());
                        pending.push(sub.validate_child_async(force));
                    }
                    Entry::Item(_) | Entry::Section(_) => {}
                }
            }

            let results = futures_util::future::join_all(pending).await;

            if form.check_and_cancel(&snapshot, force) {
                return;
            }

            for (name, result) in names.iter().zip(results) {
                let sync_error = snapshot
                    .entry_status(name)
                    .is_some_and(|status| status.level.is_error());
                if sync_error {
                    continue;
                }
                if let Some(status) = result {
                    snapshot.set_entry_status(name, status);
                }
            }

            let validate = form.inner.on_validate_async.borrow().clone();
            if let Some(validate) = validate {
                let mut status = validate(snapshot.values()).await;
                status.forced = force;
                snapshot.set_on_validate_async_status(status);
            }

            snapshot.mark_async_complete();
        }
        .boxed_local()
    }

    /// Cancel the snapshot if it has been superseded by a newer generation.
    /// Forced validations are immune. Returns true when canceled.
    pub(crate) fn check_and_cancel(&self, snapshot: &ValidationSnapshot, force: bool) -> bool {
        let current = self.validation_snapshot();
        if !force && !ValidationSnapshot::same_snapshot(snapshot, &current) {
            snapshot.cancel(&self.inner.context);
            true
        } else {
            false
        }
    }

    /// Resolve a finished snapshot: compute the overall status, reinstate it
    /// as the form's current snapshot, wake waiters and fire the validate
    /// event.
    ///
    /// The write-back matters for forced runs: a later non-forced run may
    /// have replaced the current snapshot in the meantime, and reinstating
    /// the forced result makes that later run observe supersession and
    /// cancel, keeping the forced result authoritative.
    pub(crate) fn finalize_snapshot(&self, snapshot: &ValidationSnapshot) {
        snapshot.resolve_completion();
        snapshot.update_overall_status(&self.inner.context);
        *self.inner.snapshot.borrow_mut() = snapshot.clone();
        self.emit_validate(snapshot);
    }

    /// Wait for any in-flight validation to settle and return the resulting
    /// overall status. Returns `None` when no validation has ever run.
    pub async fn wait_for_validation(&self) -> Option<ValidationStatus> {
        // Yield first so competing validate() calls get a chance to start
        tokio::task::yield_now().await;

        loop {
            let last_seen = self.validation_snapshot();
            last_seen.wait_complete().await;

            // If a newer generation replaced the one we waited on, wait
            // again on the new one
            if ValidationSnapshot::same_snapshot(&last_seen, &self.validation_snapshot()) {
                break;
            }
        }
        self.validation_status()
    }

    /// Externally set the form's validation status. The next validation run
    /// clears it.
    pub fn force_validation_status(&self, status: ValidationStatus) {
        let snapshot = self.start_snapshot();
        snapshot.finish_forced(status);
        self.emit_validate(&snapshot);
    }
}

impl std::fmt::Debug for Form {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Form")
            .field("title", &self.title())
            .field("entries", &self.all_entries_count())
            .field("generation", &self.inner.generation.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::status::ValidationLevel;
    use serde_json::json;
    use std::collections::HashMap;

    fn empty_form() -> Form {
        Form::new(FormInit::default())
    }

    fn required_text_param(form: &Form, name: &str, label: &str) -> Parameter {
        form.param(
            name,
            ParameterKind::Text,
            ParameterInit {
                label: Some(label.to_string()),
                required: true,
                ..Default::default()
            },
        )
    }

    mod registration {
        use super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_entry_lookup_by_kind() {
            let form = empty_form();
            form.param("message", ParameterKind::Text, ParameterInit::default());
            form.section("details", SectionInit::default());

            assert!(form.get_param("message").is_ok());
            assert!(form.get_section("details").is_ok());
            assert!(matches!(
                form.get_param("details"),
                Err(FormError::NotAParameter(_))
            ));
            assert!(matches!(
                form.get_param("missing"),
                Err(FormError::NoSuchEntry(_))
            ));
        }

        #[test]
        #[should_panic(expected = "an entry named \"message\" already exists in the form")]
        fn test_duplicate_names_are_rejected() {
            let form = empty_form();
            form.param("message", ParameterKind::Text, ParameterInit::default());
            form.param("message", ParameterKind::Text, ParameterInit::default());
        }

        #[test]
        fn test_rejected_sub_form_registration_leaves_values_untouched() {
            let form = empty_form();
            form.param("address", ParameterKind::Text, ParameterInit::default());

            let count = Rc::new(std::cell::Cell::new(0));
            let counter = Rc::clone(&count);
            form.on_change(move |_, _| counter.set(counter.get() + 1));

            let child = Form::new(FormInit {
                values: FormValues::from_object(json!({ "street": "123 Main St" }))
                    .expect("object"),
                ..Default::default()
            });
            let rejected = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                form.sub_form("address", child, SubFormInit::default());
            }));

            // The duplicate name panics without seeding the record or
            // notifying subscribers
            assert!(rejected.is_err());
            assert_eq!(count.get(), 0);
            assert_eq!(form.values().field("address"), json!(null));
        }

        #[test]
        fn test_initial_parameter_value_lands_in_the_form() {
            let form = empty_form();
            form.param(
                "message",
                ParameterKind::Text,
                ParameterInit {
                    value: Some(json!("Hello world!")),
                    ..Default::default()
                },
            );
            assert_eq!(form.values().field("message"), json!("Hello world!"));
        }

        #[test]
        fn test_entry_counts_distinguish_direct_children() {
            let form = empty_form();
            form.param("top", ParameterKind::Text, ParameterInit::default());
            let section = form.section("group", SectionInit::default());
            section.param("nested", ParameterKind::Text, ParameterInit::default());

            assert_eq!(form.child_entries_count(), 2);
            assert_eq!(form.all_entries_count(), 3);
        }
    }

    mod values_and_events {
        use super::*;
        use pretty_assertions::assert_eq;
        use std::cell::RefCell;

        #[test]
        fn test_update_value_fires_change_event() {
            let form = empty_form();
            let seen: Rc<RefCell<Vec<(FormValues, FormValues)>>> = Rc::default();
            let sink = Rc::clone(&seen);
            form.on_change(move |new_values, old_values| {
                sink.borrow_mut()
                    .push((new_values.clone(), old_values.clone()));
            });

            form.update_value("message", json!("hi"));

            let events = seen.borrow();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].0.field("message"), json!("hi"));
            assert_eq!(events[0].1.field("message"), json!(null));
        }

        #[test]
        fn test_update_value_with_equal_value_is_a_no_op() {
            let form = empty_form();
            form.update_value("message", json!("hi"));

            let count = Rc::new(std::cell::Cell::new(0));
            let counter = Rc::clone(&count);
            form.on_change(move |_, _| counter.set(counter.get() + 1));

            form.update_value("message", json!("hi"));
            assert_eq!(count.get(), 0);
        }

        #[test]
        fn test_off_change_removes_the_handler() {
            let form = empty_form();
            let count = Rc::new(std::cell::Cell::new(0));
            let counter = Rc::clone(&count);
            let subscription = form.on_change(move |_, _| counter.set(counter.get() + 1));

            form.update_value("a", json!(1));
            form.off_change(subscription);
            form.update_value("a", json!(2));

            assert_eq!(count.get(), 1);
        }

        #[test]
        fn test_handlers_may_reenter_the_form() {
            let form = empty_form();
            let count = Rc::new(std::cell::Cell::new(0));

            let counter = Rc::clone(&count);
            let reentrant = form.clone();
            form.on_change(move |new_values, _| {
                counter.set(counter.get() + 1);
                // Derive two follow-up fields; each nested update fires its
                // own change event synchronously, nesting the dispatch
                if new_values.field("copy1").is_null() {
                    reentrant.update_value("copy1", json!(1));
                } else if new_values.field("copy2").is_null() {
                    reentrant.update_value("copy2", json!(2));
                }
            });

            form.update_value("message", json!("hi"));

            // One outer event plus one per nested update
            assert_eq!(count.get(), 3);
            assert_eq!(form.values().field("copy1"), json!(1));
            assert_eq!(form.values().field("copy2"), json!(2));
        }

        #[test]
        fn test_reset_restores_initial_values() {
            let form = Form::new(FormInit {
                values: FormValues::from_object(json!({ "message": "original" }))
                    .expect("object"),
                ..Default::default()
            });

            form.update_value("message", json!("changed"));
            form.update_value("extra", json!(42));
            form.reset();

            assert_eq!(form.values().field("message"), json!("original"));
            assert_eq!(form.values().field("extra"), json!(null));
        }
    }

    mod dynamic_properties {
        use super::*;
        use crate::form::entry::DynamicProperties;
        use pretty_assertions::assert_eq;

        #[test]
        fn test_evaluate_recomputes_and_reports_changes() {
            let form = empty_form();
            let param = form.param(
                "details",
                ParameterKind::Text,
                ParameterInit {
                    dynamic: DynamicProperties {
                        hidden: Some(Rc::new(|values| {
                            values.field("showDetails") != json!(true)
                        })),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            );

            assert!(!param.hidden());
            assert!(form.evaluate());
            assert!(param.hidden());

            // A second evaluation with unchanged values reports no change
            assert!(!form.evaluate());

            form.update_value("showDetails", json!(true));
            assert!(form.evaluate());
            assert!(!param.hidden());
        }

        #[test]
        fn test_value_changes_alone_do_not_recompute() {
            let form = empty_form();
            let param = form.param(
                "details",
                ParameterKind::Text,
                ParameterInit {
                    dynamic: DynamicProperties {
                        hidden: Some(Rc::new(|values| {
                            values.field("showDetails") != json!(true)
                        })),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            );

            form.update_value("showDetails", json!(false));
            // Recomputation is deferred until evaluate() is called
            assert!(!param.hidden());
            form.evaluate();
            assert!(param.hidden());
        }
    }

    mod validation {
        use super::*;
        use pretty_assertions::assert_eq;
        use std::cell::RefCell;

        #[tokio::test]
        async fn test_single_required_parameter() {
            let form = empty_form();
            required_text_param(&form, "subject", "subject");

            let snapshot = form.validate().await;
            let overall = snapshot.overall_status().expect("overall status");
            assert_eq!(overall.level, ValidationLevel::Error);
            assert_eq!(overall.message.as_deref(), Some("Subject is required"));

            form.update_value("subject", json!("Saved searches"));
            let snapshot = form.validate().await;
            let overall = snapshot.overall_status().expect("overall status");
            assert_eq!(overall.level, ValidationLevel::Ok);
        }

        #[tokio::test]
        async fn test_repeated_validation_with_unchanged_values_is_stable() {
            let form = empty_form();
            required_text_param(&form, "subject", "subject");

            let first = form.validate().await;
            let second = form.validate().await;

            let first = first.overall_status().expect("overall status");
            let second = second.overall_status().expect("overall status");
            assert_eq!(first.level, second.level);
            assert_eq!(first.message, second.message);
        }

        #[tokio::test]
        async fn test_multiple_errors_collapse_into_count() {
            let form = empty_form();
            required_text_param(&form, "subject", "subject");
            required_text_param(&form, "body", "body");

            let snapshot = form.validate().await;
            let overall = snapshot.overall_status().expect("overall status");
            assert_eq!(overall.message.as_deref(), Some("2 errors found"));
        }

        #[tokio::test]
        async fn test_validate_event_fires_after_sync_phase() {
            let form = empty_form();
            required_text_param(&form, "subject", "subject");

            let phases: Rc<RefCell<Vec<(bool, bool)>>> = Rc::default();
            let sink = Rc::clone(&phases);
            form.on_validate(move |snapshot| {
                sink.borrow_mut().push((
                    snapshot.sync_validation_complete(),
                    snapshot.async_validation_complete(),
                ));
            });

            form.validate().await;

            // One event after the sync phase, one on completion
            assert_eq!(*phases.borrow(), vec![(true, false), (true, true)]);
        }

        #[tokio::test]
        async fn test_whole_form_callbacks_shape_the_overall_status() {
            let form = Form::new(FormInit {
                on_validate_sync: Some(Rc::new(|values| {
                    if values.field("even").as_i64().is_some_and(|n| n % 2 != 0) {
                        ValidationStatus::warn("odd value")
                    } else {
                        ValidationStatus::ok()
                    }
                })),
                ..Default::default()
            });
            form.param("even", ParameterKind::Number, ParameterInit::default());

            form.update_value("even", json!(3));
            let snapshot = form.validate().await;
            let overall = snapshot.overall_status().expect("overall status");
            assert_eq!(overall.level, ValidationLevel::Warn);
            assert_eq!(overall.message.as_deref(), Some("odd value"));

            form.update_value("even", json!(4));
            let snapshot = form.validate().await;
            assert_eq!(
                snapshot.overall_status().map(|s| s.level),
                Some(ValidationLevel::Ok)
            );
        }

        #[tokio::test]
        async fn test_sync_error_skips_async_validation_for_that_parameter() {
            let async_runs = Rc::new(std::cell::Cell::new(0));
            let form = empty_form();
            let counter = Rc::clone(&async_runs);
            form.param(
                "subject",
                ParameterKind::Text,
                ParameterInit {
                    required: true,
                    on_validate_async: Some(Rc::new(move |_request| {
                        counter.set(counter.get() + 1);
                        futures_util::future::ready(ValidationStatus::ok()).boxed_local()
                    })),
                    ..Default::default()
                },
            );

            form.validate().await;
            assert_eq!(async_runs.get(), 0);

            form.update_value("subject", json!("hi"));
            form.validate().await;
            assert_eq!(async_runs.get(), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_newer_validation_cancels_the_older_one() {
            let form = empty_form();
            form.param("message", ParameterKind::Text, ParameterInit::default());

            let first = form.validate();
            let second = form.validate();

            let first = first.await;
            let overall = first.overall_status().expect("overall status");
            assert_eq!(overall.level, ValidationLevel::Canceled);
            assert_eq!(overall.message.as_deref(), Some("Validation canceled"));

            let second = second.await;
            assert_eq!(
                second.overall_status().map(|s| s.level),
                Some(ValidationLevel::Ok)
            );
            assert!(ValidationSnapshot::same_snapshot(
                &second,
                &form.validation_snapshot()
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn test_forced_validation_is_immune_to_cancellation() {
            let form = empty_form();
            required_text_param(&form, "subject", "subject");

            let plain = form.validate();
            let forced = form.validate_forced();

            let plain = plain.await;
            assert_eq!(
                plain.overall_status().map(|s| s.level),
                Some(ValidationLevel::Canceled)
            );

            let forced = forced.await;
            let overall = forced.overall_status().expect("overall status");
            assert_eq!(overall.level, ValidationLevel::Error);
            assert!(overall.forced);
            // The forced flag propagates onto per-entry statuses too
            assert!(forced.entry_status("subject").expect("entry status").forced);
        }

        #[tokio::test(start_paused = true)]
        async fn test_forced_run_completes_even_when_followed_by_another() {
            let form = empty_form();
            form.param("message", ParameterKind::Text, ParameterInit::default());

            let forced = form.validate_forced();
            let later = form.validate();

            let forced = forced.await;
            assert_eq!(
                forced.overall_status().map(|s| s.level),
                Some(ValidationLevel::Ok)
            );
            later.await;
        }

        #[tokio::test(start_paused = true)]
        async fn test_forced_result_stays_authoritative_over_a_later_run() {
            let form = empty_form();
            required_text_param(&form, "subject", "subject");

            let forced = form.validate_forced();
            let later = form.validate();
            let (forced, later) = futures_util::future::join(forced, later).await;

            // The non-forced run started later but must not overwrite the
            // forced result; it observes supersession and cancels
            assert_eq!(
                later.overall_status().map(|s| s.level),
                Some(ValidationLevel::Canceled)
            );
            let current = form.validation_status().expect("overall status");
            assert_eq!(current.level, ValidationLevel::Error);
            assert!(current.forced);
            assert!(ValidationSnapshot::same_snapshot(
                &forced,
                &form.validation_snapshot()
            ));
        }

        #[tokio::test(start_paused = true)]
        async fn test_in_flight_validation_throttles_the_next_one() {
            let form = empty_form();
            form.param("message", ParameterKind::Text, ParameterInit::default());

            // A lone validation proceeds without any pacing delay
            let start = tokio::time::Instant::now();
            form.validate().await;
            assert_eq!(start.elapsed(), Duration::ZERO);

            let first = form.validate();
            let start = tokio::time::Instant::now();
            let second = form.validate();
            let (_first, _second) = futures_util::future::join(first, second).await;

            // The second run waits out the pacing delay because the first
            // was still in flight when it started
            assert!(start.elapsed() >= Duration::from_millis(300));
        }

        #[tokio::test(start_paused = true)]
        async fn test_wait_for_validation_tracks_the_latest_generation() {
            let form = empty_form();
            required_text_param(&form, "subject", "subject");

            let first = form.validate();
            let second = form.validate();

            // Drive both validations while waiting; the waiter must follow
            // the superseding generation rather than the canceled one
            let (first, _second, status) =
                futures_util::future::join3(first, second, form.wait_for_validation()).await;

            assert_eq!(
                first.overall_status().map(|s| s.level),
                Some(ValidationLevel::Canceled)
            );
            assert_eq!(status.map(|s| s.level), Some(ValidationLevel::Error));
        }

        #[tokio::test]
        async fn test_wait_for_validation_without_any_validation() {
            let form = empty_form();
            required_text_param(&form, "subject", "subject");
            assert_eq!(form.wait_for_validation().await, None);
        }

        #[tokio::test]
        async fn test_force_validation_status_is_cleared_by_the_next_run() {
            let form = empty_form();
            form.param("message", ParameterKind::Text, ParameterInit::default());

            form.force_validation_status(ValidationStatus::error("Submission failed"));
            let overall = form.validation_status().expect("forced status");
            assert_eq!(overall.message.as_deref(), Some("Submission failed"));

            let snapshot = form.validate().await;
            assert_eq!(
                snapshot.overall_status().map(|s| s.level),
                Some(ValidationLevel::Ok)
            );
        }
    }

    mod national_parks {
        use super::*;
        use pretty_assertions::assert_eq;

        fn parks_by_state() -> HashMap<String, Vec<&'static str>> {
            [
                (
                    "CA".to_string(),
                    vec!["Joshua Tree", "Redwood", "Yosemite"],
                ),
                ("WA".to_string(), vec!["Mount Rainier", "Olympic"]),
            ]
            .into()
        }

        fn park_form() -> Form {
            let form = Form::new(FormInit::default());
            form.param(
                "state",
                ParameterKind::Text,
                ParameterInit {
                    label: Some("state".to_string()),
                    required: true,
                    ..Default::default()
                },
            );
            form.param(
                "parkName",
                ParameterKind::Text,
                ParameterInit {
                    label: Some("park name".to_string()),
                    required: true,
                    dependencies: [("state".to_string(), "state".to_string())].into(),
                    on_validate_async: Some(Rc::new(|request| {
                        async move {
                            let park = match request.value().as_str() {
                                Some(park) => park.to_string(),
                                None => return ValidationStatus::ok(),
                            };
                            let Some(state) = request.dependency_as_str("state") else {
                                return ValidationStatus::error(
                                    "Cannot validate park name: no state selected",
                                );
                            };
                            let known = parks_by_state()
                                .get(&state)
                                .is_some_and(|parks| parks.contains(&park.as_str()));
                            if known {
                                ValidationStatus::ok()
                            } else {
                                ValidationStatus::error(format!(
                                    "No park named {park} in state {state}"
                                ))
                            }
                        }
                        .boxed_local()
                    })),
                    ..Default::default()
                },
            );
            form
        }

        #[tokio::test]
        async fn test_empty_values_fail_both_required_checks() {
            let form = park_form();

            let snapshot = form.validate().await;
            let overall = snapshot.overall_status().expect("overall status");
            assert_eq!(overall.message.as_deref(), Some("2 errors found"));
            assert_eq!(
                snapshot.entry_status("state").map(|s| s.message),
                Some(Some("State is required".to_string()))
            );
            assert_eq!(
                snapshot.entry_status("parkName").map(|s| s.message),
                Some(Some("Park name is required".to_string()))
            );
        }

        #[tokio::test]
        async fn test_park_in_selected_state_passes() {
            let form = park_form();
            form.update_value("state", json!("CA"));
            form.update_value("parkName", json!("Yosemite"));

            let snapshot = form.validate().await;
            assert_eq!(
                snapshot.overall_status().map(|s| s.level),
                Some(ValidationLevel::Ok)
            );
        }

        #[tokio::test]
        async fn test_park_outside_selected_state_fails() {
            let form = park_form();
            form.update_value("state", json!("CA"));
            form.update_value("parkName", json!("Olympic"));

            let snapshot = form.validate().await;
            let overall = snapshot.overall_status().expect("overall status");
            assert_eq!(overall.level, ValidationLevel::Error);
            assert_eq!(
                overall.message.as_deref(),
                Some("No park named Olympic in state CA")
            );
        }

        #[tokio::test]
        async fn test_missing_state_dependency_fails_with_a_clear_message() {
            let form = park_form();
            form.update_value("parkName", json!("Yosemite"));

            let snapshot = form.validate().await;
            assert_eq!(
                snapshot.entry_status("state").map(|s| s.message),
                Some(Some("State is required".to_string()))
            );
            assert_eq!(
                snapshot.entry_status("parkName").map(|s| s.message),
                Some(Some(
                    "Cannot validate park name: no state selected".to_string()
                ))
            );
        }
    }
}

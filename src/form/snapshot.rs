//! Point-in-time validation state

use crate::context::FormContext;
use crate::form::status::{ValidationLevel, ValidationStatus};
use crate::form::values::FormValues;
use crate::util::Deferred;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// The record of one validation generation: the values under test, per-entry
/// results, whole-form callback results, and the reduced overall status.
///
/// A fresh snapshot is created by every `validate()` call and mutated in
/// place as the sync and async phases complete. Once the overall status is
/// set the snapshot is effectively immutable; the next `validate()` call
/// supersedes it wholesale. Handles are cheap to clone and share state.
#[derive(Clone)]
pub struct ValidationSnapshot {
    state: Rc<SnapshotState>,
}

struct SnapshotState {
    generation: u64,
    is_initial: bool,
    values: FormValues,
    entry_status: RefCell<HashMap<String, ValidationStatus>>,
    on_validate_sync_status: RefCell<Option<ValidationStatus>>,
    on_validate_async_status: RefCell<Option<ValidationStatus>>,
    overall_status: RefCell<Option<ValidationStatus>>,
    sync_validation_complete: Cell<bool>,
    async_validation_complete: Cell<bool>,
    completion: Deferred<()>,
}

impl ValidationSnapshot {
    pub(crate) fn new(generation: u64, values: FormValues) -> Self {
        Self::build(generation, values, false)
    }

    /// The placeholder snapshot a form starts with before any validation has
    /// run. Its completion signal is pre-resolved so waiters never block on
    /// a validation that was never started.
    pub(crate) fn initial(values: FormValues) -> Self {
        let snapshot = Self::build(0, values, true);
        snapshot.state.completion.resolve(());
        snapshot
    }

    fn build(generation: u64, values: FormValues, is_initial: bool) -> Self {
        Self {
            state: Rc::new(SnapshotState {
                generation,
                is_initial,
                values,
                entry_status: RefCell::new(HashMap::new()),
                on_validate_sync_status: RefCell::new(None),
                on_validate_async_status: RefCell::new(None),
                overall_status: RefCell::new(None),
                sync_validation_complete: Cell::new(false),
                async_validation_complete: Cell::new(false),
                completion: Deferred::new(),
            }),
        }
    }

    /// The generation this snapshot belongs to
    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn is_initial(&self) -> bool {
        self.state.is_initial
    }

    /// A copy of the value set this validation ran against
    pub fn values(&self) -> FormValues {
        self.state.values.clone()
    }

    pub fn entry_status(&self, name: &str) -> Option<ValidationStatus> {
        self.state.entry_status.borrow().get(name).cloned()
    }

    pub fn on_validate_sync_status(&self) -> Option<ValidationStatus> {
        self.state.on_validate_sync_status.borrow().clone()
    }

    pub fn on_validate_async_status(&self) -> Option<ValidationStatus> {
        self.state.on_validate_async_status.borrow().clone()
    }

    /// The reduced status across all validation sources. `None` until the
    /// async phase has completed (or the snapshot was canceled).
    pub fn overall_status(&self) -> Option<ValidationStatus> {
        self.state.overall_status.borrow().clone()
    }

    pub fn sync_validation_complete(&self) -> bool {
        self.state.sync_validation_complete.get()
    }

    pub fn async_validation_complete(&self) -> bool {
        self.state.async_validation_complete.get()
    }

    /// True once the snapshot has fully resolved or been canceled
    pub fn is_complete(&self) -> bool {
        self.state.completion.is_done()
    }

    /// Wait until this snapshot resolves or is canceled
    pub(crate) async fn wait_complete(&self) {
        self.state.completion.wait().await;
    }

    pub(crate) fn same_snapshot(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.state, &b.state)
    }

    pub(crate) fn set_entry_status(&self, name: &str, status: ValidationStatus) {
        self.state
            .entry_status
            .borrow_mut()
            .insert(name.to_string(), status);
    }

    pub(crate) fn set_on_validate_sync_status(&self, status: ValidationStatus) {
        *self.state.on_validate_sync_status.borrow_mut() = Some(status);
    }

    pub(crate) fn set_on_validate_async_status(&self, status: ValidationStatus) {
        *self.state.on_validate_async_status.borrow_mut() = Some(status);
    }

    pub(crate) fn mark_sync_complete(&self) {
        self.state.sync_validation_complete.set(true);
    }

    pub(crate) fn mark_async_complete(&self) {
        self.state.async_validation_complete.set(true);
    }

    /// Mark the snapshot as superseded by a newer generation
    pub(crate) fn cancel(&self, context: &FormContext) {
        *self.state.overall_status.borrow_mut() = Some(ValidationStatus::canceled(
            context.translate("form.validation-canceled", &[]),
        ));
        self.state.completion.resolve(());
    }

    /// Force a finished snapshot with an externally supplied status. Used by
    /// `Form::force_validation_status`.
    pub(crate) fn finish_forced(&self, status: ValidationStatus) {
        self.state.sync_validation_complete.set(true);
        self.state.async_validation_complete.set(true);
        *self.state.overall_status.borrow_mut() = Some(status);
        self.state.completion.resolve(());
    }

    pub(crate) fn resolve_completion(&self) {
        self.state.completion.resolve(());
    }

    /// Reduce all validation sources into one overall status.
    ///
    /// Precedence, least to most authoritative:
    /// 1. Aggregated per-entry statuses. Two or more errors collapse into an
    ///    "N errors found" message; exactly one error uses its own message.
    ///    Warnings aggregate the same way when there are no errors.
    /// 2. The whole-form async status replaces the aggregate when its
    ///    severity is greater or equal.
    /// 3. The whole-form sync status is applied last, with the same rule, so
    ///    it has final say on ties but a sync warn never hides an async
    ///    error.
    pub(crate) fn update_overall_status(&self, context: &FormContext) {
        let mut status = self.aggregate_entry_status(context);
        status = overlay(status, self.on_validate_async_status());
        status = overlay(status, self.on_validate_sync_status());
        *self.state.overall_status.borrow_mut() = Some(status);
    }

    fn aggregate_entry_status(&self, context: &FormContext) -> ValidationStatus {
        let entry_status = self.state.entry_status.borrow();

        let errors: Vec<&ValidationStatus> = entry_status
            .values()
            .filter(|s| s.level == ValidationLevel::Error)
            .collect();
        match errors.as_slice() {
            [] => {}
            [only] => return (*only).clone(),
            many => {
                return ValidationStatus::error(context.translate(
                    "form.errors-found",
                    &[("count", many.len().to_string())],
                ))
            }
        }

        let warnings: Vec<&ValidationStatus> = entry_status
            .values()
            .filter(|s| s.level == ValidationLevel::Warn)
            .collect();
        match warnings.as_slice() {
            [] => ValidationStatus::ok(),
            [only] => (*only).clone(),
            many => ValidationStatus::warn(context.translate(
                "form.warnings-found",
                &[("count", many.len().to_string())],
            )),
        }
    }
}

/// Replace `current` with `candidate` when the candidate's severity is
/// greater or equal. Later-considered sources win ties.
fn overlay(current: ValidationStatus, candidate: Option<ValidationStatus>) -> ValidationStatus {
    match candidate {
        Some(candidate) if candidate.level.severity() >= current.level.severity() => candidate,
        _ => current,
    }
}

impl std::fmt::Debug for ValidationSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationSnapshot")
            .field("generation", &self.state.generation)
            .field("is_initial", &self.state.is_initial)
            .field("sync_complete", &self.sync_validation_complete())
            .field("async_complete", &self.async_validation_complete())
            .field("overall_status", &self.overall_status())
            .finish()
    }
}

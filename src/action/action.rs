//! Form-backed action lifecycle

use crate::error::FormError;
use crate::form::{Form, FormValues, ValidationStatus};
use crate::util::Deferred;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// The outcome of one action execution
#[derive(Debug, Clone)]
pub struct ActionExecutionResult {
    pub success: bool,
    /// The execution error, when the `on_execute` hook failed. Shared so the
    /// result can be cloned to waiters.
    pub error: Option<Rc<anyhow::Error>>,
    /// The status to surface on the form for this execution
    pub validation_status: ValidationStatus,
}

impl ActionExecutionResult {
    fn failed(validation_status: ValidationStatus) -> Self {
        Self {
            success: false,
            error: None,
            validation_status,
        }
    }
}

/// The callbacks an action supplies: loading initial data, building the
/// form, and performing the work itself.
///
/// The whole-form validation hooks are optional; the defaults report ok.
#[async_trait(?Send)]
pub trait ActionHooks {
    /// A friendly name for the action, used in logging
    fn action_name(&self) -> &str;

    /// Load whatever data the action needs and produce the form's initial
    /// values
    async fn on_initialize(&self) -> anyhow::Result<FormValues>;

    /// Build the action's form from the loaded initial values
    fn build_form(&self, initial_values: FormValues) -> Form;

    /// Perform the action. Returning `Ok(None)` means plain success;
    /// returning a result lets the hook report partial failure with its own
    /// status.
    async fn on_execute(&self, values: FormValues) -> anyhow::Result<Option<ActionExecutionResult>>;

    fn on_validate_sync(&self, _values: &FormValues) -> ValidationStatus {
        ValidationStatus::ok()
    }

    async fn on_validate_async(&self, _values: FormValues) -> ValidationStatus {
        ValidationStatus::ok()
    }
}

struct ActionInner<H> {
    hooks: Rc<H>,
    form: RefCell<Option<Form>>,
    initialized: Cell<bool>,
    initializing: Cell<bool>,
    executing: Cell<bool>,
    initialization: Deferred<()>,
    // Replaced with a fresh instance after every execution so the action can
    // run again and again
    execution: RefCell<Deferred<ActionExecutionResult>>,
    last_execution_result: RefCell<Option<ActionExecutionResult>>,
}

/// Drives the lifecycle around a set of [`ActionHooks`]: initialization,
/// forced pre-execution validation, execution, and surfacing failures back
/// onto the form.
pub struct Action<H> {
    inner: Rc<ActionInner<H>>,
}

impl<H> Clone for Action<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: ActionHooks + 'static> Action<H> {
    pub fn new(hooks: H) -> Self {
        Self {
            inner: Rc::new(ActionInner {
                hooks: Rc::new(hooks),
                form: RefCell::new(None),
                initialized: Cell::new(false),
                initializing: Cell::new(false),
                executing: Cell::new(false),
                initialization: Deferred::new(),
                execution: RefCell::new(Deferred::new()),
                last_execution_result: RefCell::new(None),
            }),
        }
    }

    pub fn hooks(&self) -> &H {
        &self.inner.hooks
    }

    pub fn action_name(&self) -> &str {
        self.inner.hooks.action_name()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.get()
    }

    /// The action's form. Fails until `initialize()` has completed.
    pub fn form(&self) -> Result<Form, FormError> {
        self.inner
            .form
            .borrow()
            .clone()
            .ok_or(FormError::NotInitialized)
    }

    pub fn last_execution_result(&self) -> Option<ActionExecutionResult> {
        self.inner.last_execution_result.borrow().clone()
    }

    /// Run the `on_initialize` hook, build the form and wire the hooks'
    /// whole-form validation callbacks into it.
    ///
    /// Waiters are released whether or not initialization succeeded; the
    /// error is reported to the caller alone.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        self.inner.initializing.set(true);
        let loaded = self.inner.hooks.on_initialize().await;

        let result = match loaded {
            Ok(initial_values) => {
                let form = self.inner.hooks.build_form(initial_values);

                let hooks = Rc::clone(&self.inner.hooks);
                form.set_on_validate_sync(Some(Rc::new(move |values| {
                    hooks.on_validate_sync(values)
                })));
                let hooks = Rc::clone(&self.inner.hooks);
                form.set_on_validate_async(Some(Rc::new(move |values| {
                    let hooks = Rc::clone(&hooks);
                    async move { hooks.on_validate_async(values).await }.boxed_local()
                })));

                *self.inner.form.borrow_mut() = Some(form);
                self.inner.initialized.set(true);
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    action = %self.inner.hooks.action_name(),
                    error = %err,
                    "action failed to initialize"
                );
                Err(err)
            }
        };

        self.inner.initialization.resolve(());
        self.inner.initializing.set(false);
        result
    }

    /// Wait until any in-flight initialization has finished. Resolves
    /// immediately when none is in progress.
    pub async fn wait_for_initialization(&self) {
        if !self.inner.initializing.get() || self.inner.initialization.is_done() {
            return;
        }
        self.inner.initialization.wait().await;
    }

    /// Wait until any in-flight execution has finished and return its
    /// result. Resolves immediately with `None` when none is in progress.
    pub async fn wait_for_execution(&self) -> Option<ActionExecutionResult> {
        let execution = self.inner.execution.borrow().clone();
        if !self.inner.executing.get() || execution.is_done() {
            return execution.value();
        }
        Some(execution.wait().await)
    }

    /// Validate the form with a forced run, then perform the action when
    /// validation passes.
    ///
    /// Failures never propagate as errors; they are captured in the returned
    /// result, and an execution failure is additionally forced onto the form
    /// as its validation status.
    pub async fn execute(&self) -> ActionExecutionResult {
        self.inner.executing.set(true);
        let (result, executed) = self.run_execution().await;

        self.inner.executing.set(false);
        // Always resolve rather than drop waiters; errors are handled by the
        // caller of execute() itself
        self.inner.execution.borrow().resolve(result.clone());
        *self.inner.execution.borrow_mut() = Deferred::new();
        *self.inner.last_execution_result.borrow_mut() = Some(result.clone());

        if executed && !result.success {
            if let Ok(form) = self.form() {
                form.force_validation_status(result.validation_status.clone());
            }
        }

        result
    }

    async fn run_execution(&self) -> (ActionExecutionResult, bool) {
        let form = match self.form() {
            Ok(form) => form,
            Err(err) => {
                let mut result =
                    ActionExecutionResult::failed(ValidationStatus::error("Failed to execute action"));
                result.error = Some(Rc::new(err.into()));
                return (result, false);
            }
        };

        // Keep the values as of validation start in case they change while
        // the hook runs
        let form_values = form.values();

        // A forced run completes even if validate() is called concurrently
        let snapshot = form.validate_forced().await;
        let validation_status = match snapshot.overall_status() {
            Some(status) => status,
            None => ValidationStatus::error("Failed to compute overall validation status"),
        };

        if validation_status.level.is_error() {
            // Validation failed, never reach the execution hook
            return (ActionExecutionResult::failed(validation_status), false);
        }

        match self.inner.hooks.on_execute(form_values).await {
            Ok(Some(result)) => (result, true),
            Ok(None) => (
                ActionExecutionResult {
                    success: true,
                    error: None,
                    validation_status,
                },
                true,
            ),
            Err(err) => {
                tracing::warn!(
                    action = %self.inner.hooks.action_name(),
                    error = %err,
                    "action failed to execute"
                );
                let status = ValidationStatus::error(err.to_string());
                (
                    ActionExecutionResult {
                        success: false,
                        error: Some(Rc::new(err)),
                        validation_status: status,
                    },
                    true,
                )
            }
        }
    }
}

impl<H: ActionHooks> std::fmt::Debug for Action<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.inner.hooks.action_name())
            .field("initialized", &self.inner.initialized.get())
            .field("executing", &self.inner.executing.get())
            .finish()
    }
}

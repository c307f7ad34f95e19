//! Injected environment for forms and actions
//!
//! The engine never reaches into a global registry for localization or time.
//! Callers inject a [`FormContext`] (or accept the defaults) when building a
//! form, which keeps the engine testable and host-agnostic.

use chrono::{DateTime, Utc};
use std::rc::Rc;

/// Localizes message keys into user-visible strings.
///
/// Tokens are `(name, value)` pairs substituted into the translated template
/// wherever `{name}` appears.
pub trait Translate {
    fn translate(&self, key: &str, tokens: &[(&str, String)]) -> String;
}

/// Source of the current time
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Built-in English strings for the engine's own messages.
///
/// Hosts with a real localization layer supply their own [`Translate`]
/// implementation mapping the same keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishStrings;

impl Translate for EnglishStrings {
    fn translate(&self, key: &str, tokens: &[(&str, String)]) -> String {
        let template = match key {
            "form.entry-required" => "{label} is required",
            "form.errors-found" => "{count} errors found",
            "form.warnings-found" => "{count} warnings found",
            "form.validation-canceled" => "Validation canceled",
            "form.expected-text" => "Value must be a string",
            "form.expected-number" => "Value must be a number",
            "form.expected-flag" => "Value must be a boolean",
            "form.expected-text-list" => "Value must be a list of strings",
            // Unknown keys fall back to the key itself so a missing string
            // never hides the underlying condition
            _ => key,
        };
        interpolate(template, tokens)
    }
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

fn interpolate(template: &str, tokens: &[(&str, String)]) -> String {
    let mut result = template.to_string();
    for (name, value) in tokens {
        result = result.replace(&format!("{{{name}}}"), value);
    }
    result
}

/// The injected environment shared by a form and its entries
#[derive(Clone)]
pub struct FormContext {
    translator: Rc<dyn Translate>,
    clock: Rc<dyn Clock>,
}

impl FormContext {
    pub fn new(translator: Rc<dyn Translate>, clock: Rc<dyn Clock>) -> Self {
        Self { translator, clock }
    }

    pub fn translate(&self, key: &str, tokens: &[(&str, String)]) -> String {
        self.translator.translate(key, tokens)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for FormContext {
    fn default() -> Self {
        Self::new(Rc::new(EnglishStrings), Rc::new(SystemClock))
    }
}

impl std::fmt::Debug for FormContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormContext").finish_non_exhaustive()
    }
}

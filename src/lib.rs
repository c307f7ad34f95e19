//! Reactive form and validation engine.
//!
//! Forms are trees of typed entries bound to a JSON value record. Changing a
//! value fires change events; validating runs a synchronous phase followed
//! by an asynchronous fan-out, with each run superseding (and canceling) the
//! previous one. Actions wrap a form with an initialize/validate/execute
//! lifecycle.
//!
//! The engine is single-threaded and built for current-thread async
//! runtimes; handles are `Rc`-based and not `Send`.
//!
//! ```no_run
//! use formwork::form::{Form, FormInit, ParameterInit, ParameterKind};
//!
//! # async fn demo() {
//! let form = Form::new(FormInit::default());
//! form.param(
//!     "email",
//!     ParameterKind::Text,
//!     ParameterInit {
//!         required: true,
//!         ..Default::default()
//!     },
//! );
//!
//! let snapshot = form.validate().await;
//! assert!(snapshot.overall_status().is_some());
//! # }
//! ```

pub mod action;
pub mod context;
pub mod error;
pub mod form;
pub mod util;

pub use context::{Clock, FormContext, Translate};
pub use error::FormError;

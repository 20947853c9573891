//! Call instrumentation with redaction-aware logging.
//!
//! This crate wraps callables so that they log when they start, when they
//! return, or when they fail, without ever putting sensitive argument values
//! into log text:
//! - **Redaction**: [`Redacted<T>`] behaves like the value it wraps
//!   everywhere except when rendered for a log message
//! - **Deny-lists**: parameters named in a [`DenyList`] are masked by name
//! - **Failure deduplication**: a [`Failure`] carries a reported marker, so
//!   nested on-error layers log it once
//! - **Filtered traces**: captured traces hide frames of the instrumentation
//!   machinery unless asked for them
//!
//! # Core Types
//!
//! - [`Instrument`]: builder created by [`log_on_start`], [`log_on_end`] and
//!   [`log_on_error`]
//! - [`Instrumented`] / [`InstrumentedAsync`]: the wrapped callables
//! - [`Redacted<T>`]: transparent wrapper that renders as a mask
//! - [`LogSink`]: where messages go; [`TracingSink`] by default
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use devlog::{callable, kw, log_on_error, redact, MemorySink};
//! use tracing::Level;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("invalid credentials")]
//! struct LoginError;
//!
//! let sink = Arc::new(MemorySink::new("auth"));
//! let login = log_on_error()
//!     .sink(sink.clone())
//!     .reraise(false)
//!     .message("login({args}, {kwargs}) failed")
//!     .wrap(callable!("login"), |(_user, password): (&str, String)| {
//!         assert_eq!(password, "hunter2");
//!         Err::<(), _>(LoginError)
//!     })
//!     .unwrap();
//!
//! let outcome = login.call(("alice", kw("password", redact("hunter2".to_string()))));
//! assert!(outcome.unwrap().is_suppressed());
//! assert_eq!(
//!     sink.messages(Level::ERROR),
//!     vec!["login((\"alice\",), {\"password\": ***}) failed"]
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod arg;
mod crash;
mod error;
mod failure;
mod format;
mod frames;
mod instrument;
mod pipeline;
mod redacted;
mod signature;
mod sink;

pub use arg::{kw, render_for_log, ArgRef, CallArgs, Kw, LogArg, LogValue};
pub use crash::{install_crash_hook, DEFAULT_CRASH_LOG};
pub use error::{BindError, ConfigError, InstrumentError};
pub use failure::{Cancelled, Completion, Failure};
pub use format::{
    default_redact_params, format_arguments, format_bound, format_value, needs_redaction,
    set_default_redact_params, DenyList, FormattedArgs, MessageFields, Template, MASK,
};
pub use frames::{capture_trace, CapturedFrame, CapturedTrace, FrameRegistry};
pub use instrument::{
    log_on_end, log_on_error, log_on_start, Instrument, Instrumented, InstrumentedAsync, OnEnd,
    OnError, OnStart, Variant,
};
pub use pipeline::CallableInfo;
pub use redacted::{redact, redact_with, Redacted, DEFAULT_MASK};
pub use signature::{BoundArguments, BoundValue, Param, Signature};
pub use sink::{FanoutSink, LogSink, MemorySink, TracingSink};

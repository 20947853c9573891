//! Instrumentation builders and wrapped callables.
//!
//! Three variants share one builder, [`Instrument`]:
//!
//! - [`log_on_start`] logs before the target runs,
//! - [`log_on_end`] logs after it returns `Ok`, including the result,
//! - [`log_on_error`] logs a failure once across nested layers, then
//!   re-raises or suppresses it.
//!
//! ```
//! use std::sync::Arc;
//!
//! use devlog::{callable, log_on_start, Failure, MemorySink};
//! use tracing::Level;
//!
//! let sink = Arc::new(MemorySink::new("demo"));
//! let add = log_on_start()
//!     .sink(sink.clone())
//!     .wrap(callable!("add"), |(a, b): (i32, i32)| Ok::<_, Failure>(a + b))
//!     .unwrap();
//!
//! assert_eq!(add.call((1, 2)).unwrap(), 3);
//! assert_eq!(
//!     sink.messages(Level::INFO),
//!     vec!["Start func add with args (1, 2), kwargs {}"]
//! );
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::Level;

use crate::error::ConfigError;
use crate::failure::Failure;
use crate::format::{default_redact_params, DenyList, Template};
use crate::frames::FrameRegistry;
use crate::pipeline::{CallableInfo, Settings};
use crate::signature::Signature;
use crate::sink::LogSink;

pub(crate) mod end;
pub(crate) mod error;
pub(crate) mod start;

pub(crate) const SOURCE_FILE: &str = file!();

mod sealed {
    use tracing::Level;

    pub trait Sealed {
        const DEFAULT_LEVEL: Level;

        fn default_message(&self, callable_var: &str) -> String;

        /// Variant-specific template field, e.g. the result.
        fn extra_field(&self) -> Option<&str>;

        /// Adjusts shared options before they are frozen.
        fn adjust(&self, _trace_stack: &mut bool, _capture_locals: &mut bool) {}
    }
}

/// An instrumentation variant: [`OnStart`], [`OnEnd`] or [`OnError`].
pub trait Variant: sealed::Sealed {}

/// Logs when the call starts.
#[derive(Debug, Clone, Default)]
pub struct OnStart;

/// Logs when the call returns successfully.
#[derive(Debug, Clone)]
pub struct OnEnd {
    result_var: String,
}

/// Logs a failure once, then re-raises or suppresses it.
#[derive(Clone)]
pub struct OnError {
    kinds: Vec<fn(&Failure) -> bool>,
    reraise: bool,
    error_var: String,
}

impl OnError {
    pub(crate) fn matches(&self, failure: &Failure) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|kind| kind(failure))
    }

    pub(crate) fn reraise(&self) -> bool {
        self.reraise
    }

    pub(crate) fn error_var(&self) -> &str {
        &self.error_var
    }
}

impl fmt::Debug for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnError")
            .field("kinds", &self.kinds.len())
            .field("reraise", &self.reraise)
            .field("error_var", &self.error_var)
            .finish()
    }
}

impl OnEnd {
    pub(crate) fn result_var(&self) -> &str {
        &self.result_var
    }
}

impl sealed::Sealed for OnStart {
    const DEFAULT_LEVEL: Level = Level::INFO;

    fn default_message(&self, callable_var: &str) -> String {
        format!(
            "Start func {{{}}} with args {{args}}, kwargs {{kwargs}}",
            callable_var
        )
    }

    fn extra_field(&self) -> Option<&str> {
        None
    }
}

impl sealed::Sealed for OnEnd {
    const DEFAULT_LEVEL: Level = Level::INFO;

    fn default_message(&self, callable_var: &str) -> String {
        format!(
            "Successfully run func {{{}}} with args {{args}}, kwargs {{kwargs}}",
            callable_var
        )
    }

    fn extra_field(&self) -> Option<&str> {
        Some(&self.result_var)
    }
}

impl sealed::Sealed for OnError {
    const DEFAULT_LEVEL: Level = Level::ERROR;

    fn default_message(&self, callable_var: &str) -> String {
        format!(
            "Error in func {{{}}} with args {{args}}, kwargs {{kwargs}}\n{{{}}}.",
            callable_var, self.error_var
        )
    }

    fn extra_field(&self) -> Option<&str> {
        Some(&self.error_var)
    }

    // The failure trace is always logged; tracing the stack adds locals.
    fn adjust(&self, trace_stack: &mut bool, capture_locals: &mut bool) {
        *capture_locals |= *trace_stack;
    }
}

impl Variant for OnStart {}
impl Variant for OnEnd {}
impl Variant for OnError {}

/// Builder for an instrumented callable.
///
/// Start with [`log_on_start`], [`log_on_end`] or [`log_on_error`], chain the
/// options, then [`wrap`](Instrument::wrap) a synchronous target or
/// [`wrap_async`](Instrument::wrap_async) one that returns a future.
///
/// A target takes the argument tuple, with every [`Redacted`](crate::Redacted)
/// and [`Kw`](crate::Kw) wrapper removed, and returns a `Result`.
#[must_use = "an instrumentation does nothing until it wraps a target"]
#[derive(Clone)]
pub struct Instrument<V> {
    level: Option<Level>,
    message: Option<String>,
    sink: Option<Arc<dyn LogSink>>,
    handler: Option<Arc<dyn LogSink>>,
    signature: Option<Signature>,
    trace_stack: bool,
    capture_locals: bool,
    include_internal: bool,
    redact_params: Option<DenyList>,
    callable_var: String,
    registry: Option<Arc<FrameRegistry>>,
    variant: V,
}

impl<V> Instrument<V> {
    fn with_variant(variant: V) -> Self {
        Self {
            level: None,
            message: None,
            sink: None,
            handler: None,
            signature: None,
            trace_stack: false,
            capture_locals: false,
            include_internal: false,
            redact_params: None,
            callable_var: "callable".to_string(),
            registry: None,
            variant,
        }
    }
}

/// Logs every call before the target runs.
pub fn log_on_start() -> Instrument<OnStart> {
    Instrument::with_variant(OnStart)
}

/// Logs every call that returns `Ok`, with its result.
pub fn log_on_end() -> Instrument<OnEnd> {
    Instrument::with_variant(OnEnd {
        result_var: "result".to_string(),
    })
}

/// Logs failing calls once, then re-raises the failure.
pub fn log_on_error() -> Instrument<OnError> {
    Instrument::with_variant(OnError {
        kinds: Vec::new(),
        reraise: true,
        error_var: "error".to_string(),
    })
}

impl<V: Variant> Instrument<V> {
    /// Severity of the main message.
    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Message template.
    ///
    /// Placeholders: the callable (`{callable}`, `{callable.name}`,
    /// `{callable.module}`), `{args}`, `{kwargs}`, every parameter of the
    /// [`bind_params`](Self::bind_params) signature, and the variant's
    /// result or error field.
    pub fn message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    /// Sends messages to `sink` instead of the callable's module logger.
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attaches an extra sink to the default module logger.
    ///
    /// Ignored, with a warning, when an explicit [`sink`](Self::sink) is set.
    pub fn handler(mut self, handler: Arc<dyn LogSink>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Binds each call's arguments to named parameters.
    pub fn bind_params(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Logs the instrumented call stack.
    pub fn trace_stack(mut self, enabled: bool) -> Self {
        self.trace_stack = enabled;
        self
    }

    /// Includes formatted arguments as frame locals. Implies
    /// [`trace_stack`](Self::trace_stack).
    pub fn capture_locals(mut self, enabled: bool) -> Self {
        self.capture_locals = enabled;
        self
    }

    /// Keeps frames of the instrumentation machinery in traces.
    pub fn include_internal(mut self, enabled: bool) -> Self {
        self.include_internal = enabled;
        self
    }

    /// Parameter names whose values are always masked.
    pub fn redact_params<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.redact_params = Some(names.into_iter().collect());
        self
    }

    /// Placeholder name for the callable; `callable` by default.
    pub fn callable_var(mut self, name: impl Into<String>) -> Self {
        self.callable_var = name.into();
        self
    }

    /// Registry of machinery files hidden from traces.
    pub fn registry(mut self, registry: Arc<FrameRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Wraps a synchronous target.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the message template is malformed or
    /// references an unknown field.
    pub fn wrap<F>(self, callable: CallableInfo, target: F) -> Result<Instrumented<V, F>, ConfigError> {
        let (settings, variant) = self.freeze(callable)?;
        Ok(Instrumented {
            settings,
            variant,
            target,
        })
    }

    /// Wraps a target that returns a future.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the message template is malformed or
    /// references an unknown field.
    pub fn wrap_async<F>(
        self,
        callable: CallableInfo,
        target: F,
    ) -> Result<InstrumentedAsync<V, F>, ConfigError> {
        let (settings, variant) = self.freeze(callable)?;
        Ok(InstrumentedAsync {
            settings,
            variant,
            target,
        })
    }

    fn freeze(self, callable: CallableInfo) -> Result<(Settings, V), ConfigError> {
        let mut handler = self.handler;
        if self.sink.is_some() && handler.is_some() {
            tracing::warn!(
                callable = callable.name(),
                "sink and handler are both set, the handler will be ignored"
            );
            handler = None;
        }

        let mut trace_stack = self.trace_stack || self.capture_locals;
        let mut capture_locals = self.capture_locals;
        self.variant.adjust(&mut trace_stack, &mut capture_locals);

        let source = match self.message {
            Some(message) => message,
            None => self.variant.default_message(&self.callable_var),
        };
        let template = Template::parse(source)?;

        let settings = Settings {
            callable,
            level: self.level.unwrap_or(V::DEFAULT_LEVEL),
            template,
            sink: self.sink,
            handler,
            resolved: OnceLock::new(),
            signature: self.signature,
            trace_stack,
            capture_locals,
            include_internal: self.include_internal,
            deny: self.redact_params.or_else(|| default_redact_params().cloned()),
            callable_var: self.callable_var,
            registry: self.registry.unwrap_or_else(FrameRegistry::builtin),
        };

        let extra = self.variant.extra_field();
        settings
            .template
            .check_fields(|name| settings.known_field(name) || extra == Some(name))?;

        Ok((settings, self.variant))
    }
}

impl Instrument<OnEnd> {
    /// Placeholder name for the result; `result` by default.
    pub fn result_var(mut self, name: impl Into<String>) -> Self {
        self.variant.result_var = name.into();
        self
    }
}

impl Instrument<OnError> {
    /// Logs only failures whose error is a `K`. May be called several times;
    /// without any call every failure is logged.
    pub fn on_error<K: StdError + 'static>(mut self) -> Self {
        self.variant.kinds.push(Failure::is::<K>);
        self
    }

    /// Logs only failures accepted by `filter`.
    pub fn on_error_if(mut self, filter: fn(&Failure) -> bool) -> Self {
        self.variant.kinds.push(filter);
        self
    }

    /// Whether the failure is returned to the caller after logging; `true`
    /// by default. When `false` the call returns
    /// [`Completion::Suppressed`](crate::Completion::Suppressed).
    pub fn reraise(mut self, reraise: bool) -> Self {
        self.variant.reraise = reraise;
        self
    }

    /// Placeholder name for the error; `error` by default.
    pub fn error_var(mut self, name: impl Into<String>) -> Self {
        self.variant.error_var = name.into();
        self
    }
}

impl<V: fmt::Debug> fmt::Debug for Instrument<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("level", &self.level)
            .field("message", &self.message)
            .field("signature", &self.signature)
            .field("trace_stack", &self.trace_stack)
            .field("capture_locals", &self.capture_locals)
            .field("include_internal", &self.include_internal)
            .field("redact_params", &self.redact_params)
            .field("callable_var", &self.callable_var)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

/// A synchronous callable wrapped with instrumentation.
///
/// Invoke it with `call`; the available `call` depends on the variant.
pub struct Instrumented<V, F> {
    pub(crate) settings: Settings,
    pub(crate) variant: V,
    pub(crate) target: F,
}

/// An asynchronous callable wrapped with instrumentation.
///
/// `call` returns a future; messages are emitted while it is polled.
pub struct InstrumentedAsync<V, F> {
    pub(crate) settings: Settings,
    pub(crate) variant: V,
    pub(crate) target: F,
}

macro_rules! wrapped_common {
    ($name:ident, $is_async:expr) => {
        impl<V, F> $name<V, F> {
            /// Returns `true` if `call` returns a future.
            pub fn is_async(&self) -> bool {
                $is_async
            }

            /// The wrapped target.
            pub fn target(&self) -> &F {
                &self.target
            }

            /// The instrumented callable.
            pub fn callable(&self) -> CallableInfo {
                self.settings.callable
            }

            /// Name of the sink messages go to.
            pub fn sink_name(&self) -> &str {
                self.settings.sink().name()
            }
        }

        impl<V: fmt::Debug, F> fmt::Debug for $name<V, F> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("settings", &self.settings)
                    .field("variant", &self.variant)
                    .finish_non_exhaustive()
            }
        }
    };
}

wrapped_common!(Instrumented, false);
wrapped_common!(InstrumentedAsync, true);

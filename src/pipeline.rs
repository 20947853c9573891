//! Per-invocation machinery shared by every instrumentation variant.

use std::fmt;
use std::panic::Location;
use std::sync::{Arc, OnceLock};

use tracing::Level;

use crate::arg::ArgRef;
use crate::error::{BindError, ConfigError};
use crate::format::{format_bound, format_named_arguments, DenyList, MessageFields, Template};
use crate::frames::{capture_trace, CapturedTrace, FrameEntry, FrameRegistry};
use crate::signature::Signature;
use crate::sink::{FanoutSink, LogSink, TracingSink};

/// Source files whose frames are hidden from traces by default.
pub(crate) const MACHINERY_FILES: &[&str] = &[
    file!(),
    crate::instrument::SOURCE_FILE,
    crate::instrument::start::SOURCE_FILE,
    crate::instrument::end::SOURCE_FILE,
    crate::instrument::error::SOURCE_FILE,
    crate::crash::SOURCE_FILE,
];

/// Name and defining module of an instrumented callable.
///
/// Build it with [`callable!`](crate::callable), which fills in the module of
/// the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallableInfo {
    name: &'static str,
    module: &'static str,
}

impl CallableInfo {
    /// Describes a callable.
    pub const fn new(name: &'static str, module: &'static str) -> Self {
        Self { name, module }
    }

    /// The callable's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Module path where the callable is defined.
    pub fn module(&self) -> &'static str {
        self.module
    }
}

impl fmt::Display for CallableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Describes a callable defined in the current module.
///
/// ```
/// fn login() {}
///
/// let info = devlog::callable!(login);
/// assert_eq!(info.name(), "login");
/// assert_eq!(info.module(), module_path!());
///
/// let named = devlog::callable!("handler");
/// assert_eq!(named.name(), "handler");
/// ```
#[macro_export]
macro_rules! callable {
    ($name:literal) => {
        $crate::CallableInfo::new($name, ::std::module_path!())
    };
    ($name:ident) => {
        $crate::CallableInfo::new(::std::stringify!($name), ::std::module_path!())
    };
}

/// Immutable configuration of one wrapped callable.
pub(crate) struct Settings {
    pub(crate) callable: CallableInfo,
    pub(crate) level: Level,
    pub(crate) template: Template,
    pub(crate) sink: Option<Arc<dyn LogSink>>,
    pub(crate) handler: Option<Arc<dyn LogSink>>,
    pub(crate) resolved: OnceLock<Arc<dyn LogSink>>,
    pub(crate) signature: Option<Signature>,
    pub(crate) trace_stack: bool,
    pub(crate) capture_locals: bool,
    pub(crate) include_internal: bool,
    pub(crate) deny: Option<DenyList>,
    pub(crate) callable_var: String,
    pub(crate) registry: Arc<FrameRegistry>,
}

/// State of one call, built before the target runs.
#[derive(Debug)]
pub(crate) struct Invocation {
    params: Vec<(String, String)>,
    pub(crate) frames: Arc<[FrameEntry]>,
}

impl Settings {
    /// Field names a template may reference, besides variant extras.
    pub(crate) fn known_field(&self, name: &str) -> bool {
        let var = self.callable_var.as_str();
        name == "args"
            || name == "kwargs"
            || name == var
            || name
                .strip_prefix(var)
                .is_some_and(|rest| rest == ".name" || rest == ".module")
            || self
                .signature
                .as_ref()
                .is_some_and(|signature| signature.names().any(|param| param == name))
    }

    /// The sink messages go to, resolved on first use.
    pub(crate) fn sink(&self) -> &Arc<dyn LogSink> {
        self.resolved.get_or_init(|| match (&self.sink, &self.handler) {
            (Some(sink), _) => Arc::clone(sink),
            (None, None) => Arc::new(TracingSink::new(self.callable.module)),
            (None, Some(handler)) => {
                let module = self.callable.module;
                Arc::new(
                    FanoutSink::new(module)
                        .with(Arc::new(TracingSink::new(module)))
                        .with(Arc::clone(handler)),
                )
            }
        })
    }

    pub(crate) fn emit(&self, level: Level, text: &str) {
        self.sink().emit(level, text);
    }

    /// Formats and binds the arguments, and prepares the frames of the call.
    pub(crate) fn begin(
        &self,
        args: &[ArgRef<'_>],
        call_site: &'static Location<'static>,
    ) -> Result<Invocation, BindError> {
        let deny = self.deny.as_ref();
        let positional_names: Vec<&str> = self
            .signature
            .as_ref()
            .map(|signature| signature.names().collect())
            .unwrap_or_default();
        let formatted = format_named_arguments(args, &positional_names, deny);

        let mut params = vec![
            ("args".to_string(), formatted.args_text()),
            ("kwargs".to_string(), formatted.kwargs_text()),
        ];
        let locals = match &self.signature {
            Some(signature) => {
                let bound = format_bound(&signature.bind(args)?, deny);
                params.extend(bound.iter().cloned());
                bound
            }
            None => params.clone(),
        };

        let frames: Arc<[FrameEntry]> = Arc::from(vec![FrameEntry {
            location: call_site,
            function: self.callable.name,
            locals: Some(Arc::from(locals)),
        }]);

        Ok(Invocation { params, frames })
    }

    /// Fills the template for one message.
    ///
    /// Field precedence, lowest first: callable fields, `extra`, `args` and
    /// `kwargs`, bound parameters.
    pub(crate) fn render(
        &self,
        invocation: &Invocation,
        extra: &[(&str, &str)],
    ) -> Result<String, ConfigError> {
        let var = self.callable_var.as_str();
        let mut fields = MessageFields::new();
        fields.insert(var, self.callable.name);
        fields.insert(format!("{}.name", var), self.callable.name);
        fields.insert(format!("{}.module", var), self.callable.module);
        for (name, value) in extra {
            fields.insert(*name, *value);
        }
        for (name, value) in &invocation.params {
            fields.insert(name.as_str(), value.as_str());
        }
        self.template.render(&fields)
    }

    pub(crate) fn trace(&self, with_locals: bool) -> CapturedTrace {
        capture_trace(&self.registry, self.include_internal, with_locals)
    }

    /// Emits the live stack as a separate DEBUG message, if enabled.
    pub(crate) fn emit_trace(&self) {
        if self.trace_stack {
            let trace = self.trace(self.capture_locals).to_string();
            self.emit(Level::DEBUG, trace.trim_end());
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("callable", &self.callable)
            .field("level", &self.level)
            .field("template", &self.template.as_str())
            .field("sink", &self.sink.as_ref().map(|sink| sink.name().to_string()))
            .field("signature", &self.signature)
            .field("trace_stack", &self.trace_stack)
            .field("capture_locals", &self.capture_locals)
            .field("include_internal", &self.include_internal)
            .field("deny", &self.deny)
            .finish_non_exhaustive()
    }
}

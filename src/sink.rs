use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::Level;

/// Destination of instrumentation messages.
///
/// Sinks are shared between every invocation of a wrapped callable and may
/// be called from several threads at once.
pub trait LogSink: Send + Sync {
    /// Emits one message at `level`.
    fn emit(&self, level: Level, text: &str);

    /// Name of the sink, e.g. the module path of the wrapped callable.
    fn name(&self) -> &str;
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn emit(&self, level: Level, text: &str) {
        (**self).emit(level, text)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Emits messages as `tracing` events.
///
/// Every event carries a `logger` field with the sink name. This is the sink
/// used when none is configured, named after the callable's module.
///
/// # Examples
///
/// ```
/// use devlog::{LogSink, TracingSink};
///
/// let sink = TracingSink::new("app::auth");
/// sink.emit(tracing::Level::INFO, "user logged in");
/// assert_eq!(sink.name(), "app::auth");
/// ```
#[derive(Debug, Clone)]
pub struct TracingSink {
    name: String,
}

impl TracingSink {
    /// Creates a sink with the given logger name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl LogSink for TracingSink {
    fn emit(&self, level: Level, text: &str) {
        match level {
            Level::ERROR => tracing::error!(logger = %self.name, "{}", text),
            Level::WARN => tracing::warn!(logger = %self.name, "{}", text),
            Level::INFO => tracing::info!(logger = %self.name, "{}", text),
            Level::DEBUG => tracing::debug!(logger = %self.name, "{}", text),
            _ => tracing::trace!(logger = %self.name, "{}", text),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An in-memory sink that records every message.
///
/// `MemorySink` is meant for tests and demos. Share it through an `Arc` and
/// inspect it after the calls.
///
/// # Examples
///
/// ```
/// use devlog::{LogSink, MemorySink};
/// use tracing::Level;
///
/// let sink = MemorySink::new("test");
/// sink.emit(Level::INFO, "hello");
/// sink.emit(Level::DEBUG, "trace");
///
/// assert_eq!(sink.messages(Level::INFO), vec!["hello"]);
/// assert_eq!(sink.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    name: String,
    records: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Level, String)>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Messages recorded at exactly `level`, oldest first.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(recorded, _)| *recorded == level)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Every record, oldest first.
    pub fn records(&self) -> Vec<(Level, String)> {
        self.lock().clone()
    }

    /// Provides borrowed access to the records via callback.
    pub fn with_records<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[(Level, String)]) -> R,
    {
        f(&self.lock())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets every record.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn emit(&self, level: Level, text: &str) {
        self.lock().push((level, text.to_string()));
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Forwards every message to several sinks, in order.
///
/// Used when a handler is attached to the default module sink.
#[derive(Clone)]
pub struct FanoutSink {
    name: String,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanoutSink {
    /// Creates a fan-out with no targets.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sinks: Vec::new(),
        }
    }

    /// Adds a target.
    pub fn with(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` if there are no targets.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|sink| sink.name()).collect();
        f.debug_struct("FanoutSink")
            .field("name", &self.name)
            .field("sinks", &names)
            .finish()
    }
}

impl LogSink for FanoutSink {
    fn emit(&self, level: Level, text: &str) {
        for sink in &self.sinks {
            sink.emit(level, text);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

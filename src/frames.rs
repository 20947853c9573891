//! Stack capture with machinery frames filtered out.
//!
//! A trace is the real call stack of the current thread, resolved with
//! `backtrace`, from the entry point down to the code that asked for it.
//! Frames in files of the instrumentation machinery are dropped unless
//! requested.
//!
//! Every instrumented invocation also keeps a record of its call site and
//! formatted arguments on a per-thread stack while it runs. Those arguments
//! become the locals of the matching caller frame, so redacted values stay
//! masked. Async invocations re-enter their records each time they are
//! polled, so tasks sharing a thread never see each other's arguments.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

/// Source files that belong to the instrumentation machinery.
///
/// Frames located in a registered file are hidden from captured traces
/// unless internal frames are explicitly requested. A relative path matches
/// any absolute path that ends with it.
///
/// # Examples
///
/// ```
/// use devlog::FrameRegistry;
///
/// let registry = FrameRegistry::builtin().as_ref().clone().with_file("src/retry.rs");
/// assert!(registry.is_internal("src/retry.rs"));
/// assert!(registry.is_internal("/srv/app/src/retry.rs"));
/// assert!(!registry.is_internal("src/main.rs"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameRegistry {
    files: HashSet<Cow<'static, str>>,
}

impl FrameRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of this crate's own machinery files, built once.
    pub fn builtin() -> Arc<FrameRegistry> {
        static BUILTIN: OnceLock<Arc<FrameRegistry>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| {
                let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
                let registry = std::iter::once(file!())
                    .chain(crate::pipeline::MACHINERY_FILES.iter().copied())
                    .fold(FrameRegistry::new(), |registry, file| {
                        registry.with_file(anchor(manifest, file).display().to_string())
                    });
                Arc::new(registry)
            })
            .clone()
    }

    /// Registers another machinery file, e.g. a helper that wraps calls.
    pub fn with_file(mut self, file: impl Into<Cow<'static, str>>) -> Self {
        self.files.insert(file.into());
        self
    }

    /// Returns `true` if `file` is registered.
    pub fn is_internal(&self, file: &str) -> bool {
        self.files.iter().any(|registered| same_source(file, registered))
    }

    /// Registered files, in no particular order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|file| file.as_ref())
    }
}

/// Makes a `file!()` path absolute against the package directory.
///
/// `file!()` is relative to the workspace root, which may be an ancestor of
/// the package directory, so the overlapping components are joined once.
fn anchor(manifest: &Path, file: &str) -> PathBuf {
    let file = Path::new(file);
    if file.is_absolute() {
        return file.to_path_buf();
    }
    let base: Vec<Component<'_>> = manifest.components().collect();
    let rel: Vec<Component<'_>> = file.components().collect();
    let overlap = (1..=base.len().min(rel.len()))
        .rev()
        .find(|&n| base[base.len() - n..] == rel[..n])
        .unwrap_or(0);
    rel[overlap..]
        .iter()
        .fold(manifest.to_path_buf(), |path, component| path.join(component))
}

/// Compares source paths, letting a relative path match as a suffix.
fn same_source(a: &str, b: &str) -> bool {
    let (a, b) = (Path::new(a), Path::new(b));
    match (a.is_absolute(), b.is_absolute()) {
        (true, false) => a.ends_with(b),
        (false, true) => b.ends_with(a),
        _ => a == b,
    }
}

/// Call site and formatted arguments of a running invocation.
#[derive(Debug, Clone)]
pub(crate) struct FrameEntry {
    pub(crate) location: &'static Location<'static>,
    pub(crate) function: &'static str,
    pub(crate) locals: Option<Arc<[(String, String)]>>,
}

thread_local! {
    static LIVE: RefCell<Vec<FrameEntry>> = const { RefCell::new(Vec::new()) };
    static DROP_DEPTH: Cell<usize> = const { Cell::new(0) };
    static CANCEL_CLAIMED: Cell<bool> = const { Cell::new(false) };
}

/// Pops the entries pushed by [`enter`] when dropped.
#[derive(Debug)]
pub(crate) struct FrameScope {
    depth: Option<usize>,
}

impl Drop for FrameScope {
    fn drop(&mut self) {
        if let Some(depth) = self.depth {
            let _ = LIVE.try_with(|live| live.borrow_mut().truncate(depth));
        }
    }
}

pub(crate) fn enter(frames: &[FrameEntry]) -> FrameScope {
    let depth = LIVE
        .try_with(|live| {
            let mut live = live.borrow_mut();
            let depth = live.len();
            live.extend_from_slice(frames);
            depth
        })
        .ok();
    FrameScope { depth }
}

/// Returns `true` while an instrumented invocation runs on this thread.
pub(crate) fn in_instrumented_call() -> bool {
    LIVE.try_with(|live| !live.borrow().is_empty())
        .unwrap_or(false)
}

/// Claims the report of the cancellation being dropped right now.
///
/// Dropping an outer instrumented future drops the futures nested in it in
/// one go. Only the first claim in that chain succeeds, so one cancellation
/// is reported once however many on-error layers it passes through.
pub(crate) fn claim_cancellation() -> bool {
    if DROP_DEPTH.try_with(Cell::get).unwrap_or(0) == 0 {
        return true;
    }
    CANCEL_CLAIMED
        .try_with(|claimed| !claimed.replace(true))
        .unwrap_or(true)
}

/// Marks one level of a `Framed` drop chain; the outermost resets the claim.
struct DropChain;

impl DropChain {
    fn enter() -> Self {
        let _ = DROP_DEPTH.try_with(|depth| depth.set(depth.get() + 1));
        DropChain
    }
}

impl Drop for DropChain {
    fn drop(&mut self) {
        let _ = DROP_DEPTH.try_with(|depth| {
            let remaining = depth.get().saturating_sub(1);
            depth.set(remaining);
            if remaining == 0 {
                let _ = CANCEL_CLAIMED.try_with(|claimed| claimed.set(false));
            }
        });
    }
}

/// A future that runs with its invocation's entries on the live stack.
///
/// The entries are also entered while the inner future is dropped, so work
/// done on cancellation sees them.
pub(crate) struct Framed<F> {
    frames: Arc<[FrameEntry]>,
    inner: Option<Pin<Box<F>>>,
}

impl<F: Future> Framed<F> {
    pub(crate) fn new(frames: Arc<[FrameEntry]>, inner: F) -> Self {
        Self {
            frames,
            inner: Some(Box::pin(inner)),
        }
    }
}

impl<F: Future> Future for Framed<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let this = self.get_mut();
        let _scope = enter(&this.frames);
        match this.inner.as_mut() {
            Some(inner) => inner.as_mut().poll(cx),
            None => Poll::Pending,
        }
    }
}

impl<F> Drop for Framed<F> {
    fn drop(&mut self) {
        let _chain = DropChain::enter();
        let _scope = enter(&self.frames);
        self.inner = None;
    }
}

/// A frame of a captured trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    file: String,
    line: u32,
    column: u32,
    function: String,
    source_line: Option<String>,
    locals: Option<Vec<(String, String)>>,
}

impl CapturedFrame {
    /// Source file of the frame.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Line number, starting at 1.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Column number, starting at 1, or 0 when unknown.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Function of the frame, without the symbol hash.
    ///
    /// A call site that is not on the resolved stack, such as the caller of
    /// a suspended async invocation, is labelled with the callee.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Trimmed text of the source line, if the file could be read.
    ///
    /// This is the code as written: a secret spelled out as a literal at
    /// the call site shows up here.
    pub fn source_line(&self) -> Option<&str> {
        self.source_line.as_deref()
    }

    /// Formatted locals, if they were captured.
    pub fn locals(&self) -> Option<&[(String, String)]> {
        self.locals.as_deref()
    }
}

impl fmt::Display for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  File \"{}\", line {}, in {}",
            self.file, self.line, self.function
        )?;
        if let Some(source) = &self.source_line {
            writeln!(f, "    {}", source)?;
        }
        for (name, value) in self.locals.iter().flatten() {
            writeln!(f, "    {} = {}", name, value)?;
        }
        Ok(())
    }
}

/// An oldest-first snapshot of the call stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedTrace {
    frames: Vec<CapturedFrame>,
}

impl CapturedTrace {
    /// The captured frames, oldest first.
    pub fn frames(&self) -> &[CapturedFrame] {
        &self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no frame was captured.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns `true` if any frame is located in `file`.
    pub fn contains_file(&self, file: &str) -> bool {
        self.frames.iter().any(|frame| same_source(&frame.file, file))
    }
}

impl fmt::Display for CapturedTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.frames.iter().try_for_each(|frame| write!(f, "{}", frame))
    }
}

/// Captures the call stack of the current thread, oldest frame first.
///
/// The stack runs from the entry point to the caller of this function.
/// Frames in files registered with `registry` are dropped unless
/// `include_internal` is set. With `with_locals`, the caller frame of each
/// running instrumented invocation carries that invocation's arguments,
/// formatted when it started, so redacted values appear as their mask.
///
/// Without debug symbols the stack cannot be resolved, and the trace falls
/// back to the call sites of the running instrumented invocations.
pub fn capture_trace(
    registry: &FrameRegistry,
    include_internal: bool,
    with_locals: bool,
) -> CapturedTrace {
    let live: Vec<FrameEntry> = LIVE
        .try_with(|live| live.borrow().clone())
        .unwrap_or_default();
    let mut trace = assemble(real_stack(), &live, registry, include_internal, with_locals);
    fill_source_lines(&mut trace.frames);
    trace
}

/// A resolved frame of the real stack.
#[derive(Debug, Clone)]
struct RawFrame {
    file: String,
    line: u32,
    column: u32,
    function: String,
}

/// Symbol that marks the start of the caller's part of the stack.
const CAPTURE_SYMBOL: &str = "devlog::frames::capture_trace";

/// Resolves the current stack, oldest first, without the capture frames.
fn real_stack() -> Vec<RawFrame> {
    let backtrace = backtrace::Backtrace::new();
    let symbols: Vec<(String, Option<RawFrame>)> = backtrace
        .frames()
        .iter()
        .flat_map(|frame| frame.symbols())
        .map(|symbol| {
            let function = symbol
                .name()
                .map(|name| format!("{:#}", name))
                .unwrap_or_default();
            let raw = match (symbol.filename(), symbol.lineno()) {
                (Some(file), Some(line)) => Some(RawFrame {
                    file: file.display().to_string(),
                    line,
                    column: symbol.colno().unwrap_or(0),
                    function: function.clone(),
                }),
                _ => None,
            };
            (function, raw)
        })
        .collect();

    // Most recent first: everything up to `capture_trace` is capture work.
    let Some(own) = symbols
        .iter()
        .position(|(function, _)| function.starts_with(CAPTURE_SYMBOL))
    else {
        return Vec::new();
    };
    let mut frames: Vec<RawFrame> = symbols
        .into_iter()
        .skip(own + 1)
        .filter_map(|(_, raw)| raw)
        .collect();
    frames.reverse();
    frames
}

/// Merges the resolved stack with the live invocation records and filters it.
fn assemble(
    real: Vec<RawFrame>,
    live: &[FrameEntry],
    registry: &FrameRegistry,
    include_internal: bool,
    with_locals: bool,
) -> CapturedTrace {
    let mut frames: Vec<CapturedFrame> = real
        .into_iter()
        .map(|raw| CapturedFrame {
            file: raw.file,
            line: raw.line,
            column: raw.column,
            function: raw.function,
            source_line: None,
            locals: None,
        })
        .collect();

    let mut floor = 0;
    for entry in live {
        let location = entry.location;
        let locals = entry.locals.as_deref().map(<[_]>::to_vec);
        let matched = (floor..frames.len())
            .filter(|&i| same_source(&frames[i].file, location.file()))
            .min_by_key(|&i| frames[i].line.abs_diff(location.line()));

        match matched {
            Some(i) => {
                if let Some(locals) = locals {
                    frames[i].locals.get_or_insert_with(Vec::new).extend(locals);
                }
                floor = i;
            }
            None => {
                // The call site sits just above the machinery running it.
                let at = (floor..frames.len())
                    .find(|&i| registry.is_internal(&frames[i].file))
                    .unwrap_or(frames.len());
                frames.insert(
                    at,
                    CapturedFrame {
                        file: location.file().to_string(),
                        line: location.line(),
                        column: location.column(),
                        function: entry.function.to_string(),
                        source_line: None,
                        locals,
                    },
                );
                floor = at;
            }
        }
    }

    frames.retain(|frame| include_internal || !registry.is_internal(&frame.file));
    if !with_locals {
        frames.iter_mut().for_each(|frame| frame.locals = None);
    }
    CapturedTrace { frames }
}

/// Reads each source file at most once per capture.
fn fill_source_lines(frames: &mut [CapturedFrame]) {
    let mut sources: HashMap<String, Option<String>> = HashMap::new();
    for frame in frames {
        let source = sources
            .entry(frame.file.clone())
            .or_insert_with(|| std::fs::read_to_string(&frame.file).ok());
        frame.source_line = source
            .as_deref()
            .and_then(|source| source_line(source, frame.line));
    }
}

fn source_line(source: &str, line: u32) -> Option<String> {
    let index = usize::try_from(line).ok()?.checked_sub(1)?;
    let text = source.lines().nth(index)?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

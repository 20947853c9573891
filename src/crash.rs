//! Process-wide crash reporting.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, Location};
use std::path::{Path, PathBuf};
use std::thread;

use crate::frames::{self, capture_trace, FrameRegistry};

pub(crate) const SOURCE_FILE: &str = file!();

/// File the crash report goes to when no path is given.
pub const DEFAULT_CRASH_LOG: &str = "crash.log";

/// Replaces the panic hook with one that writes a crash report.
///
/// The report holds the panic message and location, and a backtrace. A
/// panic inside an instrumented call also gets the filtered call stack, with
/// each instrumented call's formatted arguments, so redacted values stay
/// masked. It is printed to stderr and
/// written to `path`, or [`DEFAULT_CRASH_LOG`] in the working directory. If
/// the file cannot be written a warning goes to stderr instead.
pub fn install_crash_hook(path: Option<PathBuf>) {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CRASH_LOG));
    panic::set_hook(Box::new(move |info| {
        let report = crash_report(
            thread::current().name().unwrap_or("<unnamed>"),
            payload_text(info.payload()),
            info.location(),
        );
        eprint!("{}", report);
        write_report(&path, &report);
    }));
}

fn payload_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        *text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.as_str()
    } else {
        "Box<dyn Any>"
    }
}

fn crash_report(thread: &str, message: &str, location: Option<&Location<'_>>) -> String {
    let mut report = match location {
        Some(location) => format!("thread '{}' panicked at {}:\n{}\n", thread, location, message),
        None => format!("thread '{}' panicked:\n{}\n", thread, message),
    };

    if frames::in_instrumented_call() {
        let trace = capture_trace(&FrameRegistry::builtin(), false, true);
        report.push_str("\nStack (most recent call last):\n");
        report.push_str(&trace.to_string());
    }

    report.push_str("\nBacktrace:\n");
    report.push_str(&Backtrace::force_capture().to_string());
    report.push('\n');
    report
}

fn write_report(path: &Path, report: &str) {
    if let Err(error) = std::fs::write(path, report) {
        eprintln!(
            "devlog: failed to write crash log to {}: {}",
            path.display(),
            error
        );
    }
}

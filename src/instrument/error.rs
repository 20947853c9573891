use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use crate::arg::CallArgs;
use crate::error::InstrumentError;
use crate::failure::{Cancelled, Completion, Failure};
use crate::frames::{self, Framed};
use crate::instrument::{Instrumented, InstrumentedAsync, OnError};
use crate::pipeline::{Invocation, Settings};

pub(crate) const SOURCE_FILE: &str = file!();

/// Logs `failure` unless a nested layer already did or the kind filter
/// rejects it, then applies the re-raise policy.
fn fail<R>(
    settings: &Settings,
    variant: &OnError,
    invocation: &Invocation,
    mut failure: Failure,
) -> Result<Completion<R>, Failure> {
    if variant.matches(&failure) && !failure.already_reported() {
        report(settings, variant, invocation, &failure);
        failure.mark_reported();
    }
    if variant.reraise() {
        Err(failure)
    } else {
        Ok(Completion::Suppressed)
    }
}

fn report(settings: &Settings, variant: &OnError, invocation: &Invocation, failure: &Failure) {
    let trace = settings.trace(settings.capture_locals);
    let error = format!(
        "Traceback (most recent call last):\n{}{}",
        trace,
        failure.render()
    );
    match settings.render(invocation, &[(variant.error_var(), error.trim())]) {
        Ok(message) => settings.emit(settings.level, &message),
        Err(error) => tracing::warn!(
            callable = settings.callable.name(),
            %error,
            "failed to render the error message"
        ),
    }
}

impl<F> Instrumented<OnError, F> {
    /// Runs the target; if it fails, logs the failure once and re-raises or
    /// suppresses it.
    ///
    /// # Errors
    ///
    /// Returns the failure when re-raising is enabled, or a [`Failure`]
    /// wrapping an [`InstrumentError`] if the arguments do not bind to the
    /// declared signature.
    #[track_caller]
    pub fn call<A, R, E>(&self, args: A) -> Result<Completion<R>, Failure>
    where
        A: CallArgs,
        F: Fn(A::Target) -> Result<R, E>,
        E: Into<Failure>,
    {
        let invocation = self
            .settings
            .begin(&args.arg_refs(), Location::caller())
            .map_err(|error| Failure::from(InstrumentError::from(error)))?;
        let _scope = frames::enter(&invocation.frames);

        match (self.target)(args.into_target()) {
            Ok(value) => Ok(Completion::Returned(value)),
            Err(error) => fail(&self.settings, &self.variant, &invocation, error.into()),
        }
    }
}

/// Reports a [`Cancelled`] failure if dropped while armed.
///
/// A cancellation dropped through nested on-error layers is reported by the
/// first guard that accepts it, the innermost one. A guard dropped while
/// unwinding reports nothing: the panic is not a cancellation.
struct CancelGuard<'a> {
    settings: &'a Settings,
    variant: &'a OnError,
    invocation: &'a Invocation,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if !self.armed || std::thread::panicking() {
            return;
        }
        let failure = Failure::from(Cancelled);
        if self.variant.matches(&failure) && frames::claim_cancellation() {
            report(self.settings, self.variant, self.invocation, &failure);
        }
    }
}

impl<F> InstrumentedAsync<OnError, F> {
    /// Returns a future that awaits the target; if it fails, logs the
    /// failure once and re-raises or suppresses it.
    ///
    /// Dropping the future while the target is pending reports a
    /// [`Cancelled`] failure when the kind filter accepts it.
    #[track_caller]
    pub fn call<'a, A, Fut, R, E>(
        &'a self,
        args: A,
    ) -> impl Future<Output = Result<Completion<R>, Failure>> + 'a
    where
        A: CallArgs + 'a,
        F: Fn(A::Target) -> Fut,
        Fut: Future<Output = Result<R, E>> + 'a,
        R: 'a,
        E: Into<Failure> + 'a,
    {
        let prepared = self.settings.begin(&args.arg_refs(), Location::caller());
        let frames = match &prepared {
            Ok(invocation) => Arc::clone(&invocation.frames),
            Err(_) => Arc::from(Vec::new()),
        };
        let settings = &self.settings;
        let variant = &self.variant;
        let target = &self.target;

        Framed::new(frames, async move {
            let invocation = match prepared {
                Ok(invocation) => invocation,
                Err(error) => return Err(Failure::from(InstrumentError::from(error))),
            };
            let mut guard = CancelGuard {
                settings,
                variant,
                invocation: &invocation,
                armed: true,
            };
            let outcome = target(args.into_target()).await;
            guard.armed = false;

            match outcome {
                Ok(value) => Ok(Completion::Returned(value)),
                Err(error) => fail(settings, variant, &invocation, error.into()),
            }
        })
    }
}

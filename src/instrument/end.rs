use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use crate::arg::CallArgs;
use crate::error::InstrumentError;
use crate::format::format_value;
use crate::frames::{self, Framed};
use crate::instrument::{Instrumented, InstrumentedAsync, OnEnd};
use crate::pipeline::{Invocation, Settings};

pub(crate) const SOURCE_FILE: &str = file!();

fn conclude<R: fmt::Debug>(
    settings: &Settings,
    variant: &OnEnd,
    invocation: &Invocation,
    result: &R,
) -> Result<(), InstrumentError> {
    let rendered = format_value(&result, variant.result_var(), settings.deny.as_ref());
    let message = settings.render(invocation, &[(variant.result_var(), rendered.as_str())])?;
    settings.emit(settings.level, &message);
    settings.emit_trace();
    Ok(())
}

impl<F> Instrumented<OnEnd, F> {
    /// Runs the target and logs the call if it returned `Ok`.
    ///
    /// The result goes through the same redaction rules as arguments. An
    /// `Err` from the target is returned unchanged and not logged.
    ///
    /// # Errors
    ///
    /// Returns the target's error, or an [`InstrumentError`] converted into
    /// `E` if the arguments do not bind to the declared signature.
    #[track_caller]
    pub fn call<A, R, E>(&self, args: A) -> Result<R, E>
    where
        A: CallArgs,
        F: Fn(A::Target) -> Result<R, E>,
        R: fmt::Debug,
        E: From<InstrumentError>,
    {
        let invocation = self
            .settings
            .begin(&args.arg_refs(), Location::caller())
            .map_err(InstrumentError::from)?;
        let _scope = frames::enter(&invocation.frames);

        let result = (self.target)(args.into_target())?;
        conclude(&self.settings, &self.variant, &invocation, &result)?;
        Ok(result)
    }
}

impl<F> InstrumentedAsync<OnEnd, F> {
    /// Returns a future that awaits the target and logs the call if it
    /// returned `Ok`.
    #[track_caller]
    pub fn call<'a, A, Fut, R, E>(&'a self, args: A) -> impl Future<Output = Result<R, E>> + 'a
    where
        A: CallArgs + 'a,
        F: Fn(A::Target) -> Fut,
        Fut: Future<Output = Result<R, E>> + 'a,
        R: 'a,
        R: fmt::Debug,
        E: From<InstrumentError> + 'a,
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
                Err(error) => return Err(E::from(InstrumentError::from(error))),
            };
            let result = match target(args.into_target()).await {
                Ok(result) => result,
                Err(error) => return Err(error),
            };
            if let Err(error) = conclude(settings, variant, &invocation, &result) {
                return Err(E::from(error));
            }
            Ok(result)
        })
    }
}

use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use crate::arg::CallArgs;
use crate::error::InstrumentError;
use crate::frames::{self, Framed};
use crate::instrument::{Instrumented, InstrumentedAsync, OnStart};
use crate::pipeline::{Invocation, Settings};

pub(crate) const SOURCE_FILE: &str = file!();

fn announce(settings: &Settings, invocation: &Invocation) -> Result<(), InstrumentError> {
    let message = settings.render(invocation, &[])?;
    settings.emit(settings.level, &message);
    settings.emit_trace();
    Ok(())
}

impl<F> Instrumented<OnStart, F> {
    /// Logs the call, then runs the target.
    ///
    /// The target's result, `Ok` or `Err`, is returned unchanged.
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
        E: From<InstrumentError>,
    {
        let invocation = self
            .settings
            .begin(&args.arg_refs(), Location::caller())
            .map_err(InstrumentError::from)?;
        let _scope = frames::enter(&invocation.frames);

        announce(&self.settings, &invocation)?;
        (self.target)(args.into_target())
    }
}

impl<F> InstrumentedAsync<OnStart, F> {
    /// Returns a future that logs the call, then awaits the target.
    ///
    /// Nothing is logged until the future is first polled.
    #[track_caller]
    pub fn call<'a, A, Fut, R, E>(&'a self, args: A) -> impl Future<Output = Result<R, E>> + 'a
    where
        A: CallArgs + 'a,
        F: Fn(A::Target) -> Fut,
        Fut: Future<Output = Result<R, E>> + 'a,
        R: 'a,
        E: From<InstrumentError> + 'a,
    {
        let prepared = self.settings.begin(&args.arg_refs(), Location::caller());
        let frames = match &prepared {
            Ok(invocation) => Arc::clone(&invocation.frames),
            Err(_) => Arc::from(Vec::new()),
        };
        let settings = &self.settings;
        let target = &self.target;

        Framed::new(frames, async move {
            let invocation = match prepared {
                Ok(invocation) => invocation,
                Err(error) => return Err(E::from(InstrumentError::from(error))),
            };
            if let Err(error) = announce(settings, &invocation) {
                return Err(E::from(error));
            }
            target(args.into_target()).await
        })
    }
}

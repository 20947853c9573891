//! Failures observed by on-error instrumentation.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A failed call, as seen by on-error instrumentation.
///
/// Wraps the target's error unchanged and carries a reported marker. The
/// marker travels with the failure, so when the same failure passes through
/// several nested on-error layers only the first one that logs it does so.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into a `Failure`,
/// which makes `?` work in targets returning `Result<T, Failure>`.
///
/// # Examples
///
/// ```
/// use devlog::Failure;
///
/// let failure = Failure::from(std::io::Error::other("disk full"));
/// assert!(failure.is::<std::io::Error>());
/// assert!(!failure.already_reported());
/// assert_eq!(failure.to_string(), "disk full");
/// ```
pub struct Failure {
    error: BoxError,
    type_name: &'static str,
    reported: bool,
}

impl Failure {
    /// Wraps an error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            error: Box::new(error),
            type_name: std::any::type_name::<E>(),
            reported: false,
        }
    }

    /// Returns `true` if the wrapped error is a `K`.
    pub fn is<K: StdError + 'static>(&self) -> bool {
        self.error.is::<K>()
    }

    /// Borrows the wrapped error as a `K`.
    pub fn downcast_ref<K: StdError + 'static>(&self) -> Option<&K> {
        self.error.downcast_ref::<K>()
    }

    /// Recovers the wrapped error as a `K`, or gives the failure back.
    pub fn downcast<K: StdError + 'static>(self) -> Result<K, Self> {
        if !self.error.is::<K>() {
            return Err(self);
        }
        let Self {
            error,
            type_name,
            reported,
        } = self;
        error.downcast::<K>().map(|error| *error).map_err(|error| Self {
            error,
            type_name,
            reported,
        })
    }

    /// The wrapped error.
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.error
    }

    /// Unwraps into the boxed error.
    pub fn into_inner(self) -> BoxError {
        self.error
    }

    /// Type name of the wrapped error.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The wrapped error followed by its sources.
    pub fn chain(&self) -> impl Iterator<Item = &(dyn StdError + 'static)> {
        let first: &(dyn StdError + 'static) = &*self.error;
        std::iter::successors(Some(first), |error| (*error).source())
    }

    /// Returns `true` once a layer has logged this failure.
    pub fn already_reported(&self) -> bool {
        self.reported
    }

    /// Marks the failure as logged.
    pub fn mark_reported(&mut self) {
        self.reported = true;
    }

    /// Renders `type: message`, followed by the source chain.
    pub fn render(&self) -> String {
        let mut out = format!("{}: {}", short_type_name(self.type_name), self.error);
        for source in self.chain().skip(1) {
            out.push_str("\n\nCaused by: ");
            out.push_str(&source.to_string());
        }
        out
    }
}

fn short_type_name(type_name: &str) -> &str {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let start = base.rfind("::").map_or(0, |index| index + 2);
    &type_name[start..]
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("type", &self.type_name)
            .field("error", &self.error)
            .field("reported", &self.reported)
            .finish()
    }
}

impl AsRef<dyn StdError + Send + Sync> for Failure {
    fn as_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.error
    }
}

/// The pending future of an instrumented async call was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("call was cancelled before completing")]
pub struct Cancelled;

/// Outcome of an on-error instrumented call that did not re-raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion<R> {
    /// The target returned normally.
    Returned(R),
    /// The target failed and the failure was suppressed.
    Suppressed,
}

impl<R> Completion<R> {
    /// The returned value, if any.
    pub fn value(self) -> Option<R> {
        match self {
            Self::Returned(value) => Some(value),
            Self::Suppressed => None,
        }
    }

    /// Returns `true` if a failure was suppressed.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed)
    }

    /// The returned value, or `R::default()` for a suppressed failure.
    pub fn unwrap_or_default(self) -> R
    where
        R: Default,
    {
        self.value().unwrap_or_default()
    }

    /// Borrows the returned value.
    pub fn as_ref(&self) -> Completion<&R> {
        match self {
            Self::Returned(value) => Completion::Returned(value),
            Self::Suppressed => Completion::Suppressed,
        }
    }
}

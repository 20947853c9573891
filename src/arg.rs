//! Arguments of instrumented calls.
//!
//! An instrumented call takes its arguments as a tuple. Every element
//! implements [`LogArg`], which knows how to render the element for a log
//! message and how to turn it into the value the target actually receives.
//! [`Redacted`] elements render as their mask and are unwrapped on the way
//! in; [`Kw`] elements carry a parameter name.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use crate::redacted::Redacted;

/// A value that can be rendered into a log message.
///
/// This is the object-safe half of [`LogArg`]; formatting code works with
/// `&dyn LogValue`.
pub trait LogValue {
    /// Writes the canonical text representation of the value.
    fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;

    /// Returns the mask if this value is redacted.
    fn mask(&self) -> Option<&str> {
        None
    }
}

/// An argument of an instrumented call.
pub trait LogArg: LogValue {
    /// What the target receives for this argument.
    type Target;

    /// Keyword under which the argument was passed, if any.
    fn keyword(&self) -> Option<&'static str> {
        None
    }

    /// Strips any redaction or keyword wrapper.
    fn into_target(self) -> Self::Target;
}

/// Renders a value for logging: the mask for redacted values, the canonical
/// text otherwise.
pub fn render_for_log(value: &dyn LogValue) -> String {
    match value.mask() {
        Some(mask) => mask.to_string(),
        None => Repr(value).to_string(),
    }
}

/// Display adapter over [`LogValue::fmt_repr`].
pub(crate) struct Repr<'a>(pub(crate) &'a dyn LogValue);

impl fmt::Display for Repr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt_repr(f)
    }
}

impl<T> LogValue for Redacted<T> {
    fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Redacted::mask(self))
    }

    fn mask(&self) -> Option<&str> {
        Some(Redacted::mask(self))
    }
}

impl<T> LogArg for Redacted<T> {
    type Target = T;

    fn into_target(self) -> T {
        self.into_inner()
    }
}

impl<T: fmt::Debug + ?Sized> LogValue for &T {
    fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(*self, f)
    }
}

impl<'a, T: fmt::Debug + ?Sized> LogArg for &'a T {
    type Target = &'a T;

    fn into_target(self) -> &'a T {
        self
    }
}

impl<T: fmt::Debug + ?Sized> LogValue for &mut T {
    fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a, T: fmt::Debug + ?Sized> LogArg for &'a mut T {
    type Target = &'a mut T;

    fn into_target(self) -> &'a mut T {
        self
    }
}

/// A keyword argument: a value passed under a parameter name.
///
/// In args/kwargs mode keyword arguments show up in `{kwargs}` and are
/// checked against the deny-list by name. In binding mode they bind to the
/// declared parameter of the same name. The target still receives the values
/// in tuple order.
///
/// # Examples
///
/// ```
/// use devlog::{kw, LogArg};
///
/// let arg = kw("retries", 3);
/// assert_eq!(arg.keyword(), Some("retries"));
/// assert_eq!(arg.into_target(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Kw<T> {
    name: &'static str,
    value: T,
}

/// Passes `value` as the keyword argument `name`.
pub fn kw<T: LogArg>(name: &'static str, value: T) -> Kw<T> {
    Kw { name, value }
}

impl<T: LogArg> LogValue for Kw<T> {
    fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt_repr(f)
    }

    fn mask(&self) -> Option<&str> {
        self.value.mask()
    }
}

impl<T: LogArg> LogArg for Kw<T> {
    type Target = T::Target;

    fn keyword(&self) -> Option<&'static str> {
        Some(self.name)
    }

    fn into_target(self) -> T::Target {
        self.value.into_target()
    }
}

/// Implements [`LogArg`] for owned types that render through `Debug` and are
/// passed to the target unchanged.
///
/// Use it for your own argument types:
///
/// ```
/// #[derive(Debug)]
/// struct UserId(u64);
///
/// devlog::impl_log_arg!(UserId);
/// ```
#[macro_export]
macro_rules! impl_log_arg {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::LogValue for $t {
                fn fmt_repr(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                    ::std::fmt::Debug::fmt(self, f)
                }
            }

            impl $crate::LogArg for $t {
                type Target = $t;

                fn into_target(self) -> $t {
                    self
                }
            }
        )*
    };
}

impl_log_arg!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, (),
    String, PathBuf, Duration,
);

macro_rules! impl_log_arg_generic {
    ($($t:ident < $($p:ident),+ >),* $(,)?) => {
        $(
            impl<$($p),+> LogValue for $t<$($p),+>
            where
                $t<$($p),+>: fmt::Debug,
            {
                fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Debug::fmt(self, f)
                }
            }

            impl<$($p),+> LogArg for $t<$($p),+>
            where
                $t<$($p),+>: fmt::Debug,
            {
                type Target = Self;

                fn into_target(self) -> Self {
                    self
                }
            }
        )*
    };
}

impl_log_arg_generic!(
    Option<T>,
    Vec<T>,
    VecDeque<T>,
    Box<T>,
    Rc<T>,
    Arc<T>,
    HashSet<T, S>,
    BTreeSet<T>,
    HashMap<K, V, S>,
    BTreeMap<K, V>,
    Result<T, E>,
);

impl<'a> LogValue for Cow<'a, str> {
    fn fmt_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<'a> LogArg for Cow<'a, str> {
    type Target = Cow<'a, str>;

    fn into_target(self) -> Self {
        self
    }
}

/// A borrowed view of one call argument, used while building messages.
#[derive(Clone, Copy)]
pub struct ArgRef<'a> {
    /// Keyword under which the argument was passed.
    pub keyword: Option<&'static str>,
    /// The argument value.
    pub value: &'a dyn LogValue,
}

impl fmt::Debug for ArgRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgRef")
            .field("keyword", &self.keyword)
            .field("value", &render_for_log(self.value))
            .finish()
    }
}

/// The argument tuple of an instrumented call.
///
/// Implemented for tuples of up to eight [`LogArg`] elements. The target
/// receives the tuple of unwrapped elements.
///
/// Element types come from the tuple passed to `call`, not from the
/// target's parameters, so an unsuffixed integer literal is an `i32`.
/// Suffix literals (`42_u32`) when the target takes another integer type.
pub trait CallArgs {
    /// Tuple of unwrapped values passed to the target.
    type Target;

    /// Borrowed views of the arguments, in order.
    fn arg_refs(&self) -> Vec<ArgRef<'_>>;

    /// Unwraps every argument.
    fn into_target(self) -> Self::Target;
}

impl CallArgs for () {
    type Target = ();

    fn arg_refs(&self) -> Vec<ArgRef<'_>> {
        Vec::new()
    }

    fn into_target(self) -> Self::Target {}
}

macro_rules! impl_call_args {
    ($(($($name:ident $idx:tt),+)),* $(,)?) => {
        $(
            impl<$($name: LogArg),+> CallArgs for ($($name,)+) {
                type Target = ($($name::Target,)+);

                fn arg_refs(&self) -> Vec<ArgRef<'_>> {
                    vec![$(ArgRef {
                        keyword: self.$idx.keyword(),
                        value: &self.$idx,
                    }),+]
                }

                fn into_target(self) -> Self::Target {
                    ($(self.$idx.into_target(),)+)
                }
            }
        )*
    };
}

impl_call_args!(
    (A 0),
    (A 0, B 1),
    (A 0, B 1, C 2),
    (A 0, B 1, C 2, D 3),
    (A 0, B 1, C 2, D 3, E 4),
    (A 0, B 1, C 2, D 3, E 4, F 5),
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6),
    (A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7),
);

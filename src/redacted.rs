use std::borrow::{Borrow, BorrowMut, Cow};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Deref, DerefMut, Div, Index, IndexMut, Mul, Neg, Rem, Sub};

/// Mask used when no custom mask is supplied.
pub const DEFAULT_MASK: &str = "***";

/// A transparent wrapper that marks a value as sensitive for logging only.
///
/// `Redacted<T>` behaves like the value it holds: it dereferences to `T`,
/// compares, hashes, orders, indexes, iterates and does arithmetic exactly as
/// `T` does, and when both operands are redacted the comparison runs against
/// the other side's inner value. Instrumented calls unwrap it before the
/// target runs, so the target never sees the wrapper.
///
/// The only thing that differs is rendering: `Debug`, `Display` and
/// [`LogValue::mask`](crate::LogValue::mask) always produce the mask, no
/// matter how deeply the wrapper is nested or what the inner value is.
///
/// # Examples
///
/// ```
/// use devlog::{redact, redact_with};
///
/// let password = redact("hunter2".to_string());
/// assert_eq!(format!("{:?}", password), "***");
/// assert_eq!(password.len(), 7);
/// assert!(password == "hunter2".to_string());
///
/// let card = redact_with("4111111111111111", "****-XXXX");
/// assert_eq!(card.to_string(), "****-XXXX");
/// ```
#[derive(Clone)]
pub struct Redacted<T> {
    inner: T,
    mask: Cow<'static, str>,
}

impl<T> Redacted<T> {
    /// Wraps a value using the default `***` mask.
    pub fn new(value: T) -> Self {
        Self {
            inner: value,
            mask: Cow::Borrowed(DEFAULT_MASK),
        }
    }

    /// Wraps a value with a custom mask.
    pub fn with_mask(value: T, mask: impl Into<Cow<'static, str>>) -> Self {
        Self {
            inner: value,
            mask: mask.into(),
        }
    }

    /// Returns the mask rendered in place of the value.
    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Returns a reference to the real value.
    pub fn expose(&self) -> &T {
        &self.inner
    }

    /// Consumes the wrapper and returns the real value.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Borrows the inner value while keeping it redacted.
    ///
    /// Useful for passing a redacted reference into an instrumented call
    /// whose target takes `&T`.
    pub fn by_ref(&self) -> Redacted<&T> {
        Redacted {
            inner: &self.inner,
            mask: self.mask.clone(),
        }
    }

    /// Maps the inner value, keeping the mask.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Redacted<U> {
        Redacted {
            inner: f(self.inner),
            mask: self.mask,
        }
    }
}

/// Wraps `value` with the default mask.
pub fn redact<T>(value: T) -> Redacted<T> {
    Redacted::new(value)
}

/// Wraps `value` with a custom mask.
pub fn redact_with<T>(value: T, mask: impl Into<Cow<'static, str>>) -> Redacted<T> {
    Redacted::with_mask(value, mask)
}

// Debug and Display are how Rust code renders values into logs, so both are
// the render-for-log path and MUST print the mask only.

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mask)
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mask)
    }
}

impl<T: Default> Default for Redacted<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Redacted<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> Deref for Redacted<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for Redacted<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> AsRef<T> for Redacted<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl<T> AsMut<T> for Redacted<T> {
    fn as_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

// Hash/Eq agree with T, so Borrow<T> lets maps keyed by Redacted<T> be
// queried with a plain &T.
impl<T> Borrow<T> for Redacted<T> {
    fn borrow(&self) -> &T {
        &self.inner
    }
}

impl<T> BorrowMut<T> for Redacted<T> {
    fn borrow_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: PartialEq<U>, U> PartialEq<Redacted<U>> for Redacted<T> {
    fn eq(&self, other: &Redacted<U>) -> bool {
        self.inner == other.inner
    }
}

impl<T: Eq> Eq for Redacted<T> {}

impl<T: PartialOrd<U>, U> PartialOrd<Redacted<U>> for Redacted<T> {
    fn partial_cmp(&self, other: &Redacted<U>) -> Option<Ordering> {
        self.inner.partial_cmp(&other.inner)
    }
}

impl<T: Ord> Ord for Redacted<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner.cmp(&other.inner)
    }
}

impl<T: Hash> Hash for Redacted<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl<T: Index<I>, I> Index<I> for Redacted<T> {
    type Output = T::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.inner[index]
    }
}

impl<T: IndexMut<I>, I> IndexMut<I> for Redacted<T> {
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        &mut self.inner[index]
    }
}

impl<T: IntoIterator> IntoIterator for Redacted<T> {
    type Item = T::Item;
    type IntoIter = T::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Redacted<T>
where
    &'a T: IntoIterator,
{
    type Item = <&'a T as IntoIterator>::Item;
    type IntoIter = <&'a T as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        (&self.inner).into_iter()
    }
}

impl<'a, T> IntoIterator for &'a mut Redacted<T>
where
    &'a mut T: IntoIterator,
{
    type Item = <&'a mut T as IntoIterator>::Item;
    type IntoIter = <&'a mut T as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        (&mut self.inner).into_iter()
    }
}

impl<T: Neg> Neg for Redacted<T> {
    type Output = T::Output;

    fn neg(self) -> Self::Output {
        -self.inner
    }
}

macro_rules! impl_redacted_arith {
    ($($op:ident $method:ident),* $(,)?) => {
        $(
            impl<T: $op<U>, U> $op<Redacted<U>> for Redacted<T> {
                type Output = T::Output;

                fn $method(self, rhs: Redacted<U>) -> Self::Output {
                    self.inner.$method(rhs.inner)
                }
            }
        )*
    };
}

impl_redacted_arith!(Add add, Sub sub, Mul mul, Div div, Rem rem);

// Comparisons against plain peers, in both directions.
macro_rules! impl_plain_cmp {
    ($($t:ty),* $(,)?) => {
        $(
            impl PartialEq<$t> for Redacted<$t> {
                fn eq(&self, other: &$t) -> bool {
                    self.inner == *other
                }
            }

            impl PartialEq<Redacted<$t>> for $t {
                fn eq(&self, other: &Redacted<$t>) -> bool {
                    *self == other.inner
                }
            }

            impl PartialOrd<$t> for Redacted<$t> {
                fn partial_cmp(&self, other: &$t) -> Option<Ordering> {
                    self.inner.partial_cmp(other)
                }
            }

            impl PartialOrd<Redacted<$t>> for $t {
                fn partial_cmp(&self, other: &Redacted<$t>) -> Option<Ordering> {
                    self.partial_cmp(&other.inner)
                }
            }
        )*
    };
}

impl_plain_cmp!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, String,
    &str,
);

impl PartialEq<str> for Redacted<String> {
    fn eq(&self, other: &str) -> bool {
        self.inner == other
    }
}

impl PartialEq<&str> for Redacted<String> {
    fn eq(&self, other: &&str) -> bool {
        self.inner == *other
    }
}

// Arithmetic against plain peers, in both directions.
macro_rules! impl_plain_arith {
    ($($t:ty),* $(,)?) => {
        $(
            impl_plain_arith!(@op $t, Add add);
            impl_plain_arith!(@op $t, Sub sub);
            impl_plain_arith!(@op $t, Mul mul);
            impl_plain_arith!(@op $t, Div div);
            impl_plain_arith!(@op $t, Rem rem);
        )*
    };
    (@op $t:ty, $op:ident $method:ident) => {
        impl $op<$t> for Redacted<$t> {
            type Output = $t;

            fn $method(self, rhs: $t) -> $t {
                self.inner.$method(rhs)
            }
        }

        impl $op<Redacted<$t>> for $t {
            type Output = $t;

            fn $method(self, rhs: Redacted<$t>) -> $t {
                self.$method(rhs.inner)
            }
        }
    };
}

impl_plain_arith!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl Add<&str> for Redacted<String> {
    type Output = String;

    fn add(self, rhs: &str) -> String {
        self.inner + rhs
    }
}

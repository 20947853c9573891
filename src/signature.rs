use std::fmt;

use crate::arg::{ArgRef, LogValue};
use crate::error::BindError;

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    name: String,
    default: Option<String>,
}

impl Param {
    /// The parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rendered default value, if the parameter is optional.
    pub fn default_repr(&self) -> Option<&str> {
        self.default.as_deref()
    }
}

/// Declared parameters of an instrumented callable.
///
/// Rust closures have no runtime signature, so binding mode needs one spelled
/// out. Optional parameters carry a default that is only used for rendering:
/// the target itself receives exactly the tuple the caller passed.
///
/// # Examples
///
/// ```
/// use devlog::{kw, CallArgs, Signature};
///
/// let sig = Signature::new(["arg1", "arg2"])
///     .optional("kwarg1", None::<i32>)
///     .optional("kwarg2", None::<i32>);
///
/// let args = (1, 2, kw("kwarg2", 5));
/// let bound = sig.bind(&args.arg_refs()).unwrap();
/// let names: Vec<_> = bound.iter().map(|(name, _)| name).collect();
/// assert_eq!(names, ["arg1", "arg2", "kwarg1", "kwarg2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// Declares the required parameters, in order.
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            params: required
                .into_iter()
                .map(|name| Param {
                    name: name.into(),
                    default: None,
                })
                .collect(),
        }
    }

    /// Appends a required parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Appends an optional parameter whose default renders as `default`'s
    /// `Debug` text.
    pub fn optional(mut self, name: impl Into<String>, default: impl fmt::Debug) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: Some(format!("{:?}", default)),
        });
        self
    }

    /// The declared parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Parameter names, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(Param::name)
    }

    /// Maps call arguments onto the declared parameters.
    ///
    /// Positional arguments fill parameters in order, keyword arguments fill
    /// the parameter of the same name, and anything left takes its default.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] when there are too many positional arguments, an
    /// unknown or repeated keyword, a positional argument after a keyword, or
    /// a required parameter with no value.
    pub fn bind<'a>(&'a self, args: &[ArgRef<'a>]) -> Result<BoundArguments<'a>, BindError> {
        let positional = args.iter().filter(|arg| arg.keyword.is_none()).count();
        if positional > self.params.len() {
            return Err(BindError::TooManyPositional {
                expected: self.params.len(),
                given: positional,
            });
        }

        let mut slots: Vec<Option<&'a dyn LogValue>> = vec![None; self.params.len()];
        let mut seen_keyword = false;

        for (position, arg) in args.iter().enumerate() {
            let index = match arg.keyword {
                None if seen_keyword => {
                    return Err(BindError::PositionalAfterKeyword { position });
                }
                None => position,
                Some(name) => {
                    seen_keyword = true;
                    self.params
                        .iter()
                        .position(|param| param.name == name)
                        .ok_or_else(|| BindError::UnexpectedKeyword {
                            name: name.to_string(),
                        })?
                }
            };

            match slots.get_mut(index) {
                Some(slot @ None) => *slot = Some(arg.value),
                Some(Some(_)) => {
                    return Err(BindError::MultipleValues {
                        name: self.params[index].name.clone(),
                    });
                }
                None => {
                    return Err(BindError::TooManyPositional {
                        expected: self.params.len(),
                        given: positional,
                    });
                }
            }
        }

        let entries = self
            .params
            .iter()
            .zip(slots)
            .map(|(param, slot)| {
                let value = match (slot, param.default.as_deref()) {
                    (Some(value), _) => BoundValue::Supplied(value),
                    (None, Some(default)) => BoundValue::Default(default),
                    (None, None) => {
                        return Err(BindError::Missing {
                            name: param.name.clone(),
                        });
                    }
                };
                Ok((param.name.as_str(), value))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BoundArguments { entries })
    }
}

/// Value bound to one parameter.
#[derive(Clone, Copy)]
pub enum BoundValue<'a> {
    /// Supplied by the caller.
    Supplied(&'a dyn LogValue),
    /// Rendered default of an omitted optional parameter.
    Default(&'a str),
}

impl fmt::Debug for BoundValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supplied(value) => {
                write!(f, "Supplied({})", crate::arg::render_for_log(*value))
            }
            Self::Default(text) => write!(f, "Default({})", text),
        }
    }
}

/// Parameter name → value for one call, in declaration order.
#[derive(Debug, Clone)]
pub struct BoundArguments<'a> {
    entries: Vec<(&'a str, BoundValue<'a>)>,
}

impl<'a> BoundArguments<'a> {
    /// Iterates over `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, BoundValue<'a>)> + '_ {
        self.entries.iter().copied()
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &str) -> Option<BoundValue<'a>> {
        self.entries
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, value)| *value)
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the signature declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use thiserror::Error;

/// Errors raised by the instrumentation machinery itself.
///
/// Target failures never show up here; they travel in the target's own error
/// type (or in [`Failure`](crate::Failure)). Targets opt in to receiving
/// these through `E: From<InstrumentError>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstrumentError {
    /// The wrapping was configured incorrectly.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The call's arguments do not match the declared signature.
    #[error(transparent)]
    Bind(#[from] BindError),
}

/// A configuration error, reported when a callable is wrapped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The template references a field that will never be supplied.
    #[error("message template {template:?} references unknown placeholder '{name}'")]
    UnknownPlaceholder {
        /// The placeholder name.
        name: String,
        /// The template source.
        template: String,
    },
    /// A `{` without a closing `}`.
    #[error("unclosed '{{' at byte {position} in message template")]
    UnclosedPlaceholder {
        /// Byte offset of the opening brace.
        position: usize,
    },
    /// A single `}` that does not close a placeholder.
    #[error("unmatched '}}' at byte {position} in message template")]
    UnmatchedBrace {
        /// Byte offset of the brace.
        position: usize,
    },
    /// `{}` with no field name.
    #[error("empty placeholder at byte {position} in message template")]
    EmptyPlaceholder {
        /// Byte offset of the opening brace.
        position: usize,
    },
    /// Format specs, conversions and indexing are not supported.
    #[error("unsupported placeholder '{name}': only plain field names are allowed")]
    UnsupportedPlaceholder {
        /// The placeholder text.
        name: String,
    },
}

/// The supplied arguments do not fit the declared parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// More positional arguments than declared parameters.
    #[error("takes {expected} positional arguments but {given} were given")]
    TooManyPositional {
        /// Number of declared parameters.
        expected: usize,
        /// Number of positional arguments supplied.
        given: usize,
    },
    /// A keyword that names no declared parameter.
    #[error("got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword {
        /// The keyword.
        name: String,
    },
    /// A parameter supplied both positionally and by keyword, or twice by keyword.
    #[error("got multiple values for argument '{name}'")]
    MultipleValues {
        /// The parameter name.
        name: String,
    },
    /// A parameter without default that received no value.
    #[error("missing a required argument: '{name}'")]
    Missing {
        /// The parameter name.
        name: String,
    },
    /// A positional argument after a keyword argument.
    #[error("positional argument at position {position} follows a keyword argument")]
    PositionalAfterKeyword {
        /// Zero-based position in the argument tuple.
        position: usize,
    },
}

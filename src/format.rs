//! Turning call arguments into loggable text.
//!
//! Rules, in order: a redacted value renders as its own mask; a value whose
//! parameter name is on the deny-list renders as [`MASK`]; anything else
//! renders through its canonical (`Debug`) representation.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::arg::{ArgRef, LogValue, Repr};
use crate::error::ConfigError;
use crate::redacted::DEFAULT_MASK;
use crate::signature::{BoundArguments, BoundValue};

/// Mask used for deny-listed parameters.
pub const MASK: &str = DEFAULT_MASK;

/// Parameter names whose values are always masked.
///
/// # Examples
///
/// ```
/// use devlog::{format_value, DenyList};
///
/// let deny: DenyList = ["password"].into_iter().collect();
/// assert_eq!(format_value(&"hunter2", "password", Some(&deny)), "***");
/// assert_eq!(format_value(&"alice", "username", Some(&deny)), "\"alice\"");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenyList {
    names: HashSet<String>,
}

impl DenyList {
    /// Creates an empty deny-list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter name.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    /// Returns `true` if `name` is denied.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of denied names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if nothing is denied.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DenyList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

static DEFAULT_REDACT_PARAMS: OnceLock<DenyList> = OnceLock::new();

/// Sets the process-wide deny-list used by instrumentations that do not
/// configure their own.
///
/// Can be set once; returns `false` if a default was already installed.
pub fn set_default_redact_params<I, S>(names: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    DEFAULT_REDACT_PARAMS.set(names.into_iter().collect()).is_ok()
}

/// The process-wide default deny-list, if one was installed.
pub fn default_redact_params() -> Option<&'static DenyList> {
    DEFAULT_REDACT_PARAMS.get()
}

/// Formats one value for a log message.
pub fn format_value(value: &dyn LogValue, param_name: &str, deny: Option<&DenyList>) -> String {
    if let Some(mask) = value.mask() {
        return mask.to_string();
    }
    if is_denied(param_name, deny) {
        return MASK.to_string();
    }
    Repr(value).to_string()
}

fn is_denied(param_name: &str, deny: Option<&DenyList>) -> bool {
    !param_name.is_empty() && deny.is_some_and(|deny| deny.contains(param_name))
}

/// Returns `true` if formatting `args` could mask anything.
pub fn needs_redaction(args: &[ArgRef<'_>], deny: Option<&DenyList>) -> bool {
    deny.is_some_and(|deny| !deny.is_empty()) || args.iter().any(|arg| arg.value.mask().is_some())
}

/// Positional and keyword arguments of one call, already rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedArgs {
    /// Rendered positional arguments, in order.
    pub positional: Vec<String>,
    /// Rendered keyword arguments, in order.
    pub keywords: Vec<(String, String)>,
}

impl FormattedArgs {
    /// Positional arguments as a tuple literal: `()`, `(1,)`, `(1, 2)`.
    pub fn args_text(&self) -> String {
        match self.positional.as_slice() {
            [single] => format!("({},)", single),
            items => format!("({})", items.join(", ")),
        }
    }

    /// Keyword arguments as a map literal: `{}`, `{"retries": 3}`.
    pub fn kwargs_text(&self) -> String {
        let mut out = String::from("{");
        for (i, (name, value)) in self.keywords.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{:?}: {}", name, value);
        }
        out.push('}');
        out
    }
}

/// Formats the arguments of a call.
///
/// Positional arguments have no parameter name here, so only keyword
/// arguments are checked against the deny-list.
pub fn format_arguments(args: &[ArgRef<'_>], deny: Option<&DenyList>) -> FormattedArgs {
    format_named_arguments(args, &[], deny)
}

/// Like [`format_arguments`], but positional argument `i` is checked against
/// the deny-list under `positional_names[i]`.
pub(crate) fn format_named_arguments(
    args: &[ArgRef<'_>],
    positional_names: &[&str],
    deny: Option<&DenyList>,
) -> FormattedArgs {
    let redact = needs_redaction(args, deny);
    let mut formatted = FormattedArgs::default();

    for (position, arg) in args.iter().enumerate() {
        let name = match arg.keyword {
            Some(keyword) => keyword,
            None => positional_names.get(position).copied().unwrap_or(""),
        };
        let text = if redact {
            format_value(arg.value, name, deny)
        } else {
            Repr(arg.value).to_string()
        };
        match arg.keyword {
            Some(name) => formatted.keywords.push((name.to_string(), text)),
            None => formatted.positional.push(text),
        }
    }

    formatted
}

/// Formats bound parameters, masking deny-listed names.
pub fn format_bound(bound: &BoundArguments<'_>, deny: Option<&DenyList>) -> Vec<(String, String)> {
    bound
        .iter()
        .map(|(name, value)| {
            let text = match value {
                BoundValue::Supplied(value) => format_value(value, name, deny),
                BoundValue::Default(_) if is_denied(name, deny) => MASK.to_string(),
                BoundValue::Default(text) => text.to_string(),
            };
            (name.to_string(), text)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A message template with named `{placeholders}`.
///
/// `{{` and `}}` produce literal braces. Format specs such as `{x:>4}` are
/// rejected when parsing.
///
/// # Examples
///
/// ```
/// use devlog::{MessageFields, Template};
///
/// let template = Template::parse("Start {callable} with args {args}").unwrap();
/// let mut fields = MessageFields::new();
/// fields.insert("callable", "login");
/// fields.insert("args", "(1, 2)");
/// assert_eq!(template.render(&fields).unwrap(), "Start login with args (1, 2)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parses a template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unbalanced braces, empty placeholders and
    /// placeholders that are not plain field names.
    pub fn parse(source: impl Into<String>) -> Result<Self, ConfigError> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((position, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|&(_, next)| next) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed || name.contains('{') {
                        return Err(ConfigError::UnclosedPlaceholder { position });
                    }
                    if name.is_empty() {
                        return Err(ConfigError::EmptyPlaceholder { position });
                    }
                    if name.contains([':', '!', '[', ' ']) {
                        return Err(ConfigError::UnsupportedPlaceholder { name });
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(name));
                }
                '}' if chars.peek().map(|&(_, next)| next) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(ConfigError::UnmatchedBrace { position }),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments })
    }

    /// The template source.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Checks that every placeholder is known.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPlaceholder`] for the first unknown name.
    pub fn check_fields(&self, known: impl Fn(&str) -> bool) -> Result<(), ConfigError> {
        match self.placeholders().find(|name| !known(name)) {
            Some(name) => Err(self.unknown(name)),
            None => Ok(()),
        }
    }

    /// Fills the template.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPlaceholder`] if a field is missing.
    pub fn render(&self, fields: &MessageFields) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = fields.get(name).ok_or_else(|| self.unknown(name))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    fn unknown(&self, name: &str) -> ConfigError {
        ConfigError::UnknownPlaceholder {
            name: name.to_string(),
            template: self.source.clone(),
        }
    }
}

/// Named values available to a template. Later inserts shadow earlier ones.
#[derive(Debug, Clone, Default)]
pub struct MessageFields {
    entries: Vec<(String, String)>,
}

impl MessageFields {
    /// Creates an empty field set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, shadowing any earlier field of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Looks up a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }
}

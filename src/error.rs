//! Structured conversion errors carrying a JSON-Pointer location.
//!
//! Errors are raised without a location and pick up one path token per level
//! while they unwind out of nested properties and array items, so the error
//! seen by the top-level caller points from the root to the failure.
use std::error::Error as StdError;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub type Result<T, E = JsonError> = std::result::Result<T, E>;

// ---------------------------------- Path ----------------------------------- //

/// One step into a JSON structure.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathToken {
    Key(String),
    Index(usize),
}

impl From<&str> for PathToken {
    fn from(key: &str) -> Self { Self::Key(key.to_string()) }
}

impl From<String> for PathToken {
    fn from(key: String) -> Self { Self::Key(key) }
}

impl From<usize> for PathToken {
    fn from(index: usize) -> Self { Self::Index(index) }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // RFC 6901: `~` -> `~0`, `/` -> `~1`
            Self::Key(key) => f.write_str(&key.replace('~', "~0").replace('/', "~1")),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// JSON Pointer, e.g. `/inner/field2`. The root pointer renders as `""`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pointer(Vec<PathToken>);

impl Pointer {
    pub fn root() -> Self { Self::default() }
    pub fn is_root(&self) -> bool { self.0.is_empty() }
    pub fn tokens(&self) -> &[PathToken] { &self.0 }

    pub fn child(mut self, token: impl Into<PathToken>) -> Self {
        self.0.push(token.into());
        self
    }

    pub(crate) fn prepend(&mut self, token: PathToken) { self.0.insert(0, token); }
}

impl FromIterator<PathToken> for Pointer {
    fn from_iter<I: IntoIterator<Item = PathToken>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.0 {
            write!(f, "/{token}")?;
        }
        Ok(())
    }
}

// ---------------------------------- Kinds ---------------------------------- //

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("can't deserialize {actual} as {expected}")]
    TypeMismatch { expected: String, actual: String },

    #[error("can't create {class}; missing required {}", list("property", "properties", .names))]
    MissingProperty { class: String, names: Vec<String> },

    #[error("can't create {class}; unexpected {}", list("property", "properties", .names))]
    UnexpectedProperties { class: String, names: Vec<String> },

    #[error("no matching constructor for {class} from {{{}}}", .keys.join(", "))]
    NoMatchingConstructor { class: String, keys: Vec<String> },

    #[error("null not allowed for non-nullable {target}")]
    NullNotAllowed { target: String },

    #[error("can't resolve a converter for {target}: {reason}")]
    UnresolvableType { target: String, reason: String },

    #[error("missing discriminator {name:?} for {class}")]
    MissingDiscriminator { class: String, name: String },

    #[error("unknown {name:?} value {value:?} for {class}")]
    UnknownDiscriminatorValue { class: String, name: String, value: String },

    #[error("duplicate entry {item} in {collection}")]
    Duplicate { collection: String, item: String },

    #[error("circular reference to {class}")]
    CircularReference { class: String },

    #[error("error constructing {class}: {cause}")]
    ConstructionFailed {
        class: String,
        #[source]
        cause: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("invalid JSON text: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("error writing JSON: {0}")]
    Io(#[source] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

fn list(one: &str, many: &str, names: &[String]) -> String {
    let label = if names.len() == 1 { one } else { many };
    format!("{label} {}", names.join(", "))
}

// ---------------------------------- Error ---------------------------------- //

#[derive(Debug)]
pub struct JsonError {
    kind: ErrorKind,
    pointer: Pointer,
}

impl JsonError {
    pub fn new(kind: ErrorKind) -> Self { Self { kind, pointer: Pointer::root() } }
    pub fn kind(&self) -> &ErrorKind { &self.kind }
    pub fn into_kind(self) -> ErrorKind { self.kind }
    pub fn pointer(&self) -> &Pointer { &self.pointer }

    /// Prefix the location with the token of the level being unwound.
    pub fn within(mut self, token: impl Into<PathToken>) -> Self {
        self.pointer.prepend(token.into());
        self
    }

    pub(crate) fn at(mut self, pointer: Pointer) -> Self {
        self.pointer = pointer;
        self
    }

    pub fn custom(message: impl fmt::Display) -> Self { Self::new(ErrorKind::Custom(message.to_string())) }

    pub fn type_mismatch(expected: impl fmt::Display, actual: &Value) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected: expected.to_string(), actual: display_value(actual) })
    }

    pub fn null_not_allowed(target: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NullNotAllowed { target: target.to_string() })
    }

    pub fn unresolvable(target: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::UnresolvableType { target: target.to_string(), reason: reason.to_string() })
    }

    /// Wrap a failure raised by a constructor or factory.
    ///
    /// A `JsonError` travelling inside the `anyhow::Error` is passed through
    /// unchanged.
    pub fn construction(class: impl fmt::Display, cause: anyhow::Error) -> Self {
        match cause.downcast::<JsonError>() {
            Ok(error) => error,
            Err(cause) => Self::new(ErrorKind::ConstructionFailed { class: class.to_string(), cause: cause.into() }),
        }
    }
}

impl From<ErrorKind> for JsonError {
    fn from(kind: ErrorKind) -> Self { Self::new(kind) }
}

impl fmt::Display for JsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pointer.is_root() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}, at {}", self.kind, self.pointer)
        }
    }
}

impl StdError for JsonError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> { self.kind.source() }
}

// --------------------------------- Helpers --------------------------------- //

const DISPLAY_MAX_CHARS: usize = 20;

/// Short rendering of a JSON value for error messages.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) if s.chars().count() > DISPLAY_MAX_CHARS => {
            let head: String = s.chars().take(DISPLAY_MAX_CHARS - 3).collect();
            format!("\"{head}...\"")
        }
        Value::Array(items) if items.is_empty() => "[]".to_string(),
        Value::Array(_) => "[...]".to_string(),
        Value::Object(map) if map.is_empty() => "{}".to_string(),
        Value::Object(_) => "{...}".to_string(),
        other => other.to_string(),
    }
}

// ------------------------------- Tests ------------------------------------ //

use std::fmt;
use std::io;

use hyper::StatusCode;
use thiserror::Error;

use crate::protocol::Fault;

/// Errors raised while converting native values into `Value` or back.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("integer {0} does not fit in a 32-bit XML-RPC int")]
    OutOfRange(i128),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("character {0:?} cannot appear in an XML document")]
    InvalidChar(char),

    #[error("invalid dateTime.iso8601 value {0:?}")]
    InvalidDateTime(String),

    #[error("{0}")]
    Custom(String),
}

impl serde::de::Error for ValueError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        ValueError::Custom(msg.to_string())
    }
}

/// The class of a deserialization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedXml,
    MissingMethodName,
    UnknownType,
    StructuralError,
    InvalidValue,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::MalformedXml => "malformed xml",
            ErrorKind::MissingMethodName => "missing method name",
            ErrorKind::UnknownType => "unknown type",
            ErrorKind::StructuralError => "structural error",
            ErrorKind::InvalidValue => "invalid value",
        };
        f.write_str(s)
    }
}

/// Zero-based location in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub row: u64,
    pub column: u64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}, column {}", self.row + 1, self.column + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}{}",
    .position.map(|p| format!(" at {}", p)).unwrap_or_default()
)]
pub struct DeserializeError {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<Position>,
}

impl DeserializeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        DeserializeError {
            kind,
            message: message.into(),
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

/// Failure reported by a method handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// An application fault sent back to the caller verbatim.
    #[error("{0}")]
    Fault(Fault),

    #[error("{0}")]
    Failed(Box<dyn std::error::Error + Send + Sync>),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        HandlerError::Fault(Fault::new(code, message))
    }

    pub fn failed<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        HandlerError::Failed(err.into())
    }
}

impl From<Fault> for HandlerError {
    fn from(fault: Fault) -> Self {
        HandlerError::Fault(fault)
    }
}

impl From<ValueError> for HandlerError {
    fn from(err: ValueError) -> Self {
        HandlerError::failed(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("method '{0}' is already registered")]
    Duplicate(String),

    #[error("method name must not be empty")]
    EmptyName,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint uri: {0}")]
    InvalidUri(String),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request timed out")]
    Timeout,

    #[error("server answered with status {0}")]
    Status(StatusCode),
}

/// Outcome of a failed client call. Each variant is a distinct failure class.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server understood the call and answered with a fault.
    #[error("{0}")]
    Fault(Fault),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed response: {0}")]
    Parse(#[from] DeserializeError),

    /// A parameter cannot be encoded; nothing was sent.
    #[error("invalid parameter: {0}")]
    Param(#[from] ValueError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid url {0:?}")]
    InvalidUrl(String),

    #[error("unsupported scheme {0:?}, only http is supported")]
    UnsupportedScheme(String),
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("http server error: {0}")]
    Http(#[from] hyper::Error),
}

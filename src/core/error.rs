//! Purpose: Single error type shared by the session client, config store, and CLI.
//! Exports: `Error`, `ErrorKind`, `ApiResult`, `to_exit_code`, `operation_failed`.
//! Role: Builder-style error carrying kind, message, path, hint, and source chain.
//! Invariants: Exit codes per kind are stable once published.
//! Invariants: `OperationFailed` always wraps another `Error` as its source.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Transport,
    Protocol,
    Corrupt,
    Io,
    OperationFailed,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    hint: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            hint: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Kind of the innermost wrapped `Error`, looking through `OperationFailed`.
    pub fn root_kind(&self) -> ErrorKind {
        if self.kind != ErrorKind::OperationFailed {
            return self.kind;
        }
        self.source
            .as_ref()
            .and_then(|source| source.downcast_ref::<Error>())
            .map(Error::root_kind)
            .unwrap_or(ErrorKind::Internal)
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Wrap `cause` as the uniform failure of a caller-facing operation.
///
/// `operation` reads as a gerund phrase, e.g. "listing videorooms".
pub fn operation_failed(operation: &str, cause: Error) -> Error {
    let hint = cause.hint.clone();
    let mut err = Error::new(ErrorKind::OperationFailed)
        .with_message(format!("error encountered while {operation}: {cause}"));
    if let Some(hint) = hint {
        err = err.with_hint(hint);
    }
    err.with_source(cause)
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Transport => 4,
        ErrorKind::Protocol => 5,
        ErrorKind::Corrupt => 6,
        ErrorKind::Io => 7,
        ErrorKind::OperationFailed => 1,
    }
}

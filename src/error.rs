//! Error types for the configuration plane.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfError>;

/// Errors raised while loading, watching or publishing configuration.
///
/// `Policy` errors indicate a programmer/operator invariant was violated
/// (double registration, a path escaping the configured root) and are not
/// meant to be recovered from at the call site that raised them — they are
/// expected to propagate out of `main` or an init routine. Every other
/// variant is handled locally: a bad segment or file falls back to its
/// last-good value and is reported via `failed_load`, never surfaced as an
/// error from a reader-facing `get()`.
#[derive(Error, Debug)]
pub enum ConfError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("parse error in {path}:{line}: {message}")]
    Parse {
        path: String,
        line: u32,
        message: String,
    },

    #[error("allocation failed")]
    OutOfMemory,

    #[error("policy violation: {0}")]
    Policy(String),

    #[error("event queue overflow for {0}")]
    Overflow(String),
}

impl ConfError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        ConfError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        ConfError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Whether this error represents a fatal programmer/operator mistake
    /// rather than something a single reload can recover from locally.
    pub fn is_policy(&self) -> bool {
        matches!(self, ConfError::Policy(_))
    }
}

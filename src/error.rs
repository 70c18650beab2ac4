use std::fmt;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// Placeholder used in diagnostics when a chain field is absent
pub const MISSING_FIELD: &str = "<missing>";

/// Expected value reported when the first record declares no usable genesis
pub const GENESIS_REQUIRED: &str = "<genesis string>";

impl From<serde_json::Error> for EncodingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unrepresentable(err.to_string())
    }
}

/// Failure of the canonical encoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("record must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("value is not representable as canonical JSON: {0}")]
    Unrepresentable(String),
}

/// Kind of a chain verification failure, without its details
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    PrevHashMismatch,
    HashMismatch,
    EncodingError,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ParseError => "parse error",
            ErrorKind::PrevHashMismatch => "prevHash mismatch",
            ErrorKind::HashMismatch => "hash mismatch",
            ErrorKind::EncodingError => "encoding error",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(name)
    }
}

/// Chain verification failure. Every variant except `Io` carries the
/// 1-based physical line number of the offending record.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Line {line}: parse error ({reason}): {raw}")]
    Parse {
        line: usize,
        raw: String,
        reason: String,
    },

    #[error("Line {line}: prevHash mismatch (expected {expected}, got {actual})")]
    PrevHashMismatch {
        line: usize,
        expected: String,
        actual: String,
    },

    #[error("Line {line}: hash mismatch (expected {expected}, got {actual})")]
    HashMismatch {
        line: usize,
        expected: String,
        actual: String,
    },

    #[error("Line {line}: {source}")]
    Encoding {
        line: usize,
        #[source]
        source: EncodingError,
    },

    #[error("Failed to read audit log {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Parse { .. } => ErrorKind::ParseError,
            ChainError::PrevHashMismatch { .. } => ErrorKind::PrevHashMismatch,
            ChainError::HashMismatch { .. } => ErrorKind::HashMismatch,
            ChainError::Encoding { .. } => ErrorKind::EncodingError,
            ChainError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Line of the failing record, `None` for I/O failures
    pub fn line(&self) -> Option<usize> {
        match self {
            ChainError::Parse { line, .. }
            | ChainError::PrevHashMismatch { line, .. }
            | ChainError::HashMismatch { line, .. }
            | ChainError::Encoding { line, .. } => Some(*line),
            ChainError::Io { .. } => None,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn prev_hash_mismatch(line: usize, expected: &str, actual: Option<&Value>) -> Self {
        Self::PrevHashMismatch {
            line,
            expected: expected.to_string(),
            actual: render_field(actual),
        }
    }

    pub fn hash_mismatch(line: usize, expected: &str, actual: Option<&Value>) -> Self {
        Self::HashMismatch {
            line,
            expected: expected.to_string(),
            actual: render_field(actual),
        }
    }
}

/// Render a chain field for diagnostics: strings bare, other JSON compact
pub fn render_field(value: Option<&Value>) -> String {
    match value {
        None => MISSING_FIELD.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

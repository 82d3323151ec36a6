// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when parsing a vendor transcript file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Transcript file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Permission denied reading file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid outer JSON in {path}: {message}")]
    InvalidJson { path: PathBuf, message: String },
}

impl ParseError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_io_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = ParseError::io("/test/path.jsonl", io_err);
        assert!(matches!(err, ParseError::NotFound { .. }));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ParseError::io("/test/path.jsonl", io_err);
        assert!(matches!(err, ParseError::PermissionDenied { .. }));

        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
        let err = ParseError::io("/test/path.jsonl", io_err);
        assert!(matches!(err, ParseError::Io { .. }));
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::NotFound {
            path: PathBuf::from("/x/y.jsonl"),
        };
        assert!(err.to_string().contains("/x/y.jsonl"));
        assert!(err.to_string().contains("not found"));
    }
}

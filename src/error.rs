//! Error types for calcsql.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// The main error type for conversion operations.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The input is not well-formed XML.
    #[error("XML error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// Reading or writing a file failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input file has an extension that is not converted.
    #[error("Unsupported file extension: '{}'. Expected one of: {expected}", path.display())]
    InvalidExtension { path: PathBuf, expected: String },

    /// Input path does not exist.
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConvertError {
    /// Create an XML error at the given byte offset.
    pub fn xml(position: u64, message: impl Into<String>) -> Self {
        Self::Xml {
            position,
            message: message.into(),
        }
    }

    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Result type alias for conversion operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_error_display() {
        let err = ConvertError::xml(42, "unexpected end of input");
        assert_eq!(err.to_string(), "XML error at byte 42: unexpected end of input");
    }

    #[test]
    fn test_extension_error_display() {
        let err = ConvertError::InvalidExtension {
            path: PathBuf::from("view.txt"),
            expected: ".xml, .calculationview".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported file extension: 'view.txt'. Expected one of: .xml, .calculationview"
        );
    }
}

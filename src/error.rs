//! Error types for zipstream

use std::io;

/// Result type for zipstream operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Error types that can occur during ZIP operations
#[derive(Debug)]
pub enum ZipError {
    /// I/O error from the source stream or the sink
    Io(io::Error),
    /// Invalid ZIP format or structure
    BadFormat(String),
    /// An entry with this name was already written to the archive
    DuplicateName(String),
    /// Entry not found in ZIP archive
    EntryNotFound(String),
    /// Unsupported compression method
    UnsupportedCompression(u16),
}

impl std::fmt::Display for ZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipError::Io(e) => write!(f, "I/O error: {}", e),
            ZipError::BadFormat(msg) => write!(f, "Invalid ZIP format: {}", msg),
            ZipError::DuplicateName(name) => write!(f, "Duplicate entry name: {}", name),
            ZipError::EntryNotFound(name) => write!(f, "Entry not found: {}", name),
            ZipError::UnsupportedCompression(method) => {
                write!(f, "Unsupported compression method: {}", method)
            }
        }
    }
}

impl std::error::Error for ZipError {}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        ZipError::Io(err)
    }
}

//! Error types for the locdb library

use thiserror::Error;

/// Result type alias for locdb operations
pub type Result<T> = std::result::Result<T, LocError>;

/// Main error type for building and querying location databases
///
/// An absent record is not an error: lookups return `Ok(None)` for that.
#[derive(Debug, Error)]
pub enum LocError {
    /// Network string could not be parsed or its prefix is out of range
    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    /// Address string could not be parsed
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Country code is not two ASCII letters
    #[error("Invalid country code: {0}")]
    InvalidCountryCode(String),

    /// A record does not fit its fixed-width on-disk slot
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Bad magic bytes or unsupported format version
    #[error("Format error: {0}")]
    Format(String),

    /// Section offsets or record indexes are inconsistent with the file
    #[error("Corrupt database: {0}")]
    Corrupt(String),

    /// Signature missing or not matching the payload
    #[error("Signature error: {0}")]
    Signature(String),

    /// Signing or verifying key could not be loaded
    #[error("Key error: {0}")]
    Key(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LocError {
    /// True for errors raised while reading a malformed or truncated file
    pub fn is_corruption(&self) -> bool {
        matches!(self, LocError::Format(_) | LocError::Corrupt(_))
    }
}

//! # Error Types
//!
//! Errors raised while producing or parsing the values in this crate.
//! All errors use `thiserror` for derive-based `Display` and `Error`
//! implementations.

use thiserror::Error;

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Their JCS number rendering has edge cases that break determinism.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error parsing a digest from its hex or binary form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestParseError {
    /// The input did not have the expected length.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length in bytes.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// The input contained a non-hex character.
    #[error("invalid hex character {character:?} at offset {offset}")]
    InvalidHex {
        /// The offending character.
        character: char,
        /// Byte offset of the character in the input string.
        offset: usize,
    },
}

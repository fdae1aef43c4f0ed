//! Error types for encoding operations.

use std::error::Error;
use std::fmt;

/// Result type for encoding operations.
pub type EncodingResult<T> = Result<T, EncodingError>;

/// Errors that can occur while encoding a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Invalid field value that cannot be encoded.
    InvalidFieldValue {
        /// Name of the field with the invalid value.
        field: &'static str,
        /// String representation of the invalid value.
        value: String,
    },

    /// The command body wrote a different number of bytes than its size
    /// calculation announced.
    CommandLengthMismatch {
        /// Bytes announced by the size calculation.
        expected: usize,
        /// Bytes actually written.
        actual: usize,
    },

    /// The section would exceed the maximum PSI section length.
    SectionOverflow {
        /// Computed section_length value.
        section_length: usize,
        /// Maximum allowed section_length.
        max: usize,
    },
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingError::InvalidFieldValue { field, value } => {
                write!(f, "Invalid field value: {} = {}", field, value)
            }
            EncodingError::CommandLengthMismatch { expected, actual } => {
                write!(
                    f,
                    "Command body length mismatch: computed {} bytes, wrote {}",
                    expected, actual
                )
            }
            EncodingError::SectionOverflow {
                section_length,
                max,
            } => {
                write!(
                    f,
                    "Section length {} exceeds maximum {}",
                    section_length, max
                )
            }
        }
    }
}

impl Error for EncodingError {}

//! Error types for the ROM analyzer.
//!
//! Every fallible operation in the crate returns one of the kinds below.
//! Missing structures are not errors: the recovery pipeline records them
//! as unknown and keeps going. Errors are reserved for conditions the
//! caller has to act on.

use thiserror::Error;

/// Primary error type for ROM analysis.
#[derive(Debug, Error)]
pub enum RomError {
    /// IO error while reading the image file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image size outside the accepted window or not a multiple of 4.
    #[error("unlikely image size {size} bytes: expected a multiple of 4 in {min}..={max}")]
    InputBounds {
        size: usize,
        min: usize,
        max: usize,
    },

    /// A search failed to locate its anchor.
    #[error("{what} not found")]
    NotFound { what: &'static str },

    /// FID CPU string does not match any catalog entry.
    #[error("unknown FID CPU tag {tag:?}: cannot select a ROM type")]
    UnknownFidType { tag: String },

    /// The checksum correction solver exhausted the mangler range.
    #[error("checksum correction infeasible: mangler exhausted at {mang:#010X}")]
    Infeasible { mang: u32 },

    /// Recovered offsets violate a structural invariant.
    #[error("malformed structure: {message}")]
    Malformed { message: String },
}

impl RomError {
    /// Shorthand for a [`RomError::Malformed`] with a formatted message.
    pub fn malformed(message: impl Into<String>) -> Self {
        RomError::Malformed {
            message: message.into(),
        }
    }
}

/// Result type alias for analyzer operations.
pub type Result<T> = std::result::Result<T, RomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_bounds_display() {
        let err = RomError::InputBounds {
            size: 100,
            min: 128 * 1024,
            max: 2048 * 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("131072"));
    }

    #[test]
    fn test_unknown_fidtype_display() {
        let err = RomError::UnknownFidType {
            tag: "SH9999Z ".into(),
        };
        assert!(err.to_string().contains("SH9999Z"));
    }

    #[test]
    fn test_infeasible_display() {
        let err = RomError::Infeasible { mang: 1 };
        assert!(err.to_string().contains("0x00000001"));
    }
}

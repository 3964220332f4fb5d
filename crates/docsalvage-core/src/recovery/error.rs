/// Error taxonomy shared by every recovery stage
///
/// None of these are fatal on their own: each one either moves the
/// orchestrator to its next strategy or is logged against a single member.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryError {
    /// Bad compound-file magic or an oversized sector exponent
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// A computed slice runs past the end of the buffer
    #[error("Truncated data: {0}")]
    TruncatedData(String),

    /// Payload could not be decoded and was passed through unchanged
    #[error("Decompression failure: {0}")]
    DecompressionFailure(String),

    /// Recovered bytes do not match the declared CRC-32
    #[error("Checksum mismatch for {name}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    /// Checksum could not be verified (payload was not decoded)
    #[error("Checksum not verified for {name}: {reason}")]
    ChecksumUnverified { name: String, reason: String },

    /// Member name would be written outside the output root
    #[error("Unsafe member path rejected: {0}")]
    UnsafePath(String),

    /// Writing a recovered member failed
    #[error("IO error: {0}")]
    Io(String),

    /// Every strategy finished without extracting a member
    #[error("No recoverable data found after all recovery strategies")]
    NoRecoverableData,
}

impl RecoveryError {
    /// Short upper-case tag used in plain-text extraction logs
    pub fn tag(&self) -> &'static str {
        match self {
            RecoveryError::MalformedHeader(_) => "MALFORMED_HEADER",
            RecoveryError::TruncatedData(_) => "TRUNCATED_DATA",
            RecoveryError::DecompressionFailure(_) => "DECOMPRESSION_FAILURE",
            RecoveryError::ChecksumMismatch { .. } => "CHECKSUM_ERROR",
            RecoveryError::ChecksumUnverified { .. } => "CHECKSUM_WARNING",
            RecoveryError::UnsafePath(_) => "UNSAFE_PATH",
            RecoveryError::Io(_) => "IO_ERROR",
            RecoveryError::NoRecoverableData => "NO_RECOVERABLE_DATA",
        }
    }
}

impl From<std::io::Error> for RecoveryError {
    fn from(error: std::io::Error) -> Self {
        RecoveryError::Io(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RecoveryError::ChecksumMismatch {
            name: "a.txt".to_string(),
            expected: 0xdeadbeef,
            actual: 0x1,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch for a.txt: expected deadbeef, got 00000001"
        );
        assert_eq!(err.tag(), "CHECKSUM_ERROR");
    }

    #[test]
    fn test_error_serializes_with_kind_tag() {
        let json = serde_json::to_string(&RecoveryError::NoRecoverableData).unwrap();
        assert_eq!(json, r#"{"kind":"NO_RECOVERABLE_DATA"}"#);

        let json = serde_json::to_string(&RecoveryError::TruncatedData("x".into())).unwrap();
        assert_eq!(json, r#"{"kind":"TRUNCATED_DATA","detail":"x"}"#);
    }
}

/// Container formats the recovery pipeline reads
pub mod cfb;
pub mod common;

use serde::{Deserialize, Serialize};

use common::MagicDetector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    /// OLE compound file
    CompoundFile,
    /// Bare envelope (marker at offset 0)
    Envelope,
    /// Starts with a local file header
    ZipStream,
    Unknown,
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::CompoundFile => write!(f, "OLE compound file"),
            ContainerKind::Envelope => write!(f, "LZMA2 envelope"),
            ContainerKind::ZipStream => write!(f, "ZIP stream"),
            ContainerKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify a buffer by its leading bytes
pub fn detect_container(data: &[u8]) -> ContainerKind {
    if cfb::is_compound_file(data) {
        ContainerKind::CompoundFile
    } else if crate::codec::has_marker(data) {
        ContainerKind::Envelope
    } else if data.starts_with(&MagicDetector::ZIP_LOCAL) {
        ContainerKind::ZipStream
    } else {
        ContainerKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_container() {
        assert_eq!(
            detect_container(&MagicDetector::COMPOUND_FILE),
            ContainerKind::CompoundFile
        );
        assert_eq!(detect_container(b"\x0c\x00\x00\x00rest"), ContainerKind::Envelope);
        assert_eq!(detect_container(b"PK\x03\x04"), ContainerKind::ZipStream);
        assert_eq!(detect_container(b""), ContainerKind::Unknown);
    }
}

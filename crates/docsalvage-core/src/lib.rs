use anyhow::Result;
use std::path::Path;

pub mod analysis;
pub mod archive;
pub mod codec;
pub mod container;
pub mod forensics;
pub mod recovery;

// Re-export key recovery types
pub use analysis::{analyze, AnalysisOptions, AnalysisReport};
pub use archive::{ArchiveReconstructor, DirectorySink, MemorySink, OutputSink};
pub use codec::{decode, encode, CodecOptions, DecodeOutcome};
pub use container::cfb::read_named_stream;
pub use container::common::InputImage;
pub use recovery::{
    extract_stream, extract_stream_file, recover_batch, BatchReport, ChecksumStatus, Issue,
    RecoveredMember, RecoveryConfig, RecoveryEngine, RecoveryError, RecoveryProgress,
    RecoveryResult, RecoveryStage, RecoveryStatistics, RecoveryStrategy, DEFAULT_STREAM_NAME,
};

/// File extensions picked up when recovering a whole directory
pub const SUPPORTED_EXTENSIONS: &[&str] = &["ac_", "ac", "bin"];

/// Whether a path carries one of the supported archive extensions
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Recover members from an in-memory archive into `output_dir`.
///
/// Never fails outward: the result carries a success flag and an issue log.
pub fn recover(input: &[u8], output_dir: &Path, stream_name: Option<&str>) -> RecoveryResult {
    let config = RecoveryConfig {
        stream_name: stream_name.unwrap_or(DEFAULT_STREAM_NAME).to_string(),
        ..RecoveryConfig::default()
    };
    RecoveryEngine::new(config).recover_to_dir(input, output_dir)
}

/// Recover members from an archive file.
///
/// Output defaults to `<input dir>/recovered/<input stem>`. Errors only when
/// the input cannot be opened or the output directory cannot be created.
pub fn recover_file(
    path: &Path,
    output_dir: Option<&Path>,
    stream_name: Option<&str>,
) -> Result<RecoveryResult> {
    let config = RecoveryConfig {
        stream_name: stream_name.unwrap_or(DEFAULT_STREAM_NAME).to_string(),
        ..RecoveryConfig::default()
    };
    RecoveryEngine::new(config).recover_file(path, output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_input(Path::new("a/File.AC_")));
        assert!(is_supported_input(Path::new("stream.bin")));
        assert!(!is_supported_input(Path::new("notes.txt")));
        assert!(!is_supported_input(Path::new("noext")));
    }
}

/// Recovery orchestrator: ordered fallback strategies over one input buffer
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::RecoveryError;
use super::report::write_extraction_log;
use super::result::{Issue, RecoveryResult};
use crate::archive::{
    local_header_offsets, ArchiveReconstructor, DirectorySink, ExtractOptions, OutputSink,
    ReconstructionReport,
};
use crate::codec;
use crate::container::cfb::{CompoundFile, DEFAULT_MAX_DIRECTORY_SECTORS};
use crate::container::common::InputImage;

/// Name of the stream holding the compressed inner archive
pub const DEFAULT_STREAM_NAME: &str = "CasewareDocument";

/// Recovery engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Compound-file stream to read in the structured strategy
    pub stream_name: String,
    /// Strategies attempted in order until one extracts a member
    pub strategies: Vec<RecoveryStrategy>,
    pub extract: ExtractOptions,
    /// Bound on directory sectors scanned in the compound file
    pub max_directory_sectors: usize,
    /// Write `<stem>_extraction_log.txt` when the issue log is non-empty
    pub write_extraction_log: bool,
    /// Worker threads for batch recovery (rayon default when unset)
    pub threads: Option<usize>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            strategies: vec![
                RecoveryStrategy::StructuredStream,
                RecoveryStrategy::DirectScan,
                RecoveryStrategy::SignatureSeek,
            ],
            extract: ExtractOptions::default(),
            max_directory_sectors: DEFAULT_MAX_DIRECTORY_SECTORS,
            write_extraction_log: true,
            threads: None,
        }
    }
}

impl RecoveryConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Compound-file stream, decoded, then scanned
    StructuredStream,
    /// Scan the raw input for local headers
    DirectScan,
    /// Retry the scan from each local header signature in turn
    SignatureSeek,
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryStrategy::StructuredStream => write!(f, "structured stream"),
            RecoveryStrategy::DirectScan => write!(f, "direct scan"),
            RecoveryStrategy::SignatureSeek => write!(f, "signature seek"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryProgress {
    pub stage: RecoveryStage,
    pub progress_percent: f32,
    pub members_found: u64,
    pub bytes_processed: u64,
    pub current_operation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    Initialization,
    Strategy(RecoveryStrategy),
    Complete,
}

/// Single-archive recovery engine
pub struct RecoveryEngine {
    config: RecoveryConfig,
    reconstructor: ArchiveReconstructor,
    progress_callback: Option<Box<dyn Fn(RecoveryProgress) + Send + Sync>>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

impl RecoveryEngine {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            reconstructor: ArchiveReconstructor::new(config.extract.clone()),
            config,
            progress_callback: None,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(RecoveryProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    fn emit_progress(&self, progress: RecoveryProgress) {
        if let Some(callback) = &self.progress_callback {
            callback(progress);
        }
    }

    /// Recover from a file. Output defaults to `<input dir>/recovered/<stem>`.
    pub fn recover_file(&self, path: &Path, output_dir: Option<&Path>) -> Result<RecoveryResult> {
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_output_dir(path),
        };

        let image = InputImage::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        tracing::info!(
            "Processing {} ({} bytes) -> {}",
            path.display(),
            image.size(),
            output_dir.display()
        );

        let mut sink = DirectorySink::new(&output_dir);
        let mut result = self.recover(&image, &mut sink, &output_dir);
        result.source = Some(path.to_path_buf());

        let stem = file_stem(path);
        self.finalize_log(&result, &stem);
        Ok(result)
    }

    /// Recover from a buffer into a directory
    pub fn recover_to_dir(&self, input: &[u8], output_dir: &Path) -> RecoveryResult {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            tracing::warn!("Cannot create output directory {}: {}", output_dir.display(), e);
            return RecoveryResult::unreadable(
                output_dir,
                input.len() as u64,
                RecoveryError::from(e),
            );
        }

        let mut sink = DirectorySink::new(output_dir);
        let result = self.recover(input, &mut sink, output_dir);

        let stem = output_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recovery".to_string());
        self.finalize_log(&result, &stem);
        result
    }

    fn finalize_log(&self, result: &RecoveryResult, stem: &str) {
        if !self.config.write_extraction_log || result.issues.is_empty() {
            return;
        }
        match write_extraction_log(result, stem) {
            Ok(path) => tracing::info!("📝 Extraction log written: {}", path.display()),
            Err(e) => tracing::warn!("Failed to write extraction log: {}", e),
        }
    }

    /// Run the configured strategies against `input`, writing through `sink`
    pub fn recover(
        &self,
        input: &[u8],
        sink: &mut dyn OutputSink,
        output_dir: &Path,
    ) -> RecoveryResult {
        let mut result = RecoveryResult::begin(output_dir, input.len() as u64);

        self.emit_progress(RecoveryProgress {
            stage: RecoveryStage::Initialization,
            progress_percent: 0.0,
            members_found: 0,
            bytes_processed: 0,
            current_operation: "Initializing recovery engine...".to_string(),
        });

        // Strategies overlap on the same bytes, so failures are not summed across them
        let mut members_failed = 0;
        let strategies = &self.config.strategies;
        for (i, &strategy) in strategies.iter().enumerate() {
            tracing::info!("Method {}: {}", i + 1, strategy);
            self.emit_progress(RecoveryProgress {
                stage: RecoveryStage::Strategy(strategy),
                progress_percent: (i as f32 / strategies.len() as f32) * 100.0,
                members_found: 0,
                bytes_processed: input.len() as u64,
                current_operation: format!("Running {}", strategy),
            });

            let report = match strategy {
                RecoveryStrategy::StructuredStream => {
                    self.run_structured_stream(input, sink, &mut result)
                }
                RecoveryStrategy::DirectScan => self.reconstructor.reconstruct(input, sink),
                RecoveryStrategy::SignatureSeek => self.run_signature_seek(input, sink),
            };

            let failed = report.members_failed;
            let extracted = absorb_report(&mut result, report, strategy);
            if extracted > 0 {
                members_failed = failed;
                result.strategy = Some(strategy);
                tracing::info!("{} extracted {} member(s)", strategy, extracted);
                break;
            }
            members_failed = members_failed.max(failed);
        }

        result.statistics.members_failed = members_failed;
        result.finish();

        if result.success {
            tracing::info!(
                "✅ Recovered {} member(s), {} bytes",
                result.members.len(),
                result.statistics.total_size_out
            );
        } else {
            tracing::warn!("❌ No recoverable data found");
            result
                .issues
                .push(Issue::new(RecoveryError::NoRecoverableData));
        }

        self.emit_progress(RecoveryProgress {
            stage: RecoveryStage::Complete,
            progress_percent: 100.0,
            members_found: result.members.len() as u64,
            bytes_processed: input.len() as u64,
            current_operation: "Recovery complete".to_string(),
        });

        result
    }

    fn run_structured_stream(
        &self,
        input: &[u8],
        sink: &mut dyn OutputSink,
        result: &mut RecoveryResult,
    ) -> ReconstructionReport {
        let strategy = RecoveryStrategy::StructuredStream;

        let file = match CompoundFile::parse(input) {
            Ok(file) => file.with_directory_limit(self.config.max_directory_sectors),
            Err(e) => {
                tracing::debug!("Compound file parsing failed: {}", e);
                result.issues.push(Issue::new(e).during(strategy));
                return ReconstructionReport::default();
            }
        };

        let Some(located) = file.extract_named(&self.config.stream_name) else {
            tracing::info!("Stream '{}' not found", self.config.stream_name);
            return ReconstructionReport::default();
        };

        if located.is_truncated() {
            result.issues.push(
                Issue::new(RecoveryError::TruncatedData(format!(
                    "stream '{}' holds {} of {} declared bytes",
                    located.entry.name,
                    located.data.len(),
                    located.entry.stream_size
                )))
                .during(strategy),
            );
        }

        let decoded = codec::decode_with(&located.data, &self.config.extract.codec);
        if let Some(failure) = decoded.failure.clone() {
            tracing::warn!("Stream not decoded, scanning raw bytes: {}", failure);
            result.issues.push(Issue::new(failure).during(strategy));
        }

        self.reconstructor.reconstruct(&decoded.data, sink)
    }

    fn run_signature_seek(&self, input: &[u8], sink: &mut dyn OutputSink) -> ReconstructionReport {
        let offsets = local_header_offsets(input);
        tracing::debug!("Trying {} local header offsets", offsets.len());

        for offset in offsets {
            let mut report = self.reconstructor.reconstruct(&input[offset..], sink);
            if report.members.is_empty() {
                continue;
            }

            tracing::info!("ZIP data found at offset {}", offset);
            for member in &mut report.members {
                member.header_offset += offset as u64;
            }
            for issue in &mut report.issues {
                if let Some(at) = issue.offset.as_mut() {
                    *at += offset as u64;
                }
            }
            return report;
        }

        ReconstructionReport::default()
    }
}

/// Fold one strategy's report into the result; returns members extracted
fn absorb_report(
    result: &mut RecoveryResult,
    report: ReconstructionReport,
    strategy: RecoveryStrategy,
) -> u64 {
    let extracted = report.members_extracted();
    let stats = &mut result.statistics;
    stats.members_extracted += extracted;
    stats.checksum_errors += report.checksum_errors;
    stats.checksum_warnings += report.checksum_warnings;
    stats.total_size_out += report.bytes_written;

    result
        .issues
        .extend(report.issues.into_iter().map(|issue| issue.during(strategy)));
    result.members.extend(report.members);
    extracted
}

/// `<input dir>/recovered/<input stem>`
pub fn default_output_dir(input: &Path) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    parent.join("recovered").join(file_stem(input))
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemorySink;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_default_config() {
        let config = RecoveryConfig::default();
        assert_eq!(config.stream_name, "CasewareDocument");
        assert_eq!(config.strategies.len(), 3);
        assert_eq!(config.strategies[0], RecoveryStrategy::StructuredStream);
        assert_eq!(config.max_directory_sectors, 10);
    }

    #[test]
    fn test_partial_config_json() {
        let config: RecoveryConfig =
            serde_json::from_str(r#"{"strategies": ["direct_scan"], "stream_name": "Other"}"#)
                .unwrap();
        assert_eq!(config.strategies, vec![RecoveryStrategy::DirectScan]);
        assert_eq!(config.stream_name, "Other");
        assert!(config.write_extraction_log);
    }

    #[test]
    fn test_default_output_dir() {
        assert_eq!(
            default_output_dir(Path::new("/data/in/File.ac_")),
            PathBuf::from("/data/in/recovered/File")
        );
    }

    #[test]
    fn test_progress_stages() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stages);

        let mut engine = RecoveryEngine::default();
        engine.set_progress_callback(move |p| seen.lock().unwrap().push(p.stage));

        let mut sink = MemorySink::new();
        let result = engine.recover(b"nothing here", &mut sink, Path::new("out"));
        assert!(!result.success);

        let stages = stages.lock().unwrap();
        assert_eq!(stages.first(), Some(&RecoveryStage::Initialization));
        assert_eq!(stages.last(), Some(&RecoveryStage::Complete));
        assert_eq!(stages.len(), 5);
    }

    #[test]
    fn test_uncreatable_output_dir_keeps_input_size() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let input = vec![0u8; 1234];
        let result = RecoveryEngine::default().recover_to_dir(&input, &blocker.join("out"));

        assert!(!result.success);
        assert_eq!(result.statistics.total_size_in, 1234);
        assert_eq!(result.statistics.files_failed, 1);
        assert!(matches!(result.failure, Some(RecoveryError::Io(_))));
    }
}

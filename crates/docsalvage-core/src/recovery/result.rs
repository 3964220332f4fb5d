/// Recovery results and statistics
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::engine::RecoveryStrategy;
use super::error::RecoveryError;
use crate::archive::CompressionMethod;
use crate::forensics::{verify_file_integrity, MemberDigest, VerificationResult};

/// Outcome of the CRC-32 check for one member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChecksumStatus {
    Verified,
    Mismatch { expected: u32, actual: u32 },
    /// Header declared a zero CRC
    NotRecorded,
    /// Payload was not decoded, so the check was skipped
    Unverified,
}

impl ChecksumStatus {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, ChecksumStatus::Mismatch { .. })
    }
}

/// A member written to the output sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveredMember {
    pub name: String,
    pub output_path: PathBuf,
    /// Bytes written
    pub size: u64,
    pub compressed_size: u64,
    pub method: CompressionMethod,
    pub checksum: ChecksumStatus,
    pub digest: MemberDigest,
    /// Offset of the local header in the scanned buffer
    pub header_offset: u64,
}

/// One entry of the issue log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub error: RecoveryError,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RecoveryStrategy>,
}

impl Issue {
    pub fn new(error: RecoveryError) -> Self {
        Self {
            error,
            member: None,
            offset: None,
            strategy: None,
        }
    }

    pub fn for_member(error: RecoveryError, member: impl Into<String>, offset: u64) -> Self {
        Self {
            error,
            member: Some(member.into()),
            offset: Some(offset),
            strategy: None,
        }
    }

    pub fn at_offset(error: RecoveryError, offset: u64) -> Self {
        Self {
            offset: Some(offset),
            ..Self::new(error)
        }
    }

    pub fn during(mut self, strategy: RecoveryStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error.tag(), self.error)?;
        if let Some(offset) = self.offset {
            write!(f, " (offset {})", offset)?;
        }
        Ok(())
    }
}

/// Counters for one or more archives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStatistics {
    pub files_processed: u64,
    pub files_extracted: u64,
    pub files_failed: u64,
    pub members_extracted: u64,
    pub members_failed: u64,
    pub checksum_errors: u64,
    pub checksum_warnings: u64,
    pub total_size_in: u64,
    pub total_size_out: u64,
}

impl RecoveryStatistics {
    /// Add another run's counters to these
    pub fn merge(&mut self, other: &RecoveryStatistics) {
        self.files_processed += other.files_processed;
        self.files_extracted += other.files_extracted;
        self.files_failed += other.files_failed;
        self.members_extracted += other.members_extracted;
        self.members_failed += other.members_failed;
        self.checksum_errors += other.checksum_errors;
        self.checksum_warnings += other.checksum_warnings;
        self.total_size_in += other.total_size_in;
        self.total_size_out += other.total_size_out;
    }

    pub fn success_rate(&self) -> f32 {
        if self.files_processed == 0 {
            0.0
        } else {
            self.files_extracted as f32 / self.files_processed as f32
        }
    }
}

/// Result of recovering one archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub run_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub success: bool,
    /// Strategy that extracted the members
    pub strategy: Option<RecoveryStrategy>,
    pub members: Vec<RecoveredMember>,
    pub statistics: RecoveryStatistics,
    pub issues: Vec<Issue>,
    /// Terminal failure when nothing was recovered
    pub failure: Option<RecoveryError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RecoveryResult {
    /// Empty result for a run that is about to start
    pub fn begin(output_dir: impl Into<PathBuf>, input_size: u64) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            source: None,
            output_dir: output_dir.into(),
            success: false,
            strategy: None,
            members: Vec::new(),
            statistics: RecoveryStatistics {
                files_processed: 1,
                total_size_in: input_size,
                ..RecoveryStatistics::default()
            },
            issues: Vec::new(),
            failure: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Result for an input that could not even be read
    pub fn unreadable(
        output_dir: impl Into<PathBuf>,
        input_size: u64,
        error: RecoveryError,
    ) -> Self {
        let mut result = Self::begin(output_dir, input_size);
        result.issues.push(Issue::new(error.clone()));
        result.failure = Some(error);
        result.finish();
        result
    }

    /// Settle the success flag and archive-level counters
    pub fn finish(&mut self) {
        self.success = !self.members.is_empty();
        if self.success {
            self.statistics.files_extracted = 1;
            self.statistics.files_failed = 0;
            self.failure = None;
        } else {
            self.statistics.files_extracted = 0;
            self.statistics.files_failed = 1;
            if self.failure.is_none() {
                self.failure = Some(RecoveryError::NoRecoverableData);
            }
        }
        self.finished_at = Utc::now();
    }

    pub fn checksum_mismatches(&self) -> impl Iterator<Item = &RecoveredMember> {
        self.members.iter().filter(|m| m.checksum.is_mismatch())
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Re-hash every written member and compare with its recorded digest
    pub fn verify_members(&self) -> VerificationResult {
        let verifications = self
            .members
            .iter()
            .map(|member| verify_file_integrity(&member.output_path, &member.digest))
            .collect();
        VerificationResult::from_verifications(verifications)
    }

    /// Export to JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Member extraction from local headers
use flate2::bufread::DeflateDecoder;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::Read;

use super::scanner::{CandidateMember, LocalHeaderScanner, ScanEvent};
use super::sink::OutputSink;
use super::structures::CompressionMethod;
use crate::codec::{self, CodecOptions};
use crate::forensics::{HashAlgorithm, MemberDigest};
use crate::recovery::{ChecksumStatus, Issue, RecoveredMember, RecoveryError};

/// Reconstructor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub codec: CodecOptions,
    pub digest: HashAlgorithm,
    /// Ceiling on a single inflated deflate member
    pub max_member_size: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            codec: CodecOptions::default(),
            digest: HashAlgorithm::MD5,
            max_member_size: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// What one pass over a buffer produced
#[derive(Debug, Clone, Default)]
pub struct ReconstructionReport {
    pub members: Vec<RecoveredMember>,
    pub issues: Vec<Issue>,
    pub members_failed: u64,
    pub checksum_errors: u64,
    pub checksum_warnings: u64,
    pub bytes_written: u64,
    /// Directory entries created (not counted as members)
    pub directories: u64,
    /// Scanning stopped at a truncated member
    pub truncated: bool,
}

impl ReconstructionReport {
    pub fn members_extracted(&self) -> u64 {
        self.members.len() as u64
    }
}

/// Decoded member payload
struct DecodedPayload<'a> {
    data: Cow<'a, [u8]>,
    failure: Option<RecoveryError>,
}

/// Extracts members from a byte stream using local headers only
#[derive(Debug, Clone, Default)]
pub struct ArchiveReconstructor {
    options: ExtractOptions,
}

impl ArchiveReconstructor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Extract every member reachable by signature scanning
    pub fn reconstruct(&self, data: &[u8], sink: &mut dyn OutputSink) -> ReconstructionReport {
        let mut report = ReconstructionReport::default();
        let scanner =
            LocalHeaderScanner::new(data).with_max_deferred_size(self.options.max_member_size);

        for event in scanner {
            match event {
                ScanEvent::Member(candidate) => self.extract_member(candidate, sink, &mut report),
                ScanEvent::Truncated { offset, detail } => {
                    tracing::warn!("Truncated data at offset {}: {}", offset, detail);
                    report.truncated = true;
                    report.issues.push(Issue::at_offset(
                        RecoveryError::TruncatedData(detail),
                        offset as u64,
                    ));
                }
            }
        }

        if !report.members.is_empty() {
            tracing::info!(
                "Local header extraction completed: {} files ({} checksum errors)",
                report.members.len(),
                report.checksum_errors
            );
        } else {
            tracing::debug!("No files extracted via local header scan");
        }

        report
    }

    fn extract_member(
        &self,
        candidate: CandidateMember<'_>,
        sink: &mut dyn OutputSink,
        report: &mut ReconstructionReport,
    ) {
        let offset = candidate.header_offset as u64;
        let name = candidate.name.clone();

        if candidate.is_directory() {
            match sink.create_directory(&name) {
                Ok(_) => report.directories += 1,
                Err(e) => {
                    tracing::warn!("Skipping directory '{}': {}", name, e);
                    report.issues.push(Issue::for_member(e, &name, offset));
                }
            }
            return;
        }

        let decoded = self.decode_payload(&candidate);
        if let Some(failure) = &decoded.failure {
            tracing::warn!("Storing raw bytes for '{}': {}", name, failure);
            report
                .issues
                .push(Issue::for_member(failure.clone(), &name, offset));
        }

        let checksum = match decoded.failure {
            Some(_) => {
                report.checksum_warnings += 1;
                report.issues.push(Issue::for_member(
                    RecoveryError::ChecksumUnverified {
                        name: name.clone(),
                        reason: "payload was not decoded".to_string(),
                    },
                    &name,
                    offset,
                ));
                ChecksumStatus::Unverified
            }
            None if candidate.expected_crc == 0 => ChecksumStatus::NotRecorded,
            None => {
                let actual = crc32fast::hash(&decoded.data);
                if actual == candidate.expected_crc {
                    ChecksumStatus::Verified
                } else {
                    tracing::warn!(
                        "Checksum mismatch for {}: expected {:08x}, got {:08x}",
                        name,
                        candidate.expected_crc,
                        actual
                    );
                    report.checksum_errors += 1;
                    report.issues.push(Issue::for_member(
                        RecoveryError::ChecksumMismatch {
                            name: name.clone(),
                            expected: candidate.expected_crc,
                            actual,
                        },
                        &name,
                        offset,
                    ));
                    ChecksumStatus::Mismatch {
                        expected: candidate.expected_crc,
                        actual,
                    }
                }
            }
        };

        match sink.write_member(&name, &decoded.data) {
            Ok(output_path) => {
                let digest = MemberDigest::of(&decoded.data, self.options.digest);
                let status_icon = if checksum.is_mismatch() { "⚠️" } else { "✅" };
                tracing::info!(
                    "{} Extracted: {} ({} bytes) [{}: {}...]",
                    status_icon,
                    name,
                    decoded.data.len(),
                    digest.algorithm.name(),
                    digest.short()
                );

                report.bytes_written += decoded.data.len() as u64;
                report.members.push(RecoveredMember {
                    name,
                    output_path,
                    size: decoded.data.len() as u64,
                    compressed_size: candidate.payload.len() as u64,
                    method: candidate.header.method,
                    checksum,
                    digest,
                    header_offset: offset,
                });
            }
            Err(e) => {
                tracing::warn!("❌ Failed to write '{}': {}", name, e);
                report.members_failed += 1;
                report.issues.push(Issue::for_member(e, name, offset));
            }
        }
    }

    fn decode_payload<'a>(&self, candidate: &CandidateMember<'a>) -> DecodedPayload<'a> {
        let payload = candidate.payload;

        match candidate.header.method {
            CompressionMethod::Stored => DecodedPayload {
                data: Cow::Borrowed(payload),
                failure: None,
            },
            CompressionMethod::Deflated => match inflate(payload, self.options.max_member_size) {
                Ok(data) => DecodedPayload {
                    data: Cow::Owned(data),
                    failure: None,
                },
                Err(e) => DecodedPayload {
                    data: Cow::Borrowed(payload),
                    failure: Some(RecoveryError::DecompressionFailure(format!(
                        "deflate: {}",
                        e
                    ))),
                },
            },
            CompressionMethod::Envelope => {
                let outcome = codec::decode_with(payload, &self.options.codec);
                DecodedPayload {
                    data: outcome.data,
                    failure: outcome.failure,
                }
            }
            CompressionMethod::Unknown(code) => DecodedPayload {
                data: Cow::Borrowed(payload),
                failure: Some(RecoveryError::DecompressionFailure(format!(
                    "unsupported compression method {}",
                    code
                ))),
            },
        }
    }
}

/// Inflate a raw deflate stream, bounded by `limit` output bytes
pub fn inflate(data: &[u8], limit: u64) -> std::io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    DeflateDecoder::new(data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut decoded)?;

    if decoded.len() as u64 > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("inflated size exceeds limit of {} bytes", limit),
        ));
    }

    Ok(decoded)
}

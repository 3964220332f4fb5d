/// Byte-level analysis of an input buffer
///
/// Read-only: nothing is written. The report explains why recovery did or
/// did not work on a given archive.
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::codec::{self, CodecOptions, EnvelopeBlock};
use crate::container::cfb::{CompoundFile, CompoundFileHeader, DirectoryEntry, EntryKind};
use crate::container::common::{find_all, find_from, MagicDetector};
use crate::container::{detect_container, ContainerKind};
use crate::recovery::{StreamSummary, DEFAULT_STREAM_NAME};

/// Offsets listed per signature before the list is cut short
pub const MAX_LISTED_OFFSETS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    pub stream_name: String,
    /// Bytes shown in the leading and trailing hex dumps
    pub hex_dump_bytes: usize,
    /// Envelope blocks trial-decoded
    pub max_envelopes: usize,
    pub codec: CodecOptions,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            hex_dump_bytes: 512,
            max_envelopes: 32,
            codec: CodecOptions::default(),
        }
    }
}

/// Occurrences of one signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureHits {
    pub name: String,
    pub count: usize,
    /// First few offsets, ascending
    pub offsets: Vec<usize>,
}

/// Envelope block with the outcome of a trial decode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeAnalysis {
    pub block: EnvelopeBlock,
    pub decoded_size: Option<usize>,
    pub decode_error: Option<String>,
    /// Decoded bytes start with a local header
    pub decoded_is_zip: bool,
    pub content_type: Option<String>,
}

/// Size comparison with a known-good reference file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceComparison {
    pub input_size: usize,
    pub reference_size: usize,
    pub size_ratio: f64,
    /// Offset of the input inside the reference when it is a contiguous subset
    pub subset_offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub size: usize,
    pub container: ContainerKind,
    pub signatures: Vec<SignatureHits>,
    pub header: Option<CompoundFileHeader>,
    pub header_error: Option<String>,
    pub directory: Vec<DirectoryEntry>,
    /// Named stream as read through the directory
    pub stream: Option<StreamSummary>,
    pub envelopes: Vec<EnvelopeAnalysis>,
    pub head_dump: String,
    pub tail_dump: String,
    pub reference: Option<ReferenceComparison>,
}

impl AnalysisReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Attach a comparison against a reference file
    pub fn compare_with(&mut self, input: &[u8], reference: &[u8]) {
        self.reference = Some(compare_with_reference(input, reference));
    }

    /// Human-readable rendering
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Size: {} bytes", self.size);
        let _ = writeln!(out, "Container: {}", self.container);

        let _ = writeln!(out, "\nSTRUCTURAL ANALYSIS");
        let _ = writeln!(out, "{}", "-".repeat(30));
        match (&self.header, &self.header_error) {
            (Some(header), _) => {
                let _ = writeln!(out, "Valid compound file header");
                let _ = writeln!(out, "  Sector size: {} bytes", header.sector_size);
                let _ = writeln!(out, "  Directory sectors: {}", header.number_of_directory_sectors);
                let _ = writeln!(out, "  FAT sectors: {}", header.number_of_fat_sectors);
                let _ = writeln!(out, "  First directory sector: {}", header.first_directory_sector);
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "No usable compound file header: {}", error);
            }
            (None, None) => {}
        }
        for entry in &self.directory {
            if entry.kind == EntryKind::Empty {
                continue;
            }
            let _ = writeln!(
                out,
                "  #{:<3} {:<32} {:?} start={} size={}",
                entry.id, entry.name, entry.kind, entry.start_sector, entry.stream_size
            );
        }
        if let Some(stream) = &self.stream {
            let _ = writeln!(
                out,
                "  Stream: {} bytes, envelope marker: {}, local header at: {:?}",
                stream.size, stream.has_envelope_marker, stream.zip_offset
            );
        }

        let _ = writeln!(out, "\nPATTERN SEARCH");
        let _ = writeln!(out, "{}", "-".repeat(30));
        for hits in &self.signatures {
            let _ = writeln!(
                out,
                "{}: {} occurrences at {:?}",
                hits.name, hits.count, hits.offsets
            );
            if hits.count > hits.offsets.len() {
                let _ = writeln!(out, "   ... and {} more", hits.count - hits.offsets.len());
            }
        }

        let _ = writeln!(out, "\nENVELOPES");
        let _ = writeln!(out, "{}", "-".repeat(30));
        for envelope in &self.envelopes {
            let outcome = match (&envelope.decoded_size, &envelope.decode_error) {
                (Some(size), _) => match &envelope.content_type {
                    Some(kind) => format!("decoded {} bytes ({})", size, kind),
                    None => format!("decoded {} bytes", size),
                },
                (None, Some(error)) => format!("not decoded: {}", error),
                (None, None) => "not decoded".to_string(),
            };
            let _ = writeln!(
                out,
                "Offset {}: {} byte payload, {}",
                envelope.block.offset, envelope.block.payload_length, outcome
            );
        }

        if let Some(reference) = &self.reference {
            let _ = writeln!(out, "\nSIZE COMPARISON");
            let _ = writeln!(out, "{}", "-".repeat(30));
            let _ = writeln!(out, "Input:     {} bytes", reference.input_size);
            let _ = writeln!(out, "Reference: {} bytes", reference.reference_size);
            let _ = writeln!(out, "Ratio:     {:.1}%", reference.size_ratio * 100.0);
            match reference.subset_offset {
                Some(offset) => {
                    let _ = writeln!(out, "Input found as subset at offset {}", offset);
                }
                None => {
                    let _ = writeln!(out, "Input not found as a contiguous subset");
                }
            }
        }

        let _ = writeln!(out, "\nHEX DUMP (head)");
        let _ = writeln!(out, "{}", self.head_dump);
        let _ = writeln!(out, "\nHEX DUMP (tail)");
        let _ = writeln!(out, "{}", self.tail_dump);
        out
    }
}

/// Classic 16-byte-per-line dump with an ASCII column
pub fn hex_dump(data: &[u8], base_offset: usize) -> String {
    let mut lines = Vec::with_capacity(data.len().div_ceil(16));
    for (i, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
            .collect();
        lines.push(format!(
            "{:08x}: {:<48} |{}|",
            base_offset + i * 16,
            hex.join(" "),
            ascii
        ));
    }
    lines.join("\n")
}

fn signature_hits(name: &str, data: &[u8], needle: &[u8]) -> SignatureHits {
    let offsets = find_all(data, needle, 0);
    SignatureHits {
        name: name.to_string(),
        count: offsets.len(),
        offsets: offsets.into_iter().take(MAX_LISTED_OFFSETS).collect(),
    }
}

/// Census of the signatures recovery relies on
pub fn signature_census(data: &[u8]) -> Vec<SignatureHits> {
    vec![
        signature_hits("ZIP Local", data, &MagicDetector::ZIP_LOCAL),
        signature_hits("ZIP Central", data, &MagicDetector::ZIP_CENTRAL),
        signature_hits("ZIP End", data, &MagicDetector::ZIP_END),
        signature_hits("Compound File", data, &MagicDetector::COMPOUND_FILE),
        signature_hits("Envelope Marker", data, &codec::ENVELOPE_MARKER),
    ]
}

pub fn compare_with_reference(input: &[u8], reference: &[u8]) -> ReferenceComparison {
    let size_ratio = if reference.is_empty() {
        0.0
    } else {
        input.len() as f64 / reference.len() as f64
    };
    ReferenceComparison {
        input_size: input.len(),
        reference_size: reference.len(),
        size_ratio,
        subset_offset: find_from(reference, input, 0),
    }
}

/// Analyze a buffer
pub fn analyze(data: &[u8], options: &AnalysisOptions) -> AnalysisReport {
    let (header, header_error, directory, stream) = match CompoundFile::parse(data) {
        Ok(file) => {
            let stream = file
                .extract_named(&options.stream_name)
                .map(|located| StreamSummary::of(&located.data));
            (Some(file.header().clone()), None, file.entries(), stream)
        }
        Err(e) => (None, Some(e.to_string()), Vec::new(), None),
    };

    let envelopes = codec::find_envelopes(data)
        .into_iter()
        .take(options.max_envelopes)
        .map(|block| {
            let outcome = codec::decode_with(&data[block.payload_range()], &options.codec);
            match outcome.failure {
                None => EnvelopeAnalysis {
                    decoded_is_zip: outcome.data.starts_with(&MagicDetector::ZIP_LOCAL),
                    content_type: MagicDetector::detect_file_type(&outcome.data)
                        .map(str::to_string),
                    decoded_size: Some(outcome.data.len()),
                    decode_error: None,
                    block,
                },
                Some(error) => EnvelopeAnalysis {
                    block,
                    decoded_size: None,
                    decode_error: Some(error.to_string()),
                    decoded_is_zip: false,
                    content_type: None,
                },
            }
        })
        .collect();

    let head_len = data.len().min(options.hex_dump_bytes);
    let tail_start = data.len().saturating_sub(options.hex_dump_bytes);

    AnalysisReport {
        size: data.len(),
        container: detect_container(data),
        signatures: signature_census(data),
        header,
        header_error,
        directory,
        stream,
        envelopes,
        head_dump: hex_dump(&data[..head_len], 0),
        tail_dump: hex_dump(&data[tail_start..], tail_start),
        reference: None,
    }
}

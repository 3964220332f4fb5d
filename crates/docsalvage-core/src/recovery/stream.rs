/// Raw named-stream extraction for offline analysis
///
/// Unlike the orchestrator this never decodes anything: it returns the bytes
/// of the stream (or the best guess at them) and says how they were found.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::engine::file_stem;
use crate::container::cfb::CompoundFile;
use crate::container::common::{find_from, InputImage, MagicDetector};

/// Half-width of the window searched for a local header around the name
pub const PROXIMITY_WINDOW: usize = 50_000;
/// Bytes returned from a proximity hit
pub const PROXIMITY_LIMIT: usize = 10 * 1024 * 1024;
/// Offsets below this are treated as header area by the signature fallback
pub const HEADER_AREA: usize = 1000;
/// Bytes returned by the signature fallback
pub const SIGNATURE_LIMIT: usize = 20 * 1024 * 1024;

/// How the stream bytes were located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum StreamSource {
    /// Compound-file directory lookup
    Directory,
    /// A local header near an occurrence of the stream name
    NameProximity { name_offset: usize, data_offset: usize },
    /// The first local header past the header area
    FirstSignature { data_offset: usize },
}

#[derive(Debug, Clone)]
pub struct ExtractedStream {
    pub data: Vec<u8>,
    pub source: StreamSource,
}

/// Quick look at extracted stream bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSummary {
    pub size: usize,
    /// A local header appears in the first 1000 bytes
    pub has_zip_signature: bool,
    pub zip_offset: Option<usize>,
    /// Envelope marker at offset 0
    pub has_envelope_marker: bool,
    pub leading_hex: String,
}

impl StreamSummary {
    pub fn of(data: &[u8]) -> Self {
        let zip_offset = find_from(data, &MagicDetector::ZIP_LOCAL, 0);
        Self {
            size: data.len(),
            has_zip_signature: zip_offset.is_some_and(|at| at < HEADER_AREA),
            zip_offset,
            has_envelope_marker: crate::codec::has_marker(data),
            leading_hex: hex_string(&data[..data.len().min(32)]),
        }
    }
}

pub(crate) fn hex_string(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Locate the named stream, falling back to byte-level heuristics
pub fn extract_stream(input: &[u8], name: &str) -> Option<ExtractedStream> {
    match CompoundFile::parse(input) {
        Ok(file) => {
            if let Some(located) = file.extract_named(name) {
                if !located.data.is_empty() {
                    return Some(ExtractedStream {
                        data: located.data,
                        source: StreamSource::Directory,
                    });
                }
            }
            tracing::warn!("{} stream not found in directory", name);
        }
        Err(e) => tracing::warn!("Standard compound file parsing failed: {}", e),
    }

    tracing::info!("Attempting name proximity search for {}...", name);
    if let Some(stream) = proximity_search(input, name) {
        return Some(stream);
    }

    tracing::info!("Attempting first signature extraction...");
    first_signature(input)
}

fn proximity_search(input: &[u8], name: &str) -> Option<ExtractedStream> {
    let utf16: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();

    for pattern in [name.as_bytes(), utf16.as_slice()] {
        let Some(name_offset) = find_ignore_ascii_case(input, pattern) else {
            continue;
        };
        tracing::debug!("Found stream name at offset {}", name_offset);

        let window_start = name_offset.saturating_sub(PROXIMITY_WINDOW);
        let window_end = name_offset.saturating_add(PROXIMITY_WINDOW).min(input.len());

        if let Some(data_offset) = find_from(input, &MagicDetector::ZIP_LOCAL, window_start)
            .filter(|&at| at < window_end)
        {
            let end = data_offset + PROXIMITY_LIMIT.min(input.len() - data_offset);
            tracing::info!(
                "Extracted {} bytes via name proximity",
                end - data_offset
            );
            return Some(ExtractedStream {
                data: input[data_offset..end].to_vec(),
                source: StreamSource::NameProximity {
                    name_offset,
                    data_offset,
                },
            });
        }
    }

    None
}

fn first_signature(input: &[u8]) -> Option<ExtractedStream> {
    let offsets = crate::archive::local_header_offsets(input);
    let first = *offsets.first()?;
    let data_offset = offsets
        .iter()
        .copied()
        .find(|&at| at > HEADER_AREA)
        .unwrap_or(first);

    let end = data_offset + SIGNATURE_LIMIT.min(input.len() - data_offset);
    tracing::info!(
        "Extracted {} bytes from the local header at offset {}",
        end - data_offset,
        data_offset
    );

    Some(ExtractedStream {
        data: input[data_offset..end].to_vec(),
        source: StreamSource::FirstSignature { data_offset },
    })
}

/// Case-insensitive (ASCII) search
fn find_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Extract the named stream of a file into `<output_dir>/<name>_<stem>.bin`
pub fn extract_stream_file(
    path: &Path,
    output_dir: &Path,
    name: &str,
) -> Result<Option<(PathBuf, ExtractedStream)>> {
    let image =
        InputImage::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let Some(stream) = extract_stream(&image, name) else {
        tracing::warn!("Failed to extract stream from {}", path.display());
        return Ok(None);
    };

    std::fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join(format!("{}_{}.bin", name, file_stem(path)));
    std::fs::write(&output_path, &stream.data)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    tracing::info!(
        "💾 Saved stream to: {} ({} bytes)",
        output_path.display(),
        stream.data.len()
    );
    Ok(Some((output_path, stream)))
}

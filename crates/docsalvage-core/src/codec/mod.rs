/// Envelope codec: a 12-byte header around a raw LZMA2 payload
///
/// Decoding never fails outward. Anything that does not decode is handed
/// back unchanged together with the reason.
use lzma_rust2::{Lzma2Options, Lzma2Reader, Lzma2Writer};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{Read, Write};

use crate::recovery::RecoveryError;

pub mod envelope;

pub use envelope::{
    find_envelopes, has_marker, EnvelopeBlock, EnvelopeHeader, ENVELOPE_HEADER_SIZE,
    ENVELOPE_MARKER,
};

/// Preset used when the archive producer compressed its payloads
pub const DEFAULT_PRESET: u32 = 0;

/// Default ceiling on decoded output
pub const DEFAULT_MAX_OUTPUT: u64 = 1024 * 1024 * 1024; // 1GB

/// Dictionary size for an LZMA2 preset (0..=9)
pub fn dict_size_for_preset(preset: u32) -> u32 {
    const KIB: u32 = 1024;
    const MIB: u32 = 1024 * KIB;
    match preset {
        0 => 256 * KIB,
        1 => MIB,
        2 => 2 * MIB,
        3 | 4 => 4 * MIB,
        5 | 6 => 8 * MIB,
        7 => 16 * MIB,
        8 => 32 * MIB,
        _ => 64 * MIB,
    }
}

/// Codec settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOptions {
    /// Preset the payload was compressed with
    pub preset: u32,
    /// Overrides the preset's dictionary size when set
    pub dict_size: Option<u32>,
    /// Decoded output larger than this is treated as a decode failure
    pub max_output_size: u64,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            preset: DEFAULT_PRESET,
            dict_size: None,
            max_output_size: DEFAULT_MAX_OUTPUT,
        }
    }
}

impl CodecOptions {
    pub fn effective_dict_size(&self) -> u32 {
        self.dict_size
            .unwrap_or_else(|| dict_size_for_preset(self.preset))
    }
}

/// Result of a decode attempt
#[derive(Debug, Clone)]
pub struct DecodeOutcome<'a> {
    /// Decoded bytes, or the untouched input on pass-through
    pub data: Cow<'a, [u8]>,
    /// Why decoding was skipped; `None` when the payload decoded
    pub failure: Option<RecoveryError>,
}

impl<'a> DecodeOutcome<'a> {
    pub fn is_decoded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_owned()
    }
}

/// Decode with default options
pub fn decode(data: &[u8]) -> DecodeOutcome<'_> {
    decode_with(data, &CodecOptions::default())
}

/// Strip the envelope header if present and decode the raw LZMA2 payload
pub fn decode_with<'a>(data: &'a [u8], options: &CodecOptions) -> DecodeOutcome<'a> {
    let payload = if has_marker(data) && data.len() >= ENVELOPE_HEADER_SIZE {
        tracing::debug!(
            "Envelope header found, payload: {} bytes",
            data.len() - ENVELOPE_HEADER_SIZE
        );
        &data[ENVELOPE_HEADER_SIZE..]
    } else {
        tracing::debug!("No envelope header, treating {} bytes as raw LZMA2", data.len());
        data
    };

    match decode_raw_lzma2(payload, options) {
        Ok(decoded) => {
            tracing::debug!(
                "LZMA2 decode successful: {} -> {} bytes",
                payload.len(),
                decoded.len()
            );
            DecodeOutcome {
                data: Cow::Owned(decoded),
                failure: None,
            }
        }
        Err(e) => {
            tracing::debug!("LZMA2 decode failed, passing input through: {}", e);
            DecodeOutcome {
                data: Cow::Borrowed(data),
                failure: Some(RecoveryError::DecompressionFailure(e.to_string())),
            }
        }
    }
}

fn decode_raw_lzma2(payload: &[u8], options: &CodecOptions) -> std::io::Result<Vec<u8>> {
    let reader = Lzma2Reader::new(payload, options.effective_dict_size(), None);

    let mut decoded = Vec::new();
    reader
        .take(options.max_output_size.saturating_add(1))
        .read_to_end(&mut decoded)?;

    if decoded.len() as u64 > options.max_output_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "decoded output exceeds limit of {} bytes",
                options.max_output_size
            ),
        ));
    }

    Ok(decoded)
}

/// Compress `data` into an envelope that `decode` reverses
pub fn encode(data: &[u8], preset: u32) -> std::io::Result<Vec<u8>> {
    let mut writer = Lzma2Writer::new(Vec::new(), Lzma2Options::with_preset(preset));
    writer.write_all(data)?;
    let payload = writer.finish()?;

    let payload_length = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "compressed payload does not fit a 32-bit length",
        )
    })?;

    let mut out = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
    EnvelopeHeader {
        payload_length,
        reserved: 0,
    }
    .write_to(&mut out);
    out.extend_from_slice(&payload);

    Ok(out)
}

/// Envelope header framing
///
/// Layout (12 bytes, little-endian):
/// - 0x00: marker `0C 00 00 00`
/// - 0x04: payload length
/// - 0x08: reserved, zero
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub const ENVELOPE_MARKER: [u8; 4] = [0x0C, 0x00, 0x00, 0x00];
pub const ENVELOPE_HEADER_SIZE: usize = 12;

/// Parsed envelope header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub payload_length: u32,
    pub reserved: u32,
}

impl EnvelopeHeader {
    /// Parse a header at the start of `data`; `None` without the marker
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ENVELOPE_HEADER_SIZE || data[..4] != ENVELOPE_MARKER {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..ENVELOPE_HEADER_SIZE]);
        let payload_length = cursor.read_u32::<LittleEndian>().ok()?;
        let reserved = cursor.read_u32::<LittleEndian>().ok()?;

        Some(EnvelopeHeader {
            payload_length,
            reserved,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ENVELOPE_MARKER);
        // Writes into a Vec cannot fail
        let _ = out.write_u32::<LittleEndian>(self.payload_length);
        let _ = out.write_u32::<LittleEndian>(self.reserved);
    }
}

/// Whether `data` begins with the envelope marker
pub fn has_marker(data: &[u8]) -> bool {
    data.len() >= ENVELOPE_MARKER.len() && data[..4] == ENVELOPE_MARKER
}

/// A well-formed envelope found inside a larger buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeBlock {
    /// Offset of the marker
    pub offset: usize,
    pub payload_length: usize,
}

impl EnvelopeBlock {
    pub fn payload_range(&self) -> std::ops::Range<usize> {
        let start = self.offset + ENVELOPE_HEADER_SIZE;
        start..start + self.payload_length
    }

    pub fn total_size(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.payload_length
    }
}

/// Locate every envelope whose reserved word is zero and whose payload fits
/// inside the buffer. Scanning resumes after each accepted block.
pub fn find_envelopes(data: &[u8]) -> Vec<EnvelopeBlock> {
    let mut blocks = Vec::new();
    let mut offset = 0usize;

    while offset + ENVELOPE_HEADER_SIZE <= data.len() {
        if let Some(header) = EnvelopeHeader::parse(&data[offset..]) {
            let payload_length = header.payload_length as usize;
            let fits = offset
                .checked_add(ENVELOPE_HEADER_SIZE)
                .and_then(|start| start.checked_add(payload_length))
                .is_some_and(|end| end <= data.len());

            if header.reserved == 0 && fits {
                tracing::debug!(
                    "Envelope at offset {}: {} byte payload",
                    offset,
                    payload_length
                );
                let block = EnvelopeBlock {
                    offset,
                    payload_length,
                };
                offset += block.total_size();
                blocks.push(block);
                continue;
            }
        }
        offset += 1;
    }

    blocks
}

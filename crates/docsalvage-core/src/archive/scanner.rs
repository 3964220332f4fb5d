/// Local header scanner
///
/// Walks a buffer from one `PK\x03\x04` signature to the next and yields
/// candidate members. No central directory or end record is consulted.
use flate2::bufread::DeflateDecoder;
use std::io::Read;

use super::structures::{
    decode_member_name, CompressionMethod, DataDescriptor, LocalFileHeader,
    DATA_DESCRIPTOR_SIGNATURE, LOCAL_HEADER_SIGNATURE, LOCAL_HEADER_SIZE,
};
use crate::container::common::{find_from, MagicDetector};

/// A member delimited by its local header
#[derive(Debug, Clone)]
pub struct CandidateMember<'a> {
    pub header: LocalFileHeader,
    /// Name with separators normalised to `/`
    pub name: String,
    /// Offset of the signature in the scanned buffer
    pub header_offset: usize,
    /// Offset of the first payload byte
    pub data_offset: usize,
    pub payload: &'a [u8],
    /// CRC-32 from the header, or from the data descriptor for deferred sizes
    pub expected_crc: u32,
    /// Where scanning resumes
    pub next_offset: usize,
}

impl<'a> CandidateMember<'a> {
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Scanner output
#[derive(Debug, Clone)]
pub enum ScanEvent<'a> {
    Member(CandidateMember<'a>),
    /// A name or payload runs past the end of the buffer; scanning stops
    Truncated { offset: usize, detail: String },
}

enum Rejection {
    /// Header fields out of bounds; retry one byte later
    Implausible(String),
    /// Member could not be delimited; retry four bytes later
    Malformed(String),
    Truncated(String),
}

/// Iterator over the local headers of a buffer
pub struct LocalHeaderScanner<'a> {
    data: &'a [u8],
    position: usize,
    finished: bool,
    max_deferred_size: u64,
}

impl<'a> LocalHeaderScanner<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            finished: false,
            max_deferred_size: u32::MAX as u64,
        }
    }

    /// Bound on the inflated size when delimiting deferred-size members
    pub fn with_max_deferred_size(mut self, limit: u64) -> Self {
        self.max_deferred_size = limit;
        self
    }

    fn parse_at(&self, offset: usize) -> Result<CandidateMember<'a>, Rejection> {
        let data = self.data;

        let fixed = data
            .get(offset..offset + LOCAL_HEADER_SIZE)
            .ok_or_else(|| {
                Rejection::Truncated(format!(
                    "local header at offset {} is cut off by the end of the buffer",
                    offset
                ))
            })?;
        let header =
            LocalFileHeader::parse(fixed).map_err(|e| Rejection::Malformed(e.to_string()))?;

        if !header.is_plausible() {
            return Err(Rejection::Implausible(format!(
                "name length {} / extra length {} out of range",
                header.name_length, header.extra_length
            )));
        }

        let name_start = offset + LOCAL_HEADER_SIZE;
        let name_end = name_start + header.name_length as usize;
        let raw_name = data.get(name_start..name_end).ok_or_else(|| {
            Rejection::Truncated(format!(
                "name of member at offset {} ends past the buffer ({} > {})",
                offset,
                name_end,
                data.len()
            ))
        })?;
        let name = decode_member_name(raw_name);

        let data_offset = offset + header.data_offset();
        if data_offset > data.len() {
            return Err(Rejection::Truncated(format!(
                "extra field of '{}' ends past the buffer",
                name
            )));
        }

        if header.has_deferred_sizes() {
            return self.delimit_deferred(header, name, offset, data_offset);
        }

        let data_end = data_offset + header.compressed_size as usize;
        let payload = data.get(data_offset..data_end).ok_or_else(|| {
            Rejection::Truncated(format!(
                "payload of '{}' ends past the buffer ({} > {})",
                name,
                data_end,
                data.len()
            ))
        })?;

        Ok(CandidateMember {
            expected_crc: header.crc32,
            header,
            name,
            header_offset: offset,
            data_offset,
            payload,
            next_offset: data_end,
        })
    }

    /// Find the end of a member whose sizes follow its data
    fn delimit_deferred(
        &self,
        header: LocalFileHeader,
        name: String,
        offset: usize,
        data_offset: usize,
    ) -> Result<CandidateMember<'a>, Rejection> {
        let rest = &self.data[data_offset..];

        let payload_len = match header.method {
            CompressionMethod::Deflated => {
                let mut decoder = DeflateDecoder::new(rest);
                let mut sink = std::io::sink();
                let copied = std::io::copy(
                    &mut (&mut decoder).take(self.max_deferred_size),
                    &mut sink,
                );
                if let Err(e) = copied {
                    return Err(Rejection::Malformed(format!(
                        "deflate stream of '{}' cannot be delimited: {}",
                        name, e
                    )));
                }
                decoder.total_in() as usize
            }
            _ => next_boundary(rest).unwrap_or(rest.len()),
        };

        let payload = &rest[..payload_len];
        let data_end = data_offset + payload_len;

        let descriptor = DataDescriptor::parse(&self.data[data_end..], payload_len);
        let (expected_crc, next_offset) = match descriptor {
            Some(descriptor) => (descriptor.crc32, data_end + descriptor.length),
            None => (header.crc32, data_end),
        };

        tracing::debug!(
            "Deferred-size member '{}' delimited at {} bytes (descriptor: {})",
            name,
            payload_len,
            descriptor.is_some()
        );

        Ok(CandidateMember {
            header,
            name,
            header_offset: offset,
            data_offset,
            payload,
            expected_crc,
            next_offset: next_offset.max(offset + 1),
        })
    }
}

/// Offset of the next local, central or descriptor signature
fn next_boundary(data: &[u8]) -> Option<usize> {
    [
        LOCAL_HEADER_SIGNATURE,
        MagicDetector::ZIP_CENTRAL,
        DATA_DESCRIPTOR_SIGNATURE,
    ]
    .iter()
    .filter_map(|signature| find_from(data, signature, 0))
    .min()
}

impl<'a> Iterator for LocalHeaderScanner<'a> {
    type Item = ScanEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let Some(offset) = find_from(self.data, &LOCAL_HEADER_SIGNATURE, self.position)
            else {
                self.finished = true;
                break;
            };

            match self.parse_at(offset) {
                Ok(member) => {
                    self.position = member.next_offset;
                    return Some(ScanEvent::Member(member));
                }
                Err(Rejection::Implausible(reason)) => {
                    tracing::debug!("Skipping signature at {}: {}", offset, reason);
                    self.position = offset + 1;
                }
                Err(Rejection::Malformed(reason)) => {
                    tracing::debug!("Malformed member at {}: {}", offset, reason);
                    self.position = offset + 4;
                }
                Err(Rejection::Truncated(detail)) => {
                    self.finished = true;
                    return Some(ScanEvent::Truncated { offset, detail });
                }
            }
        }

        None
    }
}

/// Offsets of every local header signature, ascending
pub fn local_header_offsets(data: &[u8]) -> Vec<usize> {
    crate::container::common::find_all(data, &LOCAL_HEADER_SIGNATURE, 0)
}

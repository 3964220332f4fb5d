/// ZIP local file header structures
///
/// Layout of the 30-byte fixed part (little-endian):
/// - 0x00: signature `PK\x03\x04`
/// - 0x04: version needed
/// - 0x06: general purpose flags
/// - 0x08: compression method
/// - 0x0A: DOS modification time
/// - 0x0C: DOS modification date
/// - 0x0E: CRC-32
/// - 0x12: compressed size
/// - 0x16: uncompressed size
/// - 0x1A: file name length
/// - 0x1C: extra field length
use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

use crate::container::common::MagicDetector;

pub const LOCAL_HEADER_SIZE: usize = 30;
pub const LOCAL_HEADER_SIGNATURE: [u8; 4] = MagicDetector::ZIP_LOCAL;
pub const DATA_DESCRIPTOR_SIGNATURE: [u8; 4] = *b"PK\x07\x08";

/// Headers declaring longer names are treated as false signature hits
pub const MAX_NAME_LENGTH: u16 = 1000;
/// Headers declaring longer extra fields are treated as false signature hits
pub const MAX_EXTRA_LENGTH: u16 = 50000;

/// General purpose flag: sizes and CRC follow the data
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Member compression method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    /// LZMA2 envelope used by the archive producer
    Envelope,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            14 => CompressionMethod::Envelope,
            other => CompressionMethod::Unknown(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Envelope => 14,
            CompressionMethod::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Stored => write!(f, "stored"),
            CompressionMethod::Deflated => write!(f, "deflate"),
            CompressionMethod::Envelope => write!(f, "lzma2-envelope"),
            CompressionMethod::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// Fixed part of a local file header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_length: u16,
    pub extra_length: u16,
}

impl LocalFileHeader {
    /// Parse the 30-byte header at the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < LOCAL_HEADER_SIZE {
            anyhow::bail!("Insufficient data for local file header");
        }
        if data[..4] != LOCAL_HEADER_SIGNATURE {
            anyhow::bail!("Invalid local file header signature");
        }

        let mut cursor = Cursor::new(&data[4..LOCAL_HEADER_SIZE]);

        Ok(LocalFileHeader {
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            method: CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?),
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            name_length: cursor.read_u16::<LittleEndian>()?,
            extra_length: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Name and extra lengths are within the accepted bounds
    pub fn is_plausible(&self) -> bool {
        self.name_length <= MAX_NAME_LENGTH && self.extra_length <= MAX_EXTRA_LENGTH
    }

    /// Sizes were deferred to a trailing data descriptor
    pub fn has_deferred_sizes(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0 && self.compressed_size == 0
    }

    /// Offset of the payload relative to the signature
    pub fn data_offset(&self) -> usize {
        LOCAL_HEADER_SIZE + self.name_length as usize + self.extra_length as usize
    }
}

/// Trailing data descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    /// Bytes occupied, including the optional signature
    pub length: usize,
}

impl DataDescriptor {
    /// Parse a descriptor at `data`, which must describe `payload_len` bytes.
    /// The leading signature is optional.
    pub fn parse(data: &[u8], payload_len: usize) -> Option<Self> {
        let (body, length) = if data.len() >= 4 && data[..4] == DATA_DESCRIPTOR_SIGNATURE {
            (&data[4..], 16)
        } else {
            (data, 12)
        };

        let mut cursor = Cursor::new(body);
        let crc32 = cursor.read_u32::<LittleEndian>().ok()?;
        let compressed_size = cursor.read_u32::<LittleEndian>().ok()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>().ok()?;

        if compressed_size as usize != payload_len {
            return None;
        }

        Some(DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
            length,
        })
    }
}

/// Decode a member name; invalid UTF-8 is replaced, backslashes become `/`
pub fn decode_member_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\\', "/")
}

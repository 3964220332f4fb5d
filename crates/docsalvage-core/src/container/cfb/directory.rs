//! Compound-file directory entry parsing
//!
//! Each directory sector holds `sector_size / 128` entries:
//! - 0x00..0x40: Name, UTF-16LE, NUL terminated or padded
//! - 0x40: Name length in bytes (including terminator)
//! - 0x42: Object type (0 empty, 1 storage, 2 stream, 5 root)
//! - 0x44..0x50: Left sibling, right sibling, child ids
//! - 0x74: Starting sector
//! - 0x78: Stream size (u64; only the low 32 bits are valid for 512-byte sectors)

use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use encoding_rs::UTF_16LE;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Directory entry size in bytes
pub const ENTRY_SIZE: usize = 128;

/// Width of the UTF-16 name field
pub const NAME_FIELD_SIZE: usize = 64;

/// Sibling / child id meaning "none"
pub const NO_STREAM: u32 = 0xFFFFFFFF;

/// Object type of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Empty,
    Storage,
    Stream,
    Root,
    Unknown(u8),
}

impl EntryKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => EntryKind::Empty,
            1 => EntryKind::Storage,
            2 => EntryKind::Stream,
            5 => EntryKind::Root,
            other => EntryKind::Unknown(other),
        }
    }
}

/// Parsed directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Position of the entry in the directory (0 = root)
    pub id: u32,
    pub name: String,
    pub kind: EntryKind,
    pub left_sibling_id: u32,
    pub right_sibling_id: u32,
    pub child_id: u32,
    /// First sector (or mini-sector) of the stream
    pub start_sector: u32,
    /// Declared stream size in bytes
    pub stream_size: u64,
}

impl DirectoryEntry {
    /// Parse a single directory entry from 128 bytes
    pub fn parse(data: &[u8], id: u32, sector_size: u32) -> Result<Self> {
        if data.len() < ENTRY_SIZE {
            anyhow::bail!("Insufficient data for directory entry");
        }

        let name = decode_entry_name(&data[..NAME_FIELD_SIZE]);

        let mut cursor = Cursor::new(&data[NAME_FIELD_SIZE..ENTRY_SIZE]);
        let _name_length = cursor.read_u16::<LittleEndian>()?;
        let kind = EntryKind::from_u8(cursor.read_u8()?);
        let _color = cursor.read_u8()?;
        let left_sibling_id = cursor.read_u32::<LittleEndian>()?;
        let right_sibling_id = cursor.read_u32::<LittleEndian>()?;
        let child_id = cursor.read_u32::<LittleEndian>()?;

        // Skip CLSID (16), state bits (4), creation and modified times (16)
        cursor.set_position(cursor.position() + 36);

        let start_sector = cursor.read_u32::<LittleEndian>()?;
        let mut stream_size = cursor.read_u64::<LittleEndian>()?;

        // Version 3 files may leave garbage in the high dword
        if sector_size == 512 {
            stream_size &= 0xFFFF_FFFF;
        }

        Ok(DirectoryEntry {
            id,
            name,
            kind,
            left_sibling_id,
            right_sibling_id,
            child_id,
            start_sector,
            stream_size,
        })
    }

    pub fn is_stream(&self) -> bool {
        self.kind == EntryKind::Stream
    }

    /// Case-insensitive name comparison
    pub fn name_matches(&self, target: &str) -> bool {
        self.name.to_lowercase() == target.to_lowercase()
    }
}

/// Decode the fixed-width UTF-16LE name field.
///
/// Stops at the first NUL code unit; a field with no terminator is decoded
/// whole. Invalid sequences become U+FFFD rather than failing the entry.
pub fn decode_entry_name(field: &[u8]) -> String {
    let mut end = field.len() & !1;
    for i in (0..end).step_by(2) {
        if field[i] == 0 && field[i + 1] == 0 {
            end = i;
            break;
        }
    }

    let (decoded, _had_errors) = UTF_16LE.decode_without_bom_handling(&field[..end]);
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_entry(name: &str, kind: u8, start: u32, size: u64) -> Vec<u8> {
        let mut data = vec![0u8; ENTRY_SIZE];
        let units: Vec<u8> = name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        data[..units.len()].copy_from_slice(&units);
        data[64..66].copy_from_slice(&((units.len() + 2) as u16).to_le_bytes());
        data[66] = kind;
        data[68..72].copy_from_slice(&NO_STREAM.to_le_bytes());
        data[72..76].copy_from_slice(&NO_STREAM.to_le_bytes());
        data[76..80].copy_from_slice(&NO_STREAM.to_le_bytes());
        data[116..120].copy_from_slice(&start.to_le_bytes());
        data[120..128].copy_from_slice(&size.to_le_bytes());
        data
    }

    #[test]
    fn test_parse_stream_entry() {
        let data = raw_entry("TargetStream", 2, 7, 1234);
        let entry = DirectoryEntry::parse(&data, 3, 512).unwrap();

        assert_eq!(entry.id, 3);
        assert_eq!(entry.name, "TargetStream");
        assert_eq!(entry.kind, EntryKind::Stream);
        assert_eq!(entry.start_sector, 7);
        assert_eq!(entry.stream_size, 1234);
        assert!(entry.is_stream());
        assert!(entry.name_matches("targetstream"));
        assert!(!entry.name_matches("target"));
    }

    #[test]
    fn test_stream_size_high_dword_masked_for_small_sectors() {
        let data = raw_entry("S", 2, 0, 0xAAAA_0000_0000_0064);
        assert_eq!(DirectoryEntry::parse(&data, 0, 512).unwrap().stream_size, 100);
        assert_eq!(
            DirectoryEntry::parse(&data, 0, 4096).unwrap().stream_size,
            0xAAAA_0000_0000_0064
        );
    }

    #[test]
    fn test_entry_kinds() {
        assert_eq!(EntryKind::from_u8(0), EntryKind::Empty);
        assert_eq!(EntryKind::from_u8(1), EntryKind::Storage);
        assert_eq!(EntryKind::from_u8(5), EntryKind::Root);
        assert_eq!(EntryKind::from_u8(9), EntryKind::Unknown(9));
    }

    #[test]
    fn test_name_without_terminator() {
        // 32 code units fill the whole field
        let field: Vec<u8> = "A".repeat(32).encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(decode_entry_name(&field), "A".repeat(32));
    }

    #[test]
    fn test_short_entry_rejected() {
        assert!(DirectoryEntry::parse(&[0u8; 100], 0, 512).is_err());
    }
}

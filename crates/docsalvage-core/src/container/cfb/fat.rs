//! Compound-file File Allocation Table (FAT) parsing and chain traversal
//!
//! The FAT maps each sector to the next sector of the same stream.
//!
//! FAT Entry Values:
//! - 0x00000000-0xFFFFFFF9: Next sector in chain
//! - 0xFFFFFFFA: Highest regular sector number
//! - 0xFFFFFFFC: DIFAT sector
//! - 0xFFFFFFFD: FAT sector
//! - 0xFFFFFFFE: End of chain
//! - 0xFFFFFFFF: Free / unused

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::HashSet;
use std::io::Cursor;

use super::CompoundFileHeader;
use crate::container::common::ByteView;

/// Special FAT entry values
pub const MAX_REG_SECTOR: u32 = 0xFFFFFFFA;
pub const DIFAT_SECTOR: u32 = 0xFFFFFFFC;
pub const FAT_SECTOR: u32 = 0xFFFFFFFD;
pub const END_OF_CHAIN: u32 = 0xFFFFFFFE;
pub const FREE_SECTOR: u32 = 0xFFFFFFFF;

/// Size of the fixed header region that precedes sector 0
pub const HEADER_REGION: u64 = 512;

/// Byte offset of a sector inside the file
pub fn sector_offset(sector: u32, sector_size: u32) -> u64 {
    HEADER_REGION + sector as u64 * sector_size as u64
}

/// Compound-file allocation table
#[derive(Debug, Clone)]
pub struct FatTable {
    /// FAT entries (one per sector)
    entries: Vec<u32>,
}

impl FatTable {
    /// Build the FAT by concatenating every readable FAT sector named in the header
    pub fn from_header(view: &ByteView<'_>, header: &CompoundFileHeader) -> Self {
        let sector_size = header.sector_size;
        let mut entries = Vec::new();

        for &locator in &header.fat_sector_locations {
            let offset = sector_offset(locator, sector_size);
            let Some(fat_data) = view.read_bytes(offset, sector_size as usize) else {
                tracing::debug!(
                    "FAT sector {} at 0x{:x} lies outside the buffer, skipping",
                    locator,
                    offset
                );
                continue;
            };

            let mut cursor = Cursor::new(fat_data);
            while let Ok(entry) = cursor.read_u32::<LittleEndian>() {
                entries.push(entry);
            }
        }

        tracing::debug!(
            "Parsed {} FAT entries from {} FAT sector(s)",
            entries.len(),
            header.fat_sector_locations.len()
        );

        FatTable { entries }
    }

    /// Build a FAT directly from entries
    pub fn from_entries(entries: Vec<u32>) -> Self {
        FatTable { entries }
    }

    /// Whether the FAT has an entry for this sector
    pub fn covers(&self, sector: u32) -> bool {
        sector <= MAX_REG_SECTOR && (sector as usize) < self.entries.len()
    }

    /// Check if entry is end of chain (or any other reserved marker)
    pub fn is_end_of_chain(&self, entry: u32) -> bool {
        entry >= MAX_REG_SECTOR
    }

    /// Get the next sector in chain (None if end of chain or invalid)
    pub fn next_sector(&self, sector: u32) -> Option<u32> {
        if !self.covers(sector) {
            return None;
        }

        let next = self.entries[sector as usize];
        if self.is_end_of_chain(next) {
            None
        } else {
            Some(next)
        }
    }

    /// Get the entire sector chain starting from a sector
    pub fn get_chain(&self, start_sector: u32) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut current = start_sector;
        let mut visited = HashSet::new();

        // Follow chain with loop detection
        while self.covers(current) {
            if !visited.insert(current) {
                tracing::warn!("FAT chain loop detected at sector {}", current);
                break;
            }

            chain.push(current);

            let next = self.entries[current as usize];
            if self.is_end_of_chain(next) {
                break;
            }

            current = next;
        }

        chain
    }

    /// Total entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

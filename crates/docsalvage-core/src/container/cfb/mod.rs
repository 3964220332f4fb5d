/// OLE compound file (structured storage) support
///
/// Only the read paths needed to pull one named stream out of a possibly
/// damaged container are implemented. Every failure degrades to "not found".
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use super::common::{ByteView, MagicDetector};
use crate::recovery::RecoveryError;

// Sub-modules
pub mod directory;
pub mod fat;

pub use directory::{DirectoryEntry, EntryKind};
pub use fat::FatTable;

use directory::ENTRY_SIZE;
use fat::{sector_offset, MAX_REG_SECTOR};

/// Compound file signature
pub const CFB_SIGNATURE: &[u8; 8] = &MagicDetector::COMPOUND_FILE;

/// Minimum size of a readable compound file (the header)
pub const HEADER_SIZE: usize = 512;

/// Number of FAT sector locators stored in the header
pub const HEADER_FAT_LOCATORS: usize = 109;

/// Sector exponents at or above this are rejected
pub const MAX_SECTOR_SHIFT: u16 = 20;

/// Default bound on directory sectors scanned
pub const DEFAULT_MAX_DIRECTORY_SECTORS: usize = 10;

/// Compound file header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundFileHeader {
    pub minor_version: u16,
    pub major_version: u16,
    pub byte_order: u16,
    pub sector_shift: u16,
    pub sector_size: u32,
    pub mini_sector_shift: u16,
    /// Zero when the mini-sector exponent is unusable
    pub mini_sector_size: u32,
    pub number_of_directory_sectors: u32,
    pub number_of_fat_sectors: u32,
    pub first_directory_sector: u32,
    pub mini_stream_cutoff_size: u32,
    pub first_mini_fat_sector: u32,
    pub number_of_mini_fat_sectors: u32,
    pub first_difat_sector: u32,
    pub number_of_difat_sectors: u32,
    /// FAT sector locations read from the header, sentinels removed
    pub fat_sector_locations: Vec<u32>,
}

impl CompoundFileHeader {
    /// Parse the compound file header from raw bytes
    pub fn parse(data: &[u8]) -> Result<Self, RecoveryError> {
        if data.len() < HEADER_SIZE {
            return Err(RecoveryError::MalformedHeader(format!(
                "buffer of {} bytes is smaller than a compound file header",
                data.len()
            )));
        }

        if &data[..8] != CFB_SIGNATURE {
            return Err(RecoveryError::MalformedHeader(
                "compound file signature not found".to_string(),
            ));
        }

        let header = Self::read_fields(&data[..HEADER_SIZE]).map_err(|e| {
            RecoveryError::MalformedHeader(format!("unreadable header field: {}", e))
        })?;

        if header.sector_shift >= MAX_SECTOR_SHIFT {
            return Err(RecoveryError::MalformedHeader(format!(
                "sector exponent {} is too large",
                header.sector_shift
            )));
        }

        Ok(header)
    }

    fn read_fields(data: &[u8]) -> std::io::Result<Self> {
        // Skip signature (8 bytes) and CLSID (16 bytes)
        let mut cursor = Cursor::new(data);
        cursor.set_position(24);

        let minor_version = cursor.read_u16::<LittleEndian>()?;
        let major_version = cursor.read_u16::<LittleEndian>()?;
        let byte_order = cursor.read_u16::<LittleEndian>()?;
        let sector_shift = cursor.read_u16::<LittleEndian>()?;
        let mini_sector_shift = cursor.read_u16::<LittleEndian>()?;

        // Skip reserved area (6 bytes)
        cursor.set_position(40);

        let number_of_directory_sectors = cursor.read_u32::<LittleEndian>()?;
        let number_of_fat_sectors = cursor.read_u32::<LittleEndian>()?;
        let first_directory_sector = cursor.read_u32::<LittleEndian>()?;
        let _transaction_signature = cursor.read_u32::<LittleEndian>()?;
        let mini_stream_cutoff_size = cursor.read_u32::<LittleEndian>()?;
        let first_mini_fat_sector = cursor.read_u32::<LittleEndian>()?;
        let number_of_mini_fat_sectors = cursor.read_u32::<LittleEndian>()?;
        let first_difat_sector = cursor.read_u32::<LittleEndian>()?;
        let number_of_difat_sectors = cursor.read_u32::<LittleEndian>()?;

        let mut locators = Vec::with_capacity(HEADER_FAT_LOCATORS);
        for _ in 0..HEADER_FAT_LOCATORS {
            locators.push(cursor.read_u32::<LittleEndian>()?);
        }

        // Trust the declared FAT count when it fits the header table; zeroed
        // tail entries would otherwise alias sector 0.
        let declared = number_of_fat_sectors as usize;
        let listed = if (1..=HEADER_FAT_LOCATORS).contains(&declared) {
            &locators[..declared]
        } else {
            &locators[..]
        };
        let fat_sector_locations = listed
            .iter()
            .copied()
            .filter(|&loc| loc <= MAX_REG_SECTOR)
            .collect();

        let sector_size = 1u32.checked_shl(sector_shift as u32).unwrap_or(0);
        let mini_sector_size = if mini_sector_shift < 16 {
            1u32 << mini_sector_shift
        } else {
            0
        };

        Ok(CompoundFileHeader {
            minor_version,
            major_version,
            byte_order,
            sector_shift,
            sector_size,
            mini_sector_shift,
            mini_sector_size,
            number_of_directory_sectors,
            number_of_fat_sectors,
            first_directory_sector,
            mini_stream_cutoff_size,
            first_mini_fat_sector,
            number_of_mini_fat_sectors,
            first_difat_sector,
            number_of_difat_sectors,
            fat_sector_locations,
        })
    }

    /// Directory entries per directory sector
    pub fn entries_per_sector(&self) -> usize {
        self.sector_size as usize / ENTRY_SIZE
    }
}

/// A stream located by name together with its bytes
#[derive(Debug, Clone)]
pub struct LocatedStream {
    pub entry: DirectoryEntry,
    pub data: Vec<u8>,
}

impl LocatedStream {
    /// Whether fewer bytes were available than the entry declares
    pub fn is_truncated(&self) -> bool {
        (self.data.len() as u64) < self.entry.stream_size
    }
}

/// Parsed compound file over a borrowed buffer
pub struct CompoundFile<'a> {
    view: ByteView<'a>,
    header: CompoundFileHeader,
    fat: FatTable,
    max_directory_sectors: usize,
}

impl<'a> CompoundFile<'a> {
    /// Parse header and FAT. Fails only with `MalformedHeader`.
    pub fn parse(data: &'a [u8]) -> Result<Self, RecoveryError> {
        let header = CompoundFileHeader::parse(data)?;
        let view = ByteView::new(data);
        let fat = FatTable::from_header(&view, &header);

        tracing::debug!(
            "Compound file: sector size {}, {} FAT entries, directory at sector {}",
            header.sector_size,
            fat.len(),
            header.first_directory_sector
        );

        Ok(CompoundFile {
            view,
            header,
            fat,
            max_directory_sectors: DEFAULT_MAX_DIRECTORY_SECTORS,
        })
    }

    /// Override the bound on directory sectors scanned
    pub fn with_directory_limit(mut self, max_sectors: usize) -> Self {
        self.max_directory_sectors = max_sectors;
        self
    }

    pub fn header(&self) -> &CompoundFileHeader {
        &self.header
    }

    pub fn fat(&self) -> &FatTable {
        &self.fat
    }

    /// Sectors holding the directory, bounded by the directory limit
    pub fn directory_sectors(&self) -> Vec<u32> {
        let first = self.header.first_directory_sector;
        if first > MAX_REG_SECTOR {
            return Vec::new();
        }

        if self.fat.covers(first) {
            let mut chain = self.fat.get_chain(first);
            chain.truncate(self.max_directory_sectors);
            return chain;
        }

        // FAT does not describe the directory: assume it is contiguous
        let sector_size = self.header.sector_size;
        (0..self.max_directory_sectors as u32)
            .filter_map(|i| first.checked_add(i))
            .take_while(|&sector| {
                self.view
                    .read_bytes(sector_offset(sector, sector_size), sector_size as usize)
                    .is_some()
            })
            .collect()
    }

    /// All directory entries that fit inside the buffer
    pub fn entries(&self) -> Vec<DirectoryEntry> {
        let sector_size = self.header.sector_size;
        let per_sector = self.header.entries_per_sector();
        let mut entries = Vec::new();

        for (sector_index, sector) in self.directory_sectors().into_iter().enumerate() {
            let base = sector_offset(sector, sector_size);

            for slot in 0..per_sector {
                let offset = base + (slot * ENTRY_SIZE) as u64;
                let Some(raw) = self.view.read_bytes(offset, ENTRY_SIZE) else {
                    continue;
                };

                let id = (sector_index * per_sector + slot) as u32;
                match DirectoryEntry::parse(raw, id, sector_size) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => tracing::debug!("Skipping directory entry #{}: {}", id, e),
                }
            }
        }

        entries
    }

    /// Find a stream entry whose name matches case-insensitively
    pub fn find_stream(&self, name: &str) -> Option<DirectoryEntry> {
        self.entries().into_iter().find(|entry| {
            if entry.kind != EntryKind::Empty && !entry.name.trim().is_empty() {
                tracing::debug!(
                    "Found entry '{}' ({:?}, {} bytes)",
                    entry.name,
                    entry.kind,
                    entry.stream_size
                );
            }
            entry.is_stream() && entry.name_matches(name)
        })
    }

    /// Locate a stream by name and read its bytes
    pub fn extract_named(&self, name: &str) -> Option<LocatedStream> {
        let entry = self.find_stream(name)?;
        let data = self.read_stream(&entry);

        tracing::info!(
            "Extracted stream '{}': {} of {} declared bytes",
            entry.name,
            data.len(),
            entry.stream_size
        );

        Some(LocatedStream { entry, data })
    }

    /// Read the bytes of a stream entry, truncated to what the buffer holds
    pub fn read_stream(&self, entry: &DirectoryEntry) -> Vec<u8> {
        if entry.stream_size == 0 {
            return Vec::new();
        }

        if self.uses_mini_stream(entry) {
            if let Some(data) = self.read_mini_stream(entry) {
                return data;
            }
            tracing::debug!(
                "Mini stream unreadable for '{}', falling back to regular sectors",
                entry.name
            );
        }

        self.read_regular(entry.start_sector, entry.stream_size)
    }

    fn uses_mini_stream(&self, entry: &DirectoryEntry) -> bool {
        entry.stream_size < self.header.mini_stream_cutoff_size as u64
            && self.header.number_of_mini_fat_sectors > 0
            && self.header.mini_sector_size > 0
            && entry.kind == EntryKind::Stream
    }

    /// Follow the FAT chain from `start`, or read contiguously when the FAT
    /// does not cover the start sector.
    fn read_regular(&self, start: u32, size: u64) -> Vec<u8> {
        let sector_size = self.header.sector_size as usize;
        let limit = usize::try_from(size).unwrap_or(usize::MAX);

        if !self.fat.covers(start) {
            if start > MAX_REG_SECTOR {
                return Vec::new();
            }
            let data = self
                .view
                .read_available(sector_offset(start, sector_size as u32), limit);
            return data.to_vec();
        }

        let mut data = Vec::with_capacity(limit.min(self.view.len()));
        for sector in self.fat.get_chain(start) {
            if data.len() >= limit {
                break;
            }

            let chunk = self
                .view
                .read_available(sector_offset(sector, sector_size as u32), sector_size);
            data.extend_from_slice(chunk);

            if chunk.len() < sector_size {
                tracing::warn!(
                    "Sector {} extends past the end of the buffer, stream truncated",
                    sector
                );
                break;
            }
        }

        data.truncate(limit);
        data
    }

    fn read_mini_stream(&self, entry: &DirectoryEntry) -> Option<Vec<u8>> {
        let root = self
            .entries()
            .into_iter()
            .find(|e| e.kind == EntryKind::Root)?;
        let container = self.read_regular(root.start_sector, root.stream_size);
        if container.is_empty() {
            return None;
        }

        let mini_fat_bytes = self.read_regular(
            self.header.first_mini_fat_sector,
            self.header.number_of_mini_fat_sectors as u64 * self.header.sector_size as u64,
        );
        let mut cursor = Cursor::new(&mini_fat_bytes);
        let mut mini_entries = Vec::with_capacity(mini_fat_bytes.len() / 4);
        while let Ok(value) = cursor.read_u32::<LittleEndian>() {
            mini_entries.push(value);
        }

        let mini_size = self.header.mini_sector_size;
        let mini_fat = FatTable::from_entries(mini_entries);
        let chain = mini_fat.get_chain(entry.start_sector);
        if chain.is_empty() {
            return None;
        }

        let container_view = ByteView::new(&container);
        let mut data = Vec::new();
        for mini_sector in chain {
            let offset = mini_sector as u64 * mini_size as u64;
            data.extend_from_slice(container_view.read_available(offset, mini_size as usize));
        }

        data.truncate(usize::try_from(entry.stream_size).unwrap_or(usize::MAX));
        Some(data)
    }
}

/// Check if data starts with the compound file signature
pub fn is_compound_file(data: &[u8]) -> bool {
    data.len() >= 8 && &data[..8] == CFB_SIGNATURE
}

/// Return the bytes of the named stream, or `None` when the buffer is not a
/// readable compound file or holds no such stream.
pub fn read_named_stream(data: &[u8], name: &str) -> Option<Vec<u8>> {
    match CompoundFile::parse(data) {
        Ok(file) => file.extract_named(name).map(|located| located.data),
        Err(e) => {
            tracing::debug!("Not reading '{}': {}", name, e);
            None
        }
    }
}

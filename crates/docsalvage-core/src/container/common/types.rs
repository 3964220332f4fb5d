/// Common types and utilities for reading untrusted byte buffers
use anyhow::Result;
use memmap2::MmapOptions;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

/// A memory-mapped input archive
pub struct InputImage {
    _file: File,
    mmap: Option<memmap2::Mmap>,
    size: u64,
}

impl InputImage {
    /// Open an archive file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();

        // Zero-length files cannot be mapped on every platform
        let mmap = if size == 0 {
            None
        } else {
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        Ok(InputImage {
            _file: file,
            mmap,
            size,
        })
    }

    /// Get the size of the input in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self.mmap {
            Some(ref mmap) => &mmap[..],
            None => &[],
        }
    }
}

impl Deref for InputImage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Bounds-checked view over a byte buffer.
///
/// Every accessor either returns `None` or truncates; nothing here indexes
/// past the end of the buffer.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
}

impl<'a> ByteView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read exactly `length` bytes, or `None` if the range leaves the buffer
    pub fn read_bytes(&self, offset: u64, length: usize) -> Option<&'a [u8]> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(length)?;
        self.data.get(start..end)
    }

    /// Read up to `length` bytes, truncated to what the buffer holds
    pub fn read_available(&self, offset: u64, length: usize) -> &'a [u8] {
        let Ok(start) = usize::try_from(offset) else {
            return &[];
        };
        if start >= self.data.len() {
            return &[];
        }
        let end = start.saturating_add(length).min(self.data.len());
        &self.data[start..end]
    }
}

/// Find the first occurrence of `needle` at or after `from`
pub fn find_from(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// Find every occurrence of `needle` at or after `from`, overlapping allowed
pub fn find_all(haystack: &[u8], needle: &[u8], from: usize) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut cursor = from;
    while let Some(pos) = find_from(haystack, needle, cursor) {
        offsets.push(pos);
        cursor = pos + 1;
    }
    offsets
}

/// Magic number detection for buffers and recovered members
pub struct MagicDetector;

impl MagicDetector {
    pub const COMPOUND_FILE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    pub const ZIP_LOCAL: [u8; 4] = *b"PK\x03\x04";
    pub const ZIP_CENTRAL: [u8; 4] = *b"PK\x01\x02";
    pub const ZIP_END: [u8; 4] = *b"PK\x05\x06";

    /// Detect a coarse content type from the first few bytes
    pub fn detect_file_type(data: &[u8]) -> Option<&'static str> {
        if data.len() < 4 {
            return None;
        }

        if data.len() >= 8 && data[..8] == Self::COMPOUND_FILE {
            return Some("application/x-ole-storage");
        }

        match &data[0..4] {
            [0x50, 0x4B, 0x03, 0x04] => Some("application/zip"),
            [0x50, 0x4B, 0x05, 0x06] => Some("application/zip"),
            [0x0C, 0x00, 0x00, 0x00] => Some("application/x-lzma2-envelope"),
            [0x25, 0x50, 0x44, 0x46] => Some("application/pdf"),
            [0x3C, 0x3F, 0x78, 0x6D] => Some("application/xml"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_detection() {
        assert_eq!(
            MagicDetector::detect_file_type(&MagicDetector::COMPOUND_FILE),
            Some("application/x-ole-storage")
        );
        assert_eq!(
            MagicDetector::detect_file_type(b"PK\x03\x04rest"),
            Some("application/zip")
        );
        assert_eq!(MagicDetector::detect_file_type(b"PK"), None);
    }

    #[test]
    fn test_byte_view_bounds() {
        let data = [1u8, 2, 3, 4, 5];
        let view = ByteView::new(&data);

        assert_eq!(view.read_bytes(1, 3), Some(&data[1..4]));
        assert_eq!(view.read_bytes(3, 3), None);
        assert_eq!(view.read_bytes(u64::MAX, 1), None);
        assert_eq!(view.read_available(3, 10), &data[3..]);
        assert!(view.read_available(9, 10).is_empty());
    }

    #[test]
    fn test_find_all_overlapping() {
        assert_eq!(find_all(b"aaaa", b"aa", 0), vec![0, 1, 2]);
        assert_eq!(find_from(b"xxPKxxPK", b"PK", 3), Some(6));
        assert_eq!(find_from(b"xx", b"", 0), None);
    }
}

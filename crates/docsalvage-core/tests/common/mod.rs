//! Synthetic fixture builders shared by the integration tests
#![allow(dead_code)]

use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

pub const SECTOR: usize = 512;
pub const MINI_SECTOR: usize = 64;
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
pub const FREE_SECTOR: u32 = 0xFFFF_FFFF;
pub const FAT_SECTOR: u32 = 0xFFFF_FFFD;

struct StreamFixture {
    name: String,
    data: Vec<u8>,
    declared_size: Option<u64>,
    reversed: bool,
    mini: bool,
}

/// Builds a version 3 compound file: sector 0 holds the FAT, sector 1 the
/// directory, regular streams follow. Mini streams, when present, come last:
/// one mini-FAT sector, then the root entry's container.
#[derive(Default)]
pub struct CfbBuilder {
    streams: Vec<StreamFixture>,
}

impl CfbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, name: &str, data: &[u8]) -> Self {
        self.streams.push(StreamFixture {
            name: name.to_string(),
            data: data.to_vec(),
            declared_size: None,
            reversed: false,
            mini: false,
        });
        self
    }

    /// Lay the stream's sectors out back to front so only the FAT orders them
    pub fn reversed_stream(mut self, name: &str, data: &[u8]) -> Self {
        self.streams.push(StreamFixture {
            name: name.to_string(),
            data: data.to_vec(),
            declared_size: None,
            reversed: true,
            mini: false,
        });
        self
    }

    pub fn stream_with_declared_size(mut self, name: &str, data: &[u8], declared: u64) -> Self {
        self.streams.push(StreamFixture {
            name: name.to_string(),
            data: data.to_vec(),
            declared_size: Some(declared),
            reversed: false,
            mini: false,
        });
        self
    }

    /// Store the stream in 64-byte mini sectors; keep it under 4096 bytes
    pub fn mini_stream(mut self, name: &str, data: &[u8]) -> Self {
        self.streams.push(StreamFixture {
            name: name.to_string(),
            data: data.to_vec(),
            declared_size: None,
            reversed: false,
            mini: true,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut fat = vec![FAT_SECTOR, END_OF_CHAIN];
        let mut sectors: Vec<Vec<u8>> = Vec::new();
        let mut directory = vec![dir_entry("Root Entry", 5, END_OF_CHAIN, 0)];

        for stream in self.streams.iter().filter(|s| !s.mini) {
            let count = stream.data.len().div_ceil(SECTOR).max(1);
            let first_index = 2 + sectors.len() as u32;
            let physical: Vec<u32> = if stream.reversed {
                (0..count as u32).rev().map(|i| first_index + i).collect()
            } else {
                (0..count as u32).map(|i| first_index + i).collect()
            };

            // Logical chunk i lives in physical[i]
            let mut laid_out = vec![vec![0u8; SECTOR]; count];
            for (i, chunk) in stream.data.chunks(SECTOR).enumerate() {
                let slot = (physical[i] - first_index) as usize;
                laid_out[slot][..chunk.len()].copy_from_slice(chunk);
            }
            sectors.extend(laid_out);

            fat.resize(2 + sectors.len(), FREE_SECTOR);
            for window in physical.windows(2) {
                fat[window[0] as usize] = window[1];
            }
            fat[physical[count - 1] as usize] = END_OF_CHAIN;

            let size = stream.declared_size.unwrap_or(stream.data.len() as u64);
            directory.push(dir_entry(&stream.name, 2, physical[0], size));
        }

        let mut mini_container: Vec<u8> = Vec::new();
        let mut mini_fat: Vec<u32> = Vec::new();
        for stream in self.streams.iter().filter(|s| s.mini) {
            let first = mini_fat.len() as u32;
            let count = stream.data.len().div_ceil(MINI_SECTOR).max(1);
            for i in 1..=count as u32 {
                mini_fat.push(if i == count as u32 { END_OF_CHAIN } else { first + i });
            }
            let mut padded = stream.data.clone();
            padded.resize(count * MINI_SECTOR, 0);
            mini_container.extend(padded);
            directory.push(dir_entry(&stream.name, 2, first, stream.data.len() as u64));
        }

        let mut mini_fat_sector = None;
        if !mini_fat.is_empty() {
            assert!(mini_fat.len() <= SECTOR / 4, "one mini FAT sector only");
            let mini_fat_index = 2 + sectors.len();
            sectors.push(
                (0..SECTOR / 4)
                    .flat_map(|i| mini_fat.get(i).copied().unwrap_or(FREE_SECTOR).to_le_bytes())
                    .collect(),
            );

            let container_start = 2 + sectors.len();
            for chunk in mini_container.chunks(SECTOR) {
                let mut sector = chunk.to_vec();
                sector.resize(SECTOR, 0);
                sectors.push(sector);
            }
            let container_end = 2 + sectors.len();

            fat.resize(container_end, FREE_SECTOR);
            fat[mini_fat_index] = END_OF_CHAIN;
            for i in container_start..container_end {
                fat[i] = if i + 1 == container_end { END_OF_CHAIN } else { i as u32 + 1 };
            }

            directory[0] = dir_entry(
                "Root Entry",
                5,
                container_start as u32,
                mini_container.len() as u64,
            );
            mini_fat_sector = Some(mini_fat_index as u32);
        }

        assert!(directory.len() <= SECTOR / 128, "one directory sector only");
        assert!(fat.len() <= SECTOR / 4, "one FAT sector only");

        let mut out = header(1, 1);
        if let Some(sector) = mini_fat_sector {
            out[60..64].copy_from_slice(&sector.to_le_bytes());
            out[64..68].copy_from_slice(&1u32.to_le_bytes());
        }
        let mut fat_sector = Vec::with_capacity(SECTOR);
        for i in 0..SECTOR / 4 {
            fat_sector.extend_from_slice(&fat.get(i).copied().unwrap_or(FREE_SECTOR).to_le_bytes());
        }
        out.extend(fat_sector);

        let mut dir_sector: Vec<u8> = directory.concat();
        dir_sector.resize(SECTOR, 0);
        out.extend(dir_sector);

        for sector in sectors {
            out.extend(sector);
        }
        out
    }
}

/// 512-byte header with one FAT sector at sector 0
pub fn header(num_fat_sectors: u32, first_directory_sector: u32) -> Vec<u8> {
    let mut h = vec![0u8; SECTOR];
    h[..8].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
    h[24..26].copy_from_slice(&0x3Eu16.to_le_bytes());
    h[26..28].copy_from_slice(&3u16.to_le_bytes());
    h[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    h[30..32].copy_from_slice(&9u16.to_le_bytes());
    h[32..34].copy_from_slice(&6u16.to_le_bytes());
    h[44..48].copy_from_slice(&num_fat_sectors.to_le_bytes());
    h[48..52].copy_from_slice(&first_directory_sector.to_le_bytes());
    h[56..60].copy_from_slice(&4096u32.to_le_bytes());
    h[60..64].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    h[68..72].copy_from_slice(&END_OF_CHAIN.to_le_bytes());
    for i in 0..109 {
        let at = 76 + i * 4;
        let value = if i == 0 { 0 } else { FREE_SECTOR };
        h[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
    h
}

/// One 128-byte directory entry
pub fn dir_entry(name: &str, kind: u8, start: u32, size: u64) -> Vec<u8> {
    let mut e = vec![0u8; 128];
    let units: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();
    e[..units.len()].copy_from_slice(&units);
    e[64..66].copy_from_slice(&((units.len() + 2) as u16).to_le_bytes());
    e[66] = kind;
    e[68..80].copy_from_slice(&[0xFF; 12]);
    e[116..120].copy_from_slice(&start.to_le_bytes());
    e[120..128].copy_from_slice(&size.to_le_bytes());
    e
}

/// Member of a local-headers-only archive
pub struct ZipMember {
    pub name: String,
    pub method: u16,
    pub crc: u32,
    pub uncompressed_size: u32,
    pub payload: Vec<u8>,
}

impl ZipMember {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            method: 0,
            crc: crc32fast::hash(data),
            uncompressed_size: data.len() as u32,
            payload: data.to_vec(),
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Self {
            name: name.to_string(),
            method: 8,
            crc: crc32fast::hash(data),
            uncompressed_size: data.len() as u32,
            payload: encoder.finish().unwrap(),
        }
    }

    pub fn enveloped(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            method: 14,
            crc: crc32fast::hash(data),
            uncompressed_size: data.len() as u32,
            payload: docsalvage_core::codec::encode(data, 0).unwrap(),
        }
    }

    pub fn with_crc(mut self, crc: u32) -> Self {
        self.crc = crc;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = b"PK\x03\x04".to_vec();
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.method.to_le_bytes());
        out.extend_from_slice(&0x6000u16.to_le_bytes());
        out.extend_from_slice(&0x5821u16.to_le_bytes());
        out.extend_from_slice(&self.crc.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&(self.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Concatenated local headers, no central directory
pub fn zip_stream(members: &[ZipMember]) -> Vec<u8> {
    members.iter().flat_map(ZipMember::to_bytes).collect()
}

/// Distinct, mildly compressible content for member `i`
pub fn sample_content(i: usize) -> Vec<u8> {
    format!("member {} content line\n", i)
        .repeat(20 + i * 3)
        .into_bytes()
}

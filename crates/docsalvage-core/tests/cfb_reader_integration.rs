//! Integration tests for reading named streams out of compound files

mod common;

use common::{dir_entry, header, CfbBuilder, END_OF_CHAIN, MINI_SECTOR, SECTOR};
use docsalvage_core::container::cfb::{CompoundFile, EntryKind};
use docsalvage_core::read_named_stream;

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

#[test]
fn test_multi_sector_stream_exact_length() {
    let payload = patterned(1300);
    let data = CfbBuilder::new()
        .stream("Other", b"unrelated")
        .stream("TargetStream", &payload)
        .build();

    let stream = read_named_stream(&data, "TargetStream").unwrap();
    assert_eq!(stream.len(), 1300);
    assert_eq!(stream, payload);
}

#[test]
fn test_chain_followed_through_fat() {
    let payload = patterned(3 * SECTOR + 17);
    let data = CfbBuilder::new().reversed_stream("Scrambled", &payload).build();

    assert_eq!(read_named_stream(&data, "Scrambled").unwrap(), payload);
}

#[test]
fn test_name_match_is_case_insensitive() {
    let data = CfbBuilder::new().stream("CasewareDocument", b"abc").build();

    assert_eq!(read_named_stream(&data, "casewaredocument").unwrap(), b"abc");
    assert_eq!(read_named_stream(&data, "CASEWAREDOCUMENT").unwrap(), b"abc");
    assert!(read_named_stream(&data, "Caseware").is_none());
}

#[test]
fn test_not_found_without_magic() {
    let mut data = CfbBuilder::new().stream("S", b"abc").build();
    data[0] = 0x00;

    assert!(read_named_stream(&data, "S").is_none());
    assert!(read_named_stream(b"PK\x03\x04 plain zip bytes", "S").is_none());
}

#[test]
fn test_oversized_sector_exponent_rejected() {
    let mut data = CfbBuilder::new().stream("S", b"abc").build();
    data[30..32].copy_from_slice(&20u16.to_le_bytes());

    assert!(CompoundFile::parse(&data).is_err());
    assert!(read_named_stream(&data, "S").is_none());
}

#[test]
fn test_600_byte_buffer_does_not_overrun() {
    // Directory in sector 0 is cut off after 88 bytes
    let mut data = header(1, 0);
    data.extend(dir_entry("S", 2, 5000, 1 << 20));
    data.truncate(600);
    assert_eq!(data.len(), 600);

    assert!(read_named_stream(&data, "S").is_none());
}

#[test]
fn test_stream_pointing_past_end_is_empty_not_a_panic() {
    // No FAT at all: directory read contiguously from sector 0
    let mut data = header(0, 0);
    for b in data[76..SECTOR].iter_mut() {
        *b = 0xFF;
    }
    let mut directory = dir_entry("Root Entry", 5, END_OF_CHAIN, 0);
    directory.extend(dir_entry("Far", 2, 1_000_000, 4096));
    directory.extend(dir_entry("Edge", 2, 0, 4096));
    directory.resize(SECTOR, 0);
    data.extend(directory);

    let file = CompoundFile::parse(&data).unwrap();
    assert_eq!(file.entries().len(), 4);

    assert_eq!(read_named_stream(&data, "Far").unwrap(), Vec::<u8>::new());
    // Contiguous read from sector 0 is truncated to the buffer
    assert_eq!(read_named_stream(&data, "Edge").unwrap().len(), SECTOR);
}

#[test]
fn test_declared_size_beyond_chain_is_truncated() {
    let payload = patterned(700);
    let data = CfbBuilder::new()
        .stream_with_declared_size("Short", &payload, 50_000)
        .build();

    let file = CompoundFile::parse(&data).unwrap();
    let located = file.extract_named("Short").unwrap();

    assert!(located.is_truncated());
    // Two whole sectors are available through the chain
    assert_eq!(located.data.len(), 2 * SECTOR);
    assert_eq!(&located.data[..700], &payload[..]);
}

#[test]
fn test_contiguous_fallback_without_fat() {
    let payload = patterned(900);
    let mut data = CfbBuilder::new().stream("Plain", &payload).build();

    // Drop every FAT locator
    data[44..48].copy_from_slice(&0u32.to_le_bytes());
    for b in data[76..SECTOR].iter_mut() {
        *b = 0xFF;
    }

    let file = CompoundFile::parse(&data).unwrap();
    assert!(file.fat().is_empty());
    assert_eq!(read_named_stream(&data, "Plain").unwrap(), payload);
}

#[test]
fn test_directory_listing() {
    let data = CfbBuilder::new()
        .stream("First", b"1")
        .stream("Second", b"22")
        .build();

    let file = CompoundFile::parse(&data).unwrap();
    let named: Vec<_> = file
        .entries()
        .into_iter()
        .filter(|e| e.kind != EntryKind::Empty)
        .map(|e| (e.name, e.kind))
        .collect();

    assert_eq!(
        named,
        vec![
            ("Root Entry".to_string(), EntryKind::Root),
            ("First".to_string(), EntryKind::Stream),
            ("Second".to_string(), EntryKind::Stream),
        ]
    );
}

#[test]
fn test_small_streams_read_from_mini_stream() {
    let large = patterned(5000);
    let small = patterned(100);
    let second: Vec<u8> = (0..200).map(|i| (255 - i) as u8).collect();
    let data = CfbBuilder::new()
        .stream("Large", &large)
        .mini_stream("Small", &small)
        .mini_stream("Second", &second)
        .build();

    let file = CompoundFile::parse(&data).unwrap();
    assert_eq!(file.header().number_of_mini_fat_sectors, 1);
    assert_eq!(file.header().mini_sector_size as usize, MINI_SECTOR);

    let stream = read_named_stream(&data, "Small").unwrap();
    assert_eq!(stream.len(), 100);
    assert_eq!(stream, small);

    // Starts at mini sector 2 and spans four mini sectors
    let stream = read_named_stream(&data, "Second").unwrap();
    assert_eq!(stream.len(), 200);
    assert_eq!(stream, second);

    // At or above the cutoff the regular FAT is used
    assert_eq!(read_named_stream(&data, "Large").unwrap(), large);
}

#[test]
fn test_unreadable_mini_stream_falls_back_to_regular_sectors() {
    let payload = patterned(100);
    let mut data = CfbBuilder::new().stream("Small", &payload).build();

    // Declare a mini FAT the root entry has no container for
    data[64..68].copy_from_slice(&1u32.to_le_bytes());

    let file = CompoundFile::parse(&data).unwrap();
    assert_eq!(file.header().number_of_mini_fat_sectors, 1);
    assert_eq!(read_named_stream(&data, "Small").unwrap(), payload);
}

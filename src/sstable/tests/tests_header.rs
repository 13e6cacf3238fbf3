use crate::sstable::builder::SstBuilder;
use crate::sstable::SstHeader;
use tempfile::tempdir;

fn build(dir: &std::path::Path, timestamp: u64, entries: &[(u64, &[u8])]) -> SstHeader {
    let mut b = SstBuilder::new();
    for &(k, v) in entries {
        b.push(k, v.to_vec());
    }
    b.seal(timestamp, dir).unwrap().unwrap()
}

#[test]
fn search_offset_hits_and_misses() {
    let dir = tempdir().unwrap();
    let header = build(dir.path(), 1, &[(10, b"a"), (20, b"b"), (30, b"c")]);

    assert!(header.search_offset(20).is_some());
    assert!(header.search_offset(15).is_none());
    assert!(header.search_offset(999).is_none());
}

#[test]
fn lower_bound_matches_binary_search_semantics() {
    let dir = tempdir().unwrap();
    let header = build(dir.path(), 1, &[(10, b"a"), (20, b"b"), (30, b"c")]);

    assert_eq!(header.lower_bound(0), 0);
    assert_eq!(header.lower_bound(10), 0);
    assert_eq!(header.lower_bound(15), 1);
    assert_eq!(header.lower_bound(30), 2);
    assert_eq!(header.lower_bound(31), 3);
}

#[test]
fn overlaps_respects_key_range() {
    let dir = tempdir().unwrap();
    let header = build(dir.path(), 1, &[(10, b"a"), (20, b"b")]);

    assert!(header.overlaps(0, 10));
    assert!(header.overlaps(15, 15));
    assert!(header.overlaps(20, 100));
    assert!(!header.overlaps(21, 100));
    assert!(!header.overlaps(0, 9));
}

#[test]
fn load_rejects_truncated_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.sst");
    std::fs::write(&path, vec![0u8; 10]).unwrap();
    assert!(SstHeader::load(path).is_err());
}

#[test]
fn load_rejects_zero_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.sst");
    let mut bytes = vec![0u8; 32 + 10240];
    bytes[0..8].copy_from_slice(&1u64.to_le_bytes()); // timestamp
    bytes[8..16].copy_from_slice(&0u64.to_le_bytes()); // count = 0
    std::fs::write(&path, bytes).unwrap();
    assert!(SstHeader::load(path).is_err());
}

/// Hand-crafts a 2-entry SST whose index has ascending keys but whose
/// `offset` column is given by `offsets`, followed by `payload_len` zero
/// payload bytes. Used to exercise the offset-consistency checks that
/// `SstHeader::load` must enforce independently of the key-ascending
/// check.
fn write_raw_sst(dir: &std::path::Path, offsets: [u32; 2], payload_len: usize) -> std::path::PathBuf {
    let count = 2u64;
    let min_key = 1u64;
    let max_key = 2u64;
    let base = 32 + 10240 + 12 * count as usize;

    let mut bytes = vec![0u8; base + payload_len];
    bytes[0..8].copy_from_slice(&1u64.to_le_bytes());
    bytes[8..16].copy_from_slice(&count.to_le_bytes());
    bytes[16..24].copy_from_slice(&min_key.to_le_bytes());
    bytes[24..32].copy_from_slice(&max_key.to_le_bytes());

    let index_start = 32 + 10240;
    bytes[index_start..index_start + 8].copy_from_slice(&min_key.to_le_bytes());
    bytes[index_start + 8..index_start + 12].copy_from_slice(&offsets[0].to_le_bytes());
    bytes[index_start + 12..index_start + 20].copy_from_slice(&max_key.to_le_bytes());
    bytes[index_start + 20..index_start + 24].copy_from_slice(&offsets[1].to_le_bytes());

    let path = dir.join("raw.sst");
    std::fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn load_rejects_decreasing_offsets() {
    let dir = tempdir().unwrap();
    let path = write_raw_sst(dir.path(), [5, 0], 16);
    assert!(SstHeader::load(path).is_err());
}

#[test]
fn load_rejects_offset_past_payload_bounds() {
    let dir = tempdir().unwrap();
    let path = write_raw_sst(dir.path(), [0, 1_000], 16);
    assert!(SstHeader::load(path).is_err());
}

#[test]
fn last_value_length_derived_from_file_size() {
    let dir = tempdir().unwrap();
    let header = build(dir.path(), 1, &[(1, b"ab"), (2, b"cdefg")]);
    assert_eq!(header.get(2).unwrap(), Some(b"cdefg".to_vec()));
}

#[test]
fn binary_safe_values_round_trip() {
    let dir = tempdir().unwrap();
    let value: &[u8] = &[0u8, 1, 2, 0, 0, 255];
    let header = build(dir.path(), 1, &[(1, value)]);
    assert_eq!(header.get(1).unwrap(), Some(value.to_vec()));
}

use crate::engine::Store;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::tempdir;

fn assert_level_bounds(store: &Store) {
    for (level, headers) in store.levels().iter().enumerate() {
        let bound = 1usize << (level + 1);
        assert!(headers.len() <= bound);
    }
}

fn assert_levels_disjoint(store: &Store) {
    for (level, headers) in store.levels().iter().enumerate() {
        if level == 0 {
            continue;
        }
        for i in 0..headers.len() {
            for j in (i + 1)..headers.len() {
                assert!(!headers[i].overlaps(headers[j].min_key(), headers[j].max_key()));
            }
        }
    }
}

#[test]
fn all_tombstone_merge_at_new_bottom_level_still_creates_its_directory() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path()).unwrap();

    // Three level-0 flushes, all of which end up tombstoned, force a
    // compaction into level 1 whose merged output is empty — no SST is
    // sealed, but level 1 still becomes the store's bottom level and its
    // directory must exist on disk regardless.
    store.put(1, b"a".to_vec()).unwrap();
    store.force_flush().unwrap();
    store.delete(1).unwrap();
    store.force_flush().unwrap();
    store.put(2, b"b".to_vec()).unwrap();
    store.delete(2).unwrap();
    store.force_flush().unwrap();

    assert_eq!(store.total_level(), 1);
    assert!(store.levels()[1].is_empty());
    assert!(dir.path().join("level-1").is_dir());
}

#[test]
fn compaction_splits_output_across_multiple_ssts_when_oversized() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path()).unwrap();

    // Large values push compacted output at level 1 past the 2 MiB budget,
    // forcing the builder to seal and start a new file mid-merge.
    for i in 0..20u64 {
        store.put(i, vec![0xABu8; 200_000]).unwrap();
        store.force_flush().unwrap();
    }

    assert_level_bounds(&store);
    assert_levels_disjoint(&store);

    for i in 0..20u64 {
        assert_eq!(store.get(i).unwrap(), vec![0xABu8; 200_000]);
    }
}

#[test]
fn ten_thousand_random_order_keys_survive_compaction() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path()).unwrap();

    let mut keys: Vec<u64> = (0..10_000).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    keys.shuffle(&mut rng);

    for (i, &k) in keys.iter().enumerate() {
        store.put(k, (k % 1000).to_le_bytes().to_vec()).unwrap();
        if i % 64 == 0 {
            store.force_flush().unwrap();
        }
    }
    store.force_flush().unwrap();

    assert_level_bounds(&store);
    assert_levels_disjoint(&store);

    for &k in &keys {
        assert_eq!(store.get(k).unwrap(), (k % 1000).to_le_bytes().to_vec());
    }

    let mut out = Vec::new();
    store.scan(0, u64::MAX, &mut out).unwrap();
    let mut sorted_keys = keys.clone();
    sorted_keys.sort_unstable();
    assert_eq!(out.len(), sorted_keys.len());
    for (expected_key, (actual_key, _)) in sorted_keys.iter().zip(out.iter()) {
        assert_eq!(expected_key, actual_key);
    }
}

#[test]
fn deletes_interleaved_with_compaction_stay_absent() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path()).unwrap();

    for k in 0..500u64 {
        store.put(k, vec![1u8]).unwrap();
        if k % 20 == 0 {
            store.force_flush().unwrap();
        }
    }
    for k in (0..500u64).step_by(3) {
        store.delete(k).unwrap();
    }
    store.force_flush().unwrap();

    for k in 0..500u64 {
        if k % 3 == 0 {
            assert!(store.get(k).unwrap().is_empty());
        } else {
            assert_eq!(store.get(k).unwrap(), vec![1u8]);
        }
    }
}

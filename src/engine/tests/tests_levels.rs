use crate::engine::Store;
use tempfile::tempdir;

/// After every flush, each resident level must hold at most `2^(L+1)` SSTs.
fn assert_level_bounds(store: &Store) {
    for (level, headers) in store.levels().iter().enumerate() {
        let bound = 1usize << (level + 1);
        assert!(
            headers.len() <= bound,
            "level {level} has {} SSTs, bound is {bound}",
            headers.len()
        );
    }
}

/// Levels >= 1 must never contain two SSTs with overlapping key ranges.
fn assert_levels_disjoint(store: &Store) {
    for (level, headers) in store.levels().iter().enumerate() {
        if level == 0 {
            continue;
        }
        for i in 0..headers.len() {
            for j in (i + 1)..headers.len() {
                assert!(
                    !headers[i].overlaps(headers[j].min_key(), headers[j].max_key()),
                    "level {level} has overlapping SSTs"
                );
            }
        }
    }
}

#[test]
fn repeated_flushes_trigger_compaction_and_hold_bounds() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path()).unwrap();

    for round in 0..40u64 {
        store.put(round, vec![round as u8; 16]).unwrap();
        store.force_flush().unwrap();
        assert_level_bounds(&store);
        assert_levels_disjoint(&store);
    }

    for round in 0..40u64 {
        assert_eq!(store.get(round).unwrap(), vec![round as u8; 16]);
    }
}

#[test]
fn compaction_preserves_newest_value_on_key_overwrite() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path()).unwrap();

    for i in 0..30u64 {
        store.put(1, vec![i as u8]).unwrap();
        store.force_flush().unwrap();
    }

    assert_eq!(store.get(1).unwrap(), vec![29u8]);
}

#[test]
fn tombstones_survive_until_bottom_level_drops_them() {
    let dir = tempdir().unwrap();
    let mut store = Store::open(dir.path()).unwrap();

    store.put(1, b"a".to_vec()).unwrap();
    store.force_flush().unwrap();
    store.delete(1).unwrap();
    store.force_flush().unwrap();

    for i in 0..40u64 {
        store.put(100 + i, vec![i as u8; 8]).unwrap();
        store.force_flush().unwrap();
    }

    assert!(store.get(1).unwrap().is_empty());
}

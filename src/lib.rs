//! # levelkv
//!
//! An embeddable, persistent, ordered key-value storage engine built on a
//! **leveled log-structured merge (LSM) tree**. Keys are `u64`; values are
//! arbitrary byte strings.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                        Store                           │
//! │  ┌────────────┐                 ┌──────────────────┐   │
//! │  │  Memtable  │── flush (C5) ──►│  level-0 SSTable  │   │
//! │  └─────┬──────┘                 └─────────┬─────────┘   │
//! │        │ get / scan                       │ compaction  │
//! │        ▼                                  ▼             │
//! │  ┌─────────────────────────────────────────────────┐    │
//! │  │     per-level SST header cache (C3)              │   │
//! │  │     level-0 (overlap ok) … level-N (disjoint)     │  │
//! │  └─────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`engine`] | The `Store`: open, read, write, scan, flush, reset |
//! | [`memtable`] | In-memory ordered write buffer |
//! | [`sstable`] | Immutable, sorted, on-disk tables with bloom filters and key indices |
//! | [`compaction`] | Leveled compaction engine |
//!
//! ## Key properties
//!
//! - **Fixed on-disk layout** — every SSTable is a 32-byte header, a
//!   10240-byte bloom filter, a flat key index, and a value payload, with no
//!   variable-length framing. See [`sstable`] for the exact byte offsets.
//! - **Leveled compaction** — level `L` holds at most `2^(L+1)` SSTables;
//!   level 0 may overlap, levels `≥ 1` are disjoint by key range.
//! - **Single-threaded** — the store is not internally synchronized; see
//!   [`engine`] for the concurrency contract.
//! - **No write-ahead log** — durability covers flushed SSTables only; an
//!   unflushed memtable is lost on crash (see [`engine`] module docs).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use levelkv::engine::Store;
//!
//! let mut store = Store::open("/tmp/my_store").unwrap();
//!
//! store.put(1, b"hello".to_vec()).unwrap();
//! assert_eq!(store.get(1).unwrap(), b"hello");
//!
//! assert!(store.delete(1).unwrap());
//! assert!(store.get(1).unwrap().is_empty());
//!
//! store.put(10, b"a".to_vec()).unwrap();
//! store.put(20, b"b".to_vec()).unwrap();
//! let mut out = Vec::new();
//! store.scan(0, 100, &mut out).unwrap();
//! assert_eq!(out, vec![(10, b"a".to_vec()), (20, b"b".to_vec())]);
//! ```

#![allow(dead_code)]

pub mod compaction;
pub mod engine;
pub mod memtable;
pub mod sstable;

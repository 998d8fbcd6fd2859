//! Integration tests for the storage layer
//!
//! These tests exercise the storage types together:
//! - IndexTable forward/reverse consistency under arbitrary operations
//! - Scan batching covering exactly the range contents
//! - MemoryDocumentStore under concurrent writers

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use stratadex_core::{tuple, Document, DocumentId, DocumentSource};
use stratadex_storage::{IndexEntry, IndexTable, KeyCodec, KeyRange, MemoryDocumentStore};

// ============================================================================
// Helper Functions
// ============================================================================

fn key_for(n: u8) -> stratadex_storage::EncodedKey {
    KeyCodec.encode(&tuple![i64::from(n % 4), i64::from(n)])
}

fn drain(table: &IndexTable, range: &KeyRange, reverse: bool, batch: usize) -> Vec<IndexEntry> {
    let mut out: Vec<IndexEntry> = Vec::new();
    loop {
        let next = table.scan_batch(range, out.last(), reverse, batch);
        if next.is_empty() {
            return out;
        }
        out.extend(next);
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert(u8, u8),
    Remove(u8, u8),
    Replace(u8, Vec<u8>),
    RemoveDocument(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16, 0u8..6).prop_map(|(k, d)| Op::Insert(k, d)),
        (0u8..16, 0u8..6).prop_map(|(k, d)| Op::Remove(k, d)),
        (0u8..6, proptest::collection::vec(0u8..16, 0..4)).prop_map(|(d, ks)| Op::Replace(d, ks)),
        (0u8..6).prop_map(Op::RemoveDocument),
    ]
}

// ============================================================================
// IndexTable Properties
// ============================================================================

mod index_table {
    use super::*;

    proptest! {
        #[test]
        fn prop_table_matches_model(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let mut table = IndexTable::new();
            let mut model: BTreeSet<(stratadex_storage::EncodedKey, DocumentId)> = BTreeSet::new();

            for op in ops {
                match op {
                    Op::Insert(k, d) => {
                        let doc = DocumentId::new(format!("d{}", d));
                        table.insert(key_for(k), doc.clone());
                        model.insert((key_for(k), doc));
                    }
                    Op::Remove(k, d) => {
                        let doc = DocumentId::new(format!("d{}", d));
                        table.remove(&key_for(k), &doc);
                        model.remove(&(key_for(k), doc));
                    }
                    Op::Replace(d, ks) => {
                        let doc = DocumentId::new(format!("d{}", d));
                        let keys: BTreeSet<_> = ks.iter().map(|k| key_for(*k)).collect();
                        table.replace_document(&doc, &keys);
                        model.retain(|(_, owner)| owner != &doc);
                        for k in keys {
                            model.insert((k, doc.clone()));
                        }
                    }
                    Op::RemoveDocument(d) => {
                        let doc = DocumentId::new(format!("d{}", d));
                        table.remove_document(&doc);
                        model.retain(|(_, owner)| owner != &doc);
                    }
                }
            }

            let scanned: Vec<_> = drain(&table, &KeyRange::all(), false, 3)
                .into_iter()
                .map(|e| (e.key, e.document))
                .collect();
            let expected: Vec<_> = model.iter().cloned().collect();
            prop_assert_eq!(&scanned, &expected);
            prop_assert_eq!(table.len(), model.len());

            for (key, doc) in &model {
                let keys = table.keys_for_document(doc);
                prop_assert!(keys.map(|ks| ks.contains(key)).unwrap_or(false));
            }
        }

        #[test]
        fn prop_reverse_scan_is_mirror(
            ops in proptest::collection::vec(op_strategy(), 0..48),
            batch in 1usize..5,
        ) {
            let mut table = IndexTable::new();
            for op in ops {
                if let Op::Insert(k, d) = op {
                    table.insert(key_for(k), DocumentId::new(format!("d{}", d)));
                }
            }
            let range = KeyRange::prefix(KeyCodec.encode(&tuple![1]));
            let forward = drain(&table, &range, false, batch);
            let mut backward = drain(&table, &range, true, batch);
            backward.reverse();
            prop_assert_eq!(forward, backward);
        }
    }

    #[test]
    fn test_bounded_range_with_exclusive_ends() {
        let mut table = IndexTable::new();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            table.insert(KeyCodec.encode(&tuple![i as i64]), DocumentId::from(*id));
        }
        let range = KeyRange::new(
            Bound::Excluded(KeyCodec.encode(&tuple![0])),
            Bound::Excluded(KeyCodec.encode(&tuple![3])),
        );
        let docs: Vec<_> = drain(&table, &range, false, 1)
            .into_iter()
            .map(|e| e.document.into_string())
            .collect();
        assert_eq!(docs, vec!["b", "c"]);
    }
}

// ============================================================================
// MemoryDocumentStore
// ============================================================================

mod document_store {
    use super::*;

    #[test]
    fn test_concurrent_writers_distinct_documents() {
        let store = Arc::new(MemoryDocumentStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100 {
                        let id = format!("t{}-{}", t, i);
                        store.put(Document::new(id).with_field("n", i as i64), false);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.document_count(), 800);
    }

    #[test]
    fn test_document_roundtrip_through_json() {
        let store = MemoryDocumentStore::new();
        let json = serde_json::json!({"user": {"id": 7}, "tags": ["x", "y"]});
        let doc = Document::from_json("u7", &json).unwrap();
        store.put(doc, false);

        let stored = store.get_document(&DocumentId::from("u7")).unwrap();
        assert_eq!(stored.get_scalar("user.id"), Some(&stratadex_core::Scalar::Int(7)));
        assert_eq!(stored.get("tags").and_then(|v| v.as_array()).map(|a| a.len()), Some(2));
    }
}

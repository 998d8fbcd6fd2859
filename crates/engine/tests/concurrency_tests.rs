//! Multi-threaded maintenance tests
//!
//! Writers go through `MemoryDocumentStore`, which holds its per-document
//! stripe until the engine's hook returns, so the store and the derived
//! state agree on the order of writes to each document.

use std::sync::{Arc, Barrier};
use std::thread;
use stratadex_core::{tuple, Document, DocumentId, DocumentSource, Scalar};
use stratadex_engine::{AggregatorDefinition, Backfill, IndexDefinition, IndexEngine};
use stratadex_storage::{AggregateValue, MemoryDocumentStore};

fn setup() -> (Arc<IndexEngine>, Arc<MemoryDocumentStore>) {
    let engine = Arc::new(IndexEngine::default());
    engine
        .register_index(
            IndexDefinition::compound("user_interests", ["user_id", "category_id"]),
            Backfill::None,
        )
        .unwrap();
    engine
        .register_index(IndexDefinition::multi("post_tags", "tags", ["date"]), Backfill::None)
        .unwrap();
    engine
        .register_aggregator(AggregatorDefinition::counter("per_user", ["user_id"]), Backfill::None)
        .unwrap();
    let store = Arc::new(MemoryDocumentStore::new());
    store.attach_hook(engine.clone());
    (engine, store)
}

fn doc(id: &str, user: i64, category: i64, tags: &[&str]) -> Document {
    Document::new(id)
        .with_field("user_id", user)
        .with_field("category_id", category)
        .with_field("tags", tags.iter().map(|t| Scalar::from(*t)).collect::<Vec<_>>())
        .with_field("date", "2024-01-01")
}

/// Index state for a document must equal what extraction of its stored
/// content yields
fn assert_converged(engine: &IndexEngine, store: &MemoryDocumentStore) {
    let fresh = IndexEngine::default();
    fresh
        .register_index(
            IndexDefinition::compound("user_interests", ["user_id", "category_id"]),
            Backfill::From(store),
        )
        .unwrap();
    fresh
        .register_index(
            IndexDefinition::multi("post_tags", "tags", ["date"]),
            Backfill::From(store),
        )
        .unwrap();
    fresh
        .register_aggregator(
            AggregatorDefinition::counter("per_user", ["user_id"]),
            Backfill::From(store),
        )
        .unwrap();

    store.for_each_document(&mut |d| {
        for index in ["user_interests", "post_tags"] {
            assert_eq!(
                engine.entries_for_document(index, d.id()).unwrap(),
                fresh.entries_for_document(index, d.id()).unwrap(),
                "{} diverged for {}",
                index,
                d.id()
            );
        }
        true
    });
    assert_eq!(
        engine.aggregate_groups("per_user").unwrap(),
        fresh.aggregate_groups("per_user").unwrap()
    );
    assert_eq!(
        engine.index_stats("post_tags").unwrap(),
        fresh.index_stats("post_tags").unwrap()
    );
}

#[test]
fn test_disjoint_writers() {
    let (engine, store) = setup();
    let threads = 8;
    let per_thread = 200;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..per_thread {
                    let id = format!("t{}_{}", t, i);
                    let outcome = store.put(doc(&id, t as i64, i as i64, &["x"]), false);
                    assert!(outcome.maintenance_ok());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = engine.index_stats("user_interests").unwrap();
    assert_eq!(stats.entries, threads * per_thread);
    for t in 0..threads {
        assert_eq!(
            engine.aggregate_get("per_user", &tuple![t as i64]).unwrap(),
            AggregateValue::Count(per_thread as u64)
        );
    }
    assert_eq!(
        engine.point_lookup("post_tags", &tuple!["x"]).unwrap().count(),
        threads * per_thread
    );
}

#[test]
fn test_contended_document_converges() {
    let (engine, store) = setup();
    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..150i64 {
                    let tag = format!("tag{}", (t as i64 + i) % 5);
                    let user = (t as i64 + i) % 3;
                    store.put(doc("hot", user, i, &[tag.as_str(), "shared"]), false);
                    if i % 37 == 0 {
                        store.delete(&DocumentId::from("hot"));
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    match store.get(&DocumentId::from("hot")) {
        Some(_) => assert_eq!(
            engine
                .entries_for_document("user_interests", &DocumentId::from("hot"))
                .unwrap()
                .len(),
            1
        ),
        None => assert_eq!(engine.index_stats("user_interests").unwrap().entries, 0),
    }
    assert_converged(&engine, &store);
    let total: u64 = engine
        .aggregate_groups("per_user")
        .unwrap()
        .iter()
        .filter_map(|(_, v)| v.as_count())
        .sum();
    assert!(total <= 1);
}

#[test]
fn test_readers_see_whole_key_sets() {
    let (engine, store) = setup();
    let id = DocumentId::from("p");
    store.put(doc("p", 1, 1, &["a", "b"]), false);

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..500 {
                let tags: &[&str] = if i % 2 == 0 { &["c", "d"] } else { &["a", "b"] };
                store.put(doc("p", 1, 1, tags), false);
            }
        })
    };

    let ab = vec![tuple!["a", "2024-01-01"], tuple!["b", "2024-01-01"]];
    let cd = vec![tuple!["c", "2024-01-01"], tuple!["d", "2024-01-01"]];
    for _ in 0..2_000 {
        let seen = engine.entries_for_document("post_tags", &id).unwrap();
        assert!(seen == ab || seen == cd, "partial apply observed: {:?}", seen);
    }
    writer.join().unwrap();
}

#[test]
fn test_backfill_while_writing() {
    let store = Arc::new(MemoryDocumentStore::new());
    for i in 0..300i64 {
        store.put(doc(&format!("d{}", i), i % 10, i, &["seed"]), false);
    }
    let engine = Arc::new(IndexEngine::default());
    store.attach_hook(engine.clone());

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for round in 0..3i64 {
                for i in 0..300i64 {
                    let id = format!("d{}", i);
                    if (i + round) % 7 == 0 {
                        store.delete(&DocumentId::from(id.as_str()));
                    } else {
                        store.put(doc(&id, (i + round) % 10, i, &["moved"]), false);
                    }
                }
            }
        })
    };

    engine
        .register_index(
            IndexDefinition::compound("user_interests", ["user_id", "category_id"]),
            Backfill::From(&*store),
        )
        .unwrap();
    engine
        .register_index(
            IndexDefinition::multi("post_tags", "tags", ["date"]),
            Backfill::From(&*store),
        )
        .unwrap();
    engine
        .register_aggregator(
            AggregatorDefinition::counter("per_user", ["user_id"]),
            Backfill::From(&*store),
        )
        .unwrap();
    writer.join().unwrap();

    assert_converged(&engine, &store);
    assert!(engine.pending_reconciliation().is_empty());
}

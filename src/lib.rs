//! Stratadex - secondary indexes and incremental aggregates for document stores
//!
//! Stratadex sits beside a document store and keeps derived data in step
//! with it: compound and multi-valued secondary indexes over document
//! fields, and grouped counters, sums, minimums and maximums.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stratadex::{tuple, Backfill, Document, IndexDefinition, IndexEngine, MemoryDocumentStore};
//!
//! let engine = Arc::new(IndexEngine::default());
//! engine.register_index(
//!     IndexDefinition::compound("user_interests", ["user_id", "category_id"]),
//!     Backfill::None,
//! )?;
//!
//! let store = MemoryDocumentStore::new();
//! store.attach_hook(engine.clone());
//! store.put(Document::new("u1").with_field("user_id", 1).with_field("category_id", 5), false);
//!
//! let hits: Vec<_> = engine.point_lookup("user_interests", &tuple![1, 5])?.collect();
//! ```
//!
//! # Architecture
//!
//! - `stratadex-core`: documents, tuples, mutations, errors and the traits
//!   at the seam with the base store
//! - `stratadex-storage`: key codec, ordered index tables, aggregate tables,
//!   lock stripes and an in-memory base store
//! - `stratadex-engine`: registry, extraction, maintenance, reconciliation
//!   and queries

pub use stratadex_core::{
    tuple, DefinitionKind, Document, DocumentFilter, DocumentId, DocumentSource, Error,
    ExtractError, FieldValue, Limits, MaintenanceFailure, MaintenanceResult, Mutation,
    MutationHook, MutationKind, Result, Scalar, Tuple,
};
pub use stratadex_engine::{
    AggregatorDefinition, AggregatorInfo, AggregatorKind, Backfill, BackfillReport, EngineConfig,
    Extractor, FieldsExtractor, FnExtractor, IndexCursor, IndexDefinition, IndexEngine, IndexInfo,
    IndexKind, IndexStats, MultiFieldExtractor, PendingEntry, QueryFacade, ReconcileReport,
    ScanOptions, CONFIG_FILE_NAME,
};
pub use stratadex_storage::{AggregateValue, EncodedKey, KeyCodec, KeyRange, MemoryDocumentStore};

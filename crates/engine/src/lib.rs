//! Index engine for stratadex
//!
//! This crate keeps secondary indexes and aggregators in step with a
//! document store:
//! - Registry: named index and aggregator definitions
//! - Extraction: derived keys and group memberships from documents
//! - Maintenance: applying each mutation as a key diff or aggregate delta
//! - Reconciliation: repairing definitions that fell behind
//! - Queries: point lookups, range scans and aggregate reads
//!
//! [`IndexEngine`] is the entry point. Attach it to a base store as its
//! [`MutationHook`](stratadex_core::MutationHook).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod extract;
pub mod maintainer;
pub mod query;
pub mod reconcile;
pub mod registry;

pub use aggregator::AggregatorMaintainer;
pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use engine::{AggregatorInfo, Backfill, IndexEngine, IndexInfo, IndexStats};
pub use extract::{
    DerivedKeySet, ExtractionEngine, ExtractionRunner, Extractor, FieldsExtractor, FnExtractor,
    MultiFieldExtractor, DEFAULT_EXTRACTION_THREADS,
};
pub use maintainer::IndexMaintainer;
pub use query::{IndexCursor, QueryFacade, ScanOptions};
pub use reconcile::{BackfillReport, PendingEntry, PendingSet, ReconcileReport};
pub use registry::{
    AggregatorDefinition, AggregatorKind, AggregatorSlot, DefinitionRegistry, IndexDefinition,
    IndexKind, IndexSlot,
};

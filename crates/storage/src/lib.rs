//! Storage layer for Stratadex
//!
//! This crate implements the derived-data structures the engine maintains:
//! - KeyCodec / EncodedKey: order-preserving encoding of key tuples
//! - IndexTable: ordered (EncodedKey, DocumentId) entries with a reverse map
//! - AggregateTable: per-group reducer state changed only through deltas
//! - DocumentLocks: striped per-document exclusion
//! - MemoryDocumentStore: in-memory base store that drives a MutationHook
//!
//! None of these types synchronize internally except `DocumentLocks` and
//! `MemoryDocumentStore`; the engine owns the locks around tables.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod codec;
pub mod document_store;
pub mod index;
pub mod locks;

pub use aggregate::{AggregateDelta, AggregateTable, AggregateValue, Membership, Reducer};
pub use codec::{EncodedKey, KeyCodec, KeyRange};
pub use document_store::{MemoryDocumentStore, WriteOutcome};
pub use index::{ApplyCounts, IndexEntry, IndexTable};
pub use locks::DocumentLocks;

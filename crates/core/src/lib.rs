//! Core types for Stratadex
//!
//! This crate defines the foundational types used throughout the system:
//! - Scalar / FieldValue: values held by documents and index keys
//! - Tuple: ordered scalar list used as index key or aggregation group
//! - Document / DocumentId: the records the base store hands to the indexer
//! - Mutation: insert / update / delete notifications from the base store
//! - DocumentFilter: optional field predicate restricting a definition
//! - Error: error type hierarchy
//! - Limits: bounds on extracted key sets
//! - Traits: the base-store seams (MutationHook, DocumentSource)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod error;
pub mod filter;
pub mod limits;
pub mod traits;
pub mod types;
pub mod value;

pub use document::Document;
pub use error::{DefinitionKind, Error, ExtractError, MaintenanceFailure, Result};
pub use filter::{DocumentFilter, FilterOp};
pub use limits::Limits;
pub use traits::{DocumentSource, MaintenanceResult, MutationHook};
pub use types::{DocumentId, Mutation, MutationKind, Tuple};
pub use value::{FieldValue, Scalar};

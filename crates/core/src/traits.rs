//! Core traits at the seam between the base store and the indexing layer
//!
//! The base store is an external collaborator. It talks to the indexing
//! layer through two traits:
//!
//! - [`MutationHook`]: called synchronously after the base store has applied
//!   a document change, with the prior content for updates and deletes.
//! - [`DocumentSource`]: read access to current documents, used for backfill
//!   and reconciliation.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use crate::document::Document;
use crate::error::{Error, MaintenanceFailure, Result};
use crate::types::{DocumentId, Mutation, MutationKind};
use std::sync::Arc;

/// Outcome of propagating one mutation to indexes and aggregators
///
/// Failures never abort the base-store mutation. They are reported here so
/// the caller (or a reconciler) can schedule re-extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceResult {
    /// Mutated document
    pub document: DocumentId,
    /// Kind of mutation applied
    pub kind: MutationKind,
    /// Index entries removed across all indexes
    pub entries_removed: usize,
    /// Index entries added across all indexes
    pub entries_added: usize,
    /// Aggregate deltas applied across all aggregators
    pub deltas_applied: usize,
    /// Definitions that fell behind
    pub failures: Vec<MaintenanceFailure>,
}

impl MaintenanceResult {
    /// Empty result for a mutation
    pub fn new(document: DocumentId, kind: MutationKind) -> Self {
        Self {
            document,
            kind,
            entries_removed: 0,
            entries_added: 0,
            deltas_applied: 0,
            failures: Vec::new(),
        }
    }

    /// True when every definition applied the mutation
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when nothing changed in any derived structure
    pub fn is_noop(&self) -> bool {
        self.entries_removed == 0 && self.entries_added == 0 && self.deltas_applied == 0
    }

    /// Names of definitions that fell behind
    pub fn failed_definitions(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.definition.as_str()).collect()
    }

    /// Convert into `Ok(())` or `Err(Error::PartialFailure)`
    pub fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(Error::PartialFailure(self.failures))
        }
    }
}

/// Receives document mutations from the base store
pub trait MutationHook: Send + Sync {
    /// Propagate a mutation that the base store has already applied
    fn on_mutation(&self, mutation: &Mutation) -> MaintenanceResult;
}

/// Read access to the base store's current documents
pub trait DocumentSource: Send + Sync {
    /// Current content of a document, if it exists
    fn get_document(&self, id: &DocumentId) -> Option<Arc<Document>>;

    /// Visit every document; the visitor returns `false` to stop early
    fn for_each_document(&self, visitor: &mut dyn FnMut(&Arc<Document>) -> bool);

    /// Number of documents currently stored
    fn document_count(&self) -> usize;
}

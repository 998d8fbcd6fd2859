//! Aggregator maintenance
//!
//! A mutation moves a document out of its old groups and into its new
//! ones. The old groups are the memberships recorded when the document last
//! contributed, which equal the groups of the prior content whenever the
//! aggregator is up to date. Using the record means a document can only
//! leave groups it actually joined: deleting a document that never
//! contributed changes nothing.
//!
//! Per group the combination is kind-specific (count, sum, min, max) and is
//! carried out by the storage `AggregateTable` under its write lock.

use crate::extract::ExtractionEngine;
use crate::registry::AggregatorSlot;
use std::sync::Arc;
use stratadex_core::{Document, DocumentId, ExtractError, Mutation};
use tracing::trace;

/// Applies mutations to aggregators
#[derive(Debug, Clone, Default)]
pub struct AggregatorMaintainer {
    extraction: ExtractionEngine,
}

impl AggregatorMaintainer {
    /// Create over an extraction engine
    pub fn new(extraction: ExtractionEngine) -> Self {
        Self { extraction }
    }

    /// Apply one mutation to one aggregator, returning deltas applied
    ///
    /// On error nothing is applied. The caller must hold the document's lock.
    pub fn apply(&self, slot: &AggregatorSlot, mutation: &Mutation) -> Result<usize, ExtractError> {
        let applied = self.replace(slot, mutation.document_id(), mutation.current())?;
        trace!(
            target: "stratadex::aggregate",
            aggregator = slot.name(),
            document = %mutation.document_id(),
            kind = %mutation.kind(),
            applied,
            "Aggregator updated"
        );
        Ok(applied)
    }

    /// Make the aggregator reflect exactly the current content of a document
    ///
    /// `None` withdraws the document from every group.
    pub fn replace(
        &self,
        slot: &AggregatorSlot,
        id: &DocumentId,
        current: Option<&Arc<Document>>,
    ) -> Result<usize, ExtractError> {
        match current {
            Some(doc) => {
                let memberships = self.extraction.memberships(&slot.definition, doc)?;
                slot.table.write().replace_document(id, memberships)
            }
            None => Ok(slot.table.write().remove_document(id)),
        }
    }
}

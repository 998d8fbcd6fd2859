//! Index maintenance: diffing derived keys and applying the change
//!
//! For one index and one mutation:
//!
//! 1. `new` = keys of the current document (empty for a delete)
//! 2. `old` = keys of the prior document (empty for an insert)
//! 3. remove `old − new`, add `new − old`
//!
//! Step 3 runs under the index's write lock, so readers see either none or
//! all of the change. Extraction happens before the lock is taken.
//!
//! When the prior content cannot be trusted (its extraction fails, or the
//! pair is waiting for reconciliation) the keys currently stored for the
//! document stand in for `old`, so stale entries are still removed.

use crate::extract::ExtractionEngine;
use crate::registry::IndexSlot;
use std::collections::BTreeSet;
use std::sync::Arc;
use stratadex_core::{Document, DocumentId, ExtractError, Mutation};
use stratadex_storage::{ApplyCounts, EncodedKey};
use tracing::debug;

/// Applies mutations to indexes
#[derive(Debug, Clone, Default)]
pub struct IndexMaintainer {
    extraction: ExtractionEngine,
}

impl IndexMaintainer {
    /// Create over an extraction engine
    pub fn new(extraction: ExtractionEngine) -> Self {
        Self { extraction }
    }

    /// Extraction engine in use
    pub fn extraction(&self) -> &ExtractionEngine {
        &self.extraction
    }

    /// Apply one mutation to one index
    ///
    /// `stale` marks a document whose stored entries are known to disagree
    /// with its prior content. On error nothing is applied.
    ///
    /// The caller must hold the document's lock.
    pub fn apply(
        &self,
        slot: &IndexSlot,
        mutation: &Mutation,
        stale: bool,
    ) -> Result<ApplyCounts, ExtractError> {
        let definition = &slot.definition;
        let id = mutation.document_id();

        let new_keys = match mutation.current() {
            Some(doc) => self.extraction.index_keys(definition, doc)?,
            None => BTreeSet::new(),
        };

        let prior = mutation.prior().filter(|_| mutation.is_consistent() && !stale);
        let derived_old = prior.map(|doc| self.extraction.index_keys(definition, doc));
        let old_keys = match derived_old {
            Some(Ok(keys)) => keys,
            Some(Err(e)) => {
                debug!(
                    target: "stratadex::maintain",
                    index = definition.name(),
                    document = %id,
                    error = %e,
                    "Prior extraction failed, diffing against stored keys"
                );
                self.stored_keys(slot, mutation)
            }
            None => self.stored_keys(slot, mutation),
        };

        let remove: Vec<EncodedKey> = old_keys.difference(&new_keys).cloned().collect();
        let add: Vec<EncodedKey> = new_keys.difference(&old_keys).cloned().collect();
        if remove.is_empty() && add.is_empty() {
            return Ok(ApplyCounts::default());
        }
        Ok(slot.table.write().apply(id, &remove, &add))
    }

    /// Make the index hold exactly the current keys of a document
    ///
    /// Used by backfill and reconciliation; `None` removes the document's
    /// entries.
    pub fn replace(
        &self,
        slot: &IndexSlot,
        id: &DocumentId,
        current: Option<&Arc<Document>>,
    ) -> Result<ApplyCounts, ExtractError> {
        match current {
            Some(doc) => {
                let keys = self.extraction.index_keys(&slot.definition, doc)?;
                Ok(slot.table.write().replace_document(id, &keys))
            }
            None => Ok(ApplyCounts {
                removed: slot.table.write().remove_document(id),
                added: 0,
            }),
        }
    }

    fn stored_keys(&self, slot: &IndexSlot, mutation: &Mutation) -> BTreeSet<EncodedKey> {
        slot.table
            .read()
            .keys_for_document(mutation.document_id())
            .cloned()
            .unwrap_or_default()
    }
}

//! In-memory base store
//!
//! `MemoryDocumentStore` is a minimal document store that plays the base
//! store's part: it applies puts and deletes, then synchronously hands the
//! resulting [`Mutation`] (with prior content) to an attached
//! [`MutationHook`]. It also serves as the [`DocumentSource`] for backfill
//! and reconciliation.
//!
//! # Ordering
//!
//! The store's per-document stripe is held from the write until the hook
//! returns, so two writes to one document reach the hook in the order they
//! were applied to the store.

use crate::locks::DocumentLocks;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use stratadex_core::{
    Document, DocumentId, DocumentSource, MaintenanceResult, Mutation, MutationHook, MutationKind,
};

/// Result of one store write
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Mutation applied, or `None` when the write was skipped
    pub kind: Option<MutationKind>,
    /// What the hook reported, when one is attached and the write applied
    pub maintenance: Option<MaintenanceResult>,
}

impl WriteOutcome {
    fn skipped() -> Self {
        Self {
            kind: None,
            maintenance: None,
        }
    }

    /// Whether the store changed
    pub fn applied(&self) -> bool {
        self.kind.is_some()
    }

    /// Whether every definition kept up (true when no hook ran)
    pub fn maintenance_ok(&self) -> bool {
        self.maintenance.as_ref().map(|m| m.is_ok()).unwrap_or(true)
    }
}

/// DashMap-backed document store with an optional mutation hook
pub struct MemoryDocumentStore {
    documents: DashMap<DocumentId, Arc<Document>>,
    locks: DocumentLocks,
    hook: RwLock<Option<Arc<dyn MutationHook>>>,
}

impl MemoryDocumentStore {
    /// Create an empty store without a hook
    pub fn new() -> Self {
        Self::with_stripes(crate::locks::DEFAULT_STRIPES)
    }

    /// Create an empty store with a given number of lock stripes
    pub fn with_stripes(stripes: usize) -> Self {
        Self {
            documents: DashMap::new(),
            locks: DocumentLocks::new(stripes),
            hook: RwLock::new(None),
        }
    }

    /// Attach the hook that receives every applied mutation
    ///
    /// Replaces any previously attached hook.
    pub fn attach_hook(&self, hook: Arc<dyn MutationHook>) {
        *self.hook.write() = Some(hook);
    }

    /// Detach the hook; later writes are not propagated
    pub fn detach_hook(&self) -> Option<Arc<dyn MutationHook>> {
        self.hook.write().take()
    }

    /// Insert or replace a document
    ///
    /// With `only_if_absent`, an existing document is left untouched and the
    /// write is reported as skipped.
    pub fn put(&self, document: Document, only_if_absent: bool) -> WriteOutcome {
        let id = document.id().clone();
        let _guard = self.locks.lock(&id);

        let current = Arc::new(document);
        let prior = if only_if_absent {
            match self.documents.entry(id) {
                dashmap::mapref::entry::Entry::Occupied(_) => return WriteOutcome::skipped(),
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&current));
                    None
                }
            }
        } else {
            self.documents.insert(id, Arc::clone(&current))
        };

        let mutation = match prior {
            Some(prior) => Mutation::update(prior, current),
            None => Mutation::insert(current),
        };
        self.notify(mutation)
    }

    /// Delete a document; deleting an absent document is skipped
    pub fn delete(&self, id: &DocumentId) -> WriteOutcome {
        let _guard = self.locks.lock(id);
        match self.documents.remove(id) {
            Some((_, prior)) => self.notify(Mutation::delete(prior)),
            None => WriteOutcome::skipped(),
        }
    }

    /// Current content of a document
    pub fn get(&self, id: &DocumentId) -> Option<Arc<Document>> {
        self.documents.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Check whether a document exists
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn notify(&self, mutation: Mutation) -> WriteOutcome {
        let kind = mutation.kind();
        let hook = self.hook.read().clone();
        WriteOutcome {
            kind: Some(kind),
            maintenance: hook.map(|h| h.on_mutation(&mutation)),
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentSource for MemoryDocumentStore {
    fn get_document(&self, id: &DocumentId) -> Option<Arc<Document>> {
        self.get(id)
    }

    fn for_each_document(&self, visitor: &mut dyn FnMut(&Arc<Document>) -> bool) {
        // Snapshot ids first so no map shard is locked while the visitor runs
        let mut ids: Vec<DocumentId> = self.documents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        for id in ids {
            if let Some(doc) = self.get(&id) {
                if !visitor(&doc) {
                    break;
                }
            }
        }
    }

    fn document_count(&self) -> usize {
        self.len()
    }
}

//! Bookkeeping for definitions that fell behind
//!
//! Every per-definition failure during maintenance is recorded as a
//! [`PendingEntry`]. Reconciliation re-derives the recorded pairs from the
//! base store's current content and clears the ones that succeed.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use stratadex_core::{DefinitionKind, DocumentId, MaintenanceFailure};

/// A `(definition, document)` pair waiting for re-extraction
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Index or aggregator
    pub kind: DefinitionKind,
    /// Definition name
    pub definition: String,
    /// Affected document
    pub document: DocumentId,
}

impl PendingEntry {
    /// Create an entry
    pub fn new(kind: DefinitionKind, definition: impl Into<String>, document: DocumentId) -> Self {
        Self {
            kind,
            definition: definition.into(),
            document,
        }
    }
}

impl From<&MaintenanceFailure> for PendingEntry {
    fn from(failure: &MaintenanceFailure) -> Self {
        Self::new(
            failure.kind,
            failure.definition.clone(),
            failure.document.clone(),
        )
    }
}

/// Set of pending pairs
#[derive(Debug, Default)]
pub struct PendingSet {
    entries: Mutex<BTreeSet<PendingEntry>>,
}

impl PendingSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair; returns `false` if it was already pending
    pub fn record(&self, entry: PendingEntry) -> bool {
        self.entries.lock().insert(entry)
    }

    /// Clear a pair; returns `true` if it was pending
    pub fn resolve(&self, entry: &PendingEntry) -> bool {
        self.entries.lock().remove(entry)
    }

    /// Check a pair
    pub fn contains(&self, entry: &PendingEntry) -> bool {
        self.entries.lock().contains(entry)
    }

    /// Drop every pair of a definition
    pub fn forget_definition(&self, kind: DefinitionKind, definition: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| !(e.kind == kind && e.definition == definition));
        before - entries.len()
    }

    /// Ordered copy of all pairs
    pub fn snapshot(&self) -> Vec<PendingEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every pair
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Outcome of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pairs examined
    pub attempted: usize,
    /// Pairs brought back in line
    pub repaired: usize,
    /// Pairs whose definition no longer exists
    pub dropped: usize,
    /// Index entries removed
    pub entries_removed: usize,
    /// Index entries added
    pub entries_added: usize,
    /// Aggregate deltas applied
    pub deltas_applied: usize,
    /// Pairs that failed again and stay pending
    pub still_failing: Vec<MaintenanceFailure>,
}

impl ReconcileReport {
    /// True when nothing is left pending from this pass
    pub fn is_clean(&self) -> bool {
        self.still_failing.is_empty()
    }
}

/// Outcome of backfilling one definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Definition name
    pub definition: String,
    /// Documents visited
    pub documents: usize,
    /// Index entries or aggregate deltas written
    pub changes: usize,
    /// Documents whose extraction failed; they are pending reconciliation
    pub failures: Vec<MaintenanceFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: DefinitionKind, def: &str, doc: &str) -> PendingEntry {
        PendingEntry::new(kind, def, DocumentId::from(doc))
    }

    #[test]
    fn test_record_and_resolve() {
        let set = PendingSet::new();
        assert!(set.record(entry(DefinitionKind::Index, "a", "d1")));
        assert!(!set.record(entry(DefinitionKind::Index, "a", "d1")));
        assert!(set.contains(&entry(DefinitionKind::Index, "a", "d1")));
        assert!(!set.contains(&entry(DefinitionKind::Aggregator, "a", "d1")));
        assert!(set.resolve(&entry(DefinitionKind::Index, "a", "d1")));
        assert!(set.is_empty());
    }

    #[test]
    fn test_forget_definition() {
        let set = PendingSet::new();
        set.record(entry(DefinitionKind::Index, "a", "d1"));
        set.record(entry(DefinitionKind::Index, "a", "d2"));
        set.record(entry(DefinitionKind::Index, "b", "d1"));
        set.record(entry(DefinitionKind::Aggregator, "a", "d1"));
        assert_eq!(set.forget_definition(DefinitionKind::Index, "a"), 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let set = PendingSet::new();
        set.record(entry(DefinitionKind::Aggregator, "z", "d"));
        set.record(entry(DefinitionKind::Index, "b", "d"));
        set.record(entry(DefinitionKind::Index, "a", "d"));
        let names: Vec<_> = set.snapshot().into_iter().map(|e| e.definition).collect();
        assert_eq!(names, vec!["a", "b", "z"]);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_entry_from_failure() {
        let failure = MaintenanceFailure {
            definition: "idx".into(),
            kind: DefinitionKind::Index,
            document: DocumentId::from("d"),
            cause: stratadex_core::ExtractError::custom("x"),
        };
        assert_eq!(
            PendingEntry::from(&failure),
            entry(DefinitionKind::Index, "idx", "d")
        );
    }
}

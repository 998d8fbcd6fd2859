//! Backing ordered structure for one secondary index
//!
//! An [`IndexTable`] stores index entries `(EncodedKey, DocumentId)`:
//! - Forward map: EncodedKey → ordered set of DocumentIds, for scans
//! - Reverse map: DocumentId → set of EncodedKeys, for per-document
//!   replacement during backfill and reconciliation
//!
//! Uniqueness is on the pair: many documents may share a derived key, and
//! entries under one key iterate by DocumentId ascending.
//!
//! The table itself is not synchronized. The engine wraps each table in its
//! own lock so that the remove-set and add-set of one mutation are applied
//! in a single critical section.

use crate::codec::{EncodedKey, KeyRange};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use stratadex_core::DocumentId;

/// One index entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexEntry {
    /// Derived key
    pub key: EncodedKey,
    /// Document the key was derived from
    pub document: DocumentId,
}

/// Counts of entries actually changed by an apply call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyCounts {
    /// Entries removed
    pub removed: usize,
    /// Entries added
    pub added: usize,
}

/// Secondary index: EncodedKey → DocumentIds (plus the reverse mapping)
#[derive(Debug, Default)]
pub struct IndexTable {
    forward: BTreeMap<EncodedKey, BTreeSet<DocumentId>>,
    reverse: FxHashMap<DocumentId, BTreeSet<EncodedKey>>,
    entries: usize,
}

impl IndexTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one entry
    ///
    /// Returns `false` if the pair was already present.
    pub fn insert(&mut self, key: EncodedKey, document: DocumentId) -> bool {
        let inserted = self
            .forward
            .entry(key.clone())
            .or_default()
            .insert(document.clone());
        if inserted {
            self.reverse.entry(document).or_default().insert(key);
            self.entries += 1;
        }
        inserted
    }

    /// Remove one entry
    ///
    /// Empty key and document sets are dropped so they do not accumulate.
    /// Returns `false` if the pair was not present.
    pub fn remove(&mut self, key: &EncodedKey, document: &DocumentId) -> bool {
        let Some(docs) = self.forward.get_mut(key) else {
            return false;
        };
        if !docs.remove(document) {
            return false;
        }
        if docs.is_empty() {
            self.forward.remove(key);
        }
        if let Some(keys) = self.reverse.get_mut(document) {
            keys.remove(key);
            if keys.is_empty() {
                self.reverse.remove(document);
            }
        }
        self.entries -= 1;
        true
    }

    /// Apply the remove-set then the add-set of one mutation
    pub fn apply(
        &mut self,
        document: &DocumentId,
        remove: &[EncodedKey],
        add: &[EncodedKey],
    ) -> ApplyCounts {
        let mut counts = ApplyCounts::default();
        for key in remove {
            if self.remove(key, document) {
                counts.removed += 1;
            }
        }
        for key in add {
            if self.insert(key.clone(), document.clone()) {
                counts.added += 1;
            }
        }
        counts
    }

    /// Make `keys` the exact key set of `document`
    ///
    /// Entries not in `keys` are removed and missing ones added.
    pub fn replace_document(
        &mut self,
        document: &DocumentId,
        keys: &BTreeSet<EncodedKey>,
    ) -> ApplyCounts {
        let stale: Vec<EncodedKey> = match self.reverse.get(document) {
            Some(current) => current.difference(keys).cloned().collect(),
            None => Vec::new(),
        };
        let fresh: Vec<EncodedKey> = match self.reverse.get(document) {
            Some(current) => keys.difference(current).cloned().collect(),
            None => keys.iter().cloned().collect(),
        };
        self.apply(document, &stale, &fresh)
    }

    /// Remove every entry of a document
    pub fn remove_document(&mut self, document: &DocumentId) -> usize {
        let keys: Vec<EncodedKey> = match self.reverse.get(document) {
            Some(keys) => keys.iter().cloned().collect(),
            None => return 0,
        };
        self.apply(document, &keys, &[]).removed
    }

    /// Keys currently stored for a document
    pub fn keys_for_document(&self, document: &DocumentId) -> Option<&BTreeSet<EncodedKey>> {
        self.reverse.get(document)
    }

    /// Documents stored under an exact key
    pub fn get(&self, key: &EncodedKey) -> Option<&BTreeSet<DocumentId>> {
        self.forward.get(key)
    }

    /// Check for one entry
    pub fn contains(&self, key: &EncodedKey, document: &DocumentId) -> bool {
        self.forward
            .get(key)
            .map(|docs| docs.contains(document))
            .unwrap_or(false)
    }

    /// Collect up to `limit` entries inside `range`, resuming after `after`
    ///
    /// Forward scans return entries ascending by key then document; reverse
    /// scans return the exact opposite order. `after` is the last entry a
    /// previous batch returned; it need not still exist.
    pub fn scan_batch(
        &self,
        range: &KeyRange,
        after: Option<&IndexEntry>,
        reverse: bool,
        limit: usize,
    ) -> Vec<IndexEntry> {
        let mut out = Vec::new();
        if limit == 0 || range.is_empty() {
            return out;
        }

        if reverse {
            let mut upper = range.upper.as_ref();
            if let Some(pos) = after {
                if let Some(docs) = self.forward.get(&pos.key) {
                    for doc in docs.range(..&pos.document).rev() {
                        out.push(IndexEntry {
                            key: pos.key.clone(),
                            document: doc.clone(),
                        });
                        if out.len() >= limit {
                            return out;
                        }
                    }
                }
                upper = Bound::Excluded(&pos.key);
            }
            let bounds = KeyRangeRef::new(range.lower.as_ref(), upper);
            if bounds.is_empty() {
                return out;
            }
            for (key, docs) in self.forward.range((bounds.lower, bounds.upper)).rev() {
                for doc in docs.iter().rev() {
                    out.push(IndexEntry {
                        key: key.clone(),
                        document: doc.clone(),
                    });
                    if out.len() >= limit {
                        return out;
                    }
                }
            }
        } else {
            let mut lower = range.lower.as_ref();
            if let Some(pos) = after {
                if let Some(docs) = self.forward.get(&pos.key) {
                    for doc in docs.range((Bound::Excluded(&pos.document), Bound::Unbounded)) {
                        out.push(IndexEntry {
                            key: pos.key.clone(),
                            document: doc.clone(),
                        });
                        if out.len() >= limit {
                            return out;
                        }
                    }
                }
                lower = Bound::Excluded(&pos.key);
            }
            let bounds = KeyRangeRef::new(lower, range.upper.as_ref());
            if bounds.is_empty() {
                return out;
            }
            for (key, docs) in self.forward.range((bounds.lower, bounds.upper)) {
                for doc in docs {
                    out.push(IndexEntry {
                        key: key.clone(),
                        document: doc.clone(),
                    });
                    if out.len() >= limit {
                        return out;
                    }
                }
            }
        }
        out
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.entries = 0;
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of distinct keys
    pub fn distinct_keys(&self) -> usize {
        self.forward.len()
    }

    /// Number of documents with at least one entry
    pub fn documents(&self) -> usize {
        self.reverse.len()
    }
}

/// Borrowed bounds, checked before handing them to `BTreeMap::range`
struct KeyRangeRef<'a> {
    lower: Bound<&'a EncodedKey>,
    upper: Bound<&'a EncodedKey>,
}

impl<'a> KeyRangeRef<'a> {
    fn new(lower: Bound<&'a EncodedKey>, upper: Bound<&'a EncodedKey>) -> Self {
        Self { lower, upper }
    }

    fn is_empty(&self) -> bool {
        match (self.lower, self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyCodec;
    use stratadex_core::tuple;

    fn key(t: stratadex_core::Tuple) -> EncodedKey {
        KeyCodec.encode(&t)
    }

    fn doc(id: &str) -> DocumentId {
        DocumentId::from(id)
    }

    fn docs_of(entries: &[IndexEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.document.as_str()).collect()
    }

    // ========================================
    // Insert / Remove Tests
    // ========================================

    #[test]
    fn test_insert_and_get() {
        let mut table = IndexTable::new();
        assert!(table.insert(key(tuple![1, 5]), doc("a")));
        assert!(table.insert(key(tuple![1, 5]), doc("b")));
        assert!(!table.insert(key(tuple![1, 5]), doc("a")));

        let docs = table.get(&key(tuple![1, 5])).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.distinct_keys(), 1);
        assert_eq!(table.documents(), 2);
    }

    #[test]
    fn test_remove_cleans_up_empty_sets() {
        let mut table = IndexTable::new();
        table.insert(key(tuple!["x"]), doc("a"));
        assert!(table.remove(&key(tuple!["x"]), &doc("a")));
        assert!(!table.remove(&key(tuple!["x"]), &doc("a")));
        assert!(table.get(&key(tuple!["x"])).is_none());
        assert!(table.keys_for_document(&doc("a")).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_apply_counts_only_real_changes() {
        let mut table = IndexTable::new();
        table.insert(key(tuple!["old"]), doc("a"));
        let counts = table.apply(
            &doc("a"),
            &[key(tuple!["old"]), key(tuple!["never"])],
            &[key(tuple!["new"]), key(tuple!["new"])],
        );
        assert_eq!(counts, ApplyCounts { removed: 1, added: 1 });
        assert!(table.contains(&key(tuple!["new"]), &doc("a")));
        assert!(!table.contains(&key(tuple!["old"]), &doc("a")));
    }

    #[test]
    fn test_replace_document() {
        let mut table = IndexTable::new();
        table.insert(key(tuple!["a"]), doc("d"));
        table.insert(key(tuple!["b"]), doc("d"));
        table.insert(key(tuple!["b"]), doc("other"));

        let wanted: BTreeSet<_> = [key(tuple!["b"]), key(tuple!["c"])].into_iter().collect();
        let counts = table.replace_document(&doc("d"), &wanted);
        assert_eq!(counts, ApplyCounts { removed: 1, added: 1 });
        assert_eq!(table.keys_for_document(&doc("d")), Some(&wanted));
        assert!(table.contains(&key(tuple!["b"]), &doc("other")));
    }

    #[test]
    fn test_remove_document() {
        let mut table = IndexTable::new();
        table.insert(key(tuple!["a"]), doc("d"));
        table.insert(key(tuple!["b"]), doc("d"));
        table.insert(key(tuple!["a"]), doc("e"));
        assert_eq!(table.remove_document(&doc("d")), 2);
        assert_eq!(table.remove_document(&doc("d")), 0);
        assert_eq!(table.len(), 1);
    }

    // ========================================
    // Scan Tests
    // ========================================

    fn sample() -> IndexTable {
        let mut table = IndexTable::new();
        table.insert(key(tuple![1, 5]), doc("b"));
        table.insert(key(tuple![1, 5]), doc("a"));
        table.insert(key(tuple![1, 6]), doc("c"));
        table.insert(key(tuple![2, 1]), doc("d"));
        table
    }

    #[test]
    fn test_scan_orders_by_key_then_document() {
        let table = sample();
        let all = table.scan_batch(&KeyRange::all(), None, false, usize::MAX);
        assert_eq!(docs_of(&all), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_scan_reverse() {
        let table = sample();
        let all = table.scan_batch(&KeyRange::all(), None, true, usize::MAX);
        assert_eq!(docs_of(&all), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_scan_prefix() {
        let table = sample();
        let range = KeyRange::prefix(key(tuple![1]));
        let hits = table.scan_batch(&range, None, false, 10);
        assert_eq!(docs_of(&hits), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scan_resumes_inside_duplicate_key() {
        let table = sample();
        let first = table.scan_batch(&KeyRange::all(), None, false, 1);
        assert_eq!(docs_of(&first), vec!["a"]);
        let second = table.scan_batch(&KeyRange::all(), first.last(), false, 2);
        assert_eq!(docs_of(&second), vec!["b", "c"]);
        let third = table.scan_batch(&KeyRange::all(), second.last(), false, 10);
        assert_eq!(docs_of(&third), vec!["d"]);
        let done = table.scan_batch(&KeyRange::all(), third.last(), false, 10);
        assert!(done.is_empty());
    }

    #[test]
    fn test_scan_reverse_resumes() {
        let table = sample();
        let first = table.scan_batch(&KeyRange::all(), None, true, 3);
        assert_eq!(docs_of(&first), vec!["d", "c", "b"]);
        let rest = table.scan_batch(&KeyRange::all(), first.last(), true, 10);
        assert_eq!(docs_of(&rest), vec!["a"]);
    }

    #[test]
    fn test_scan_resume_after_removed_position() {
        let mut table = sample();
        let first = table.scan_batch(&KeyRange::all(), None, false, 3);
        table.remove(&key(tuple![1, 6]), &doc("c"));
        let rest = table.scan_batch(&KeyRange::all(), first.last(), false, 10);
        assert_eq!(docs_of(&rest), vec!["d"]);
    }

    #[test]
    fn test_scan_inverted_bounds_is_empty() {
        let table = sample();
        let range = KeyRange::new(
            Bound::Included(key(tuple![2])),
            Bound::Included(key(tuple![1])),
        );
        assert!(table.scan_batch(&range, None, false, 10).is_empty());
        assert!(table.scan_batch(&range, None, true, 10).is_empty());
    }

    #[test]
    fn test_scan_resume_at_upper_bound() {
        let table = sample();
        let range = KeyRange::new(
            Bound::Included(key(tuple![1, 5])),
            Bound::Included(key(tuple![1, 6])),
        );
        let first = table.scan_batch(&range, None, false, 3);
        assert_eq!(docs_of(&first), vec!["a", "b", "c"]);
        assert!(table.scan_batch(&range, first.last(), false, 3).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut table = sample();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.distinct_keys(), 0);
        assert_eq!(table.documents(), 0);
    }

    #[test]
    fn test_default() {
        let table = IndexTable::default();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }
}

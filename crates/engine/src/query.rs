//! Read surface over indexes and aggregators
//!
//! Lookups return an [`IndexCursor`]: a lazy iterator of document ids that
//! fetches entries in batches, taking the index's read lock only for the
//! duration of one batch. A cursor remembers the last entry it fetched and
//! resumes strictly after it, so entries added or removed between batches
//! never cause an entry to be returned twice. `restart()` rewinds it to the
//! beginning of its range.
//!
//! Cursors observe whatever the maintainers last committed; they never
//! block writers beyond one batch read.

use crate::registry::{DefinitionRegistry, IndexSlot};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use stratadex_core::{DocumentId, Error, Result, Tuple};
use stratadex_storage::{AggregateValue, EncodedKey, IndexEntry, KeyCodec, KeyRange};
use tracing::debug;

/// Direction and size of a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Iterate from the high end
    pub reverse: bool,
    /// Stop after this many ids
    pub limit: Option<usize>,
}

impl ScanOptions {
    /// Ascending, unlimited
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate in descending order
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Stop after `limit` ids
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Lazy, restartable sequence of document ids from one index
pub struct IndexCursor {
    slot: Arc<IndexSlot>,
    range: KeyRange,
    options: ScanOptions,
    batch_size: usize,
    buffer: VecDeque<IndexEntry>,
    position: Option<IndexEntry>,
    yielded: usize,
    exhausted: bool,
}

impl IndexCursor {
    fn new(slot: Arc<IndexSlot>, range: KeyRange, options: ScanOptions, batch_size: usize) -> Self {
        Self {
            slot,
            range,
            options,
            batch_size: batch_size.max(1),
            buffer: VecDeque::new(),
            position: None,
            yielded: 0,
            exhausted: false,
        }
    }

    /// Next entry with its encoded key
    pub fn next_entry(&mut self) -> Option<IndexEntry> {
        if let Some(limit) = self.options.limit {
            if self.yielded >= limit {
                return None;
            }
        }
        if self.buffer.is_empty() && !self.exhausted {
            self.fill();
        }
        let entry = self.buffer.pop_front()?;
        self.yielded += 1;
        Some(entry)
    }

    /// Next entry with its key decoded back into a tuple
    pub fn next_with_key(&mut self) -> Option<Result<(Tuple, DocumentId)>> {
        let entry = self.next_entry()?;
        Some(
            KeyCodec
                .decode(entry.key.as_bytes())
                .map(|tuple| (tuple, entry.document)),
        )
    }

    /// Rewind to the start of the range
    ///
    /// The next call re-reads the index, so it reflects changes committed
    /// since the cursor was created.
    pub fn restart(&mut self) {
        self.buffer.clear();
        self.position = None;
        self.yielded = 0;
        self.exhausted = false;
    }

    /// Name of the index being read
    pub fn index_name(&self) -> &str {
        self.slot.name()
    }

    fn fill(&mut self) {
        let batch = self.slot.table.read().scan_batch(
            &self.range,
            self.position.as_ref(),
            self.options.reverse,
            self.batch_size,
        );
        if batch.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some(last) = batch.last() {
            self.position = Some(last.clone());
        }
        self.buffer.extend(batch);
    }
}

impl Iterator for IndexCursor {
    type Item = DocumentId;

    fn next(&mut self) -> Option<DocumentId> {
        self.next_entry().map(|e| e.document)
    }
}

impl fmt::Debug for IndexCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexCursor")
            .field("index", &self.slot.name())
            .field("range", &self.range)
            .field("options", &self.options)
            .field("yielded", &self.yielded)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

/// Query entry point handed to the command layer
///
/// Cheap to clone; every clone reads the same registry.
#[derive(Clone)]
pub struct QueryFacade {
    registry: Arc<DefinitionRegistry>,
    codec: KeyCodec,
    batch_size: usize,
}

impl QueryFacade {
    /// Create over a registry
    pub fn new(registry: Arc<DefinitionRegistry>, batch_size: usize) -> Self {
        Self {
            registry,
            codec: KeyCodec,
            batch_size: batch_size.max(1),
        }
    }

    /// Documents whose key equals `prefix` or extends it, ascending
    ///
    /// # Errors
    ///
    /// `NotFound` if no index has this name.
    pub fn point_lookup(&self, index: &str, prefix: &Tuple) -> Result<IndexCursor> {
        self.scan_prefix(index, prefix, ScanOptions::default())
    }

    /// Prefix match with scan options
    pub fn scan_prefix(
        &self,
        index: &str,
        prefix: &Tuple,
        options: ScanOptions,
    ) -> Result<IndexCursor> {
        let slot = self.registry.index(index)?;
        let range = KeyRange::prefix(self.codec.encode(prefix));
        debug!(target: "stratadex::query", index, prefix = %prefix, reverse = options.reverse, "Prefix scan");
        Ok(IndexCursor::new(slot, range, options, self.batch_size))
    }

    /// Documents whose key lies between two bounds
    ///
    /// Bounds compare whole keys in tuple order, where a tuple sorts before
    /// every tuple that extends it: `Included((1,))` as an upper bound does
    /// not admit `(1, 5)`. Use [`QueryFacade::scan_prefix`] for that.
    ///
    /// # Errors
    ///
    /// `NotFound` if no index has this name.
    pub fn range_scan(
        &self,
        index: &str,
        low: Bound<Tuple>,
        high: Bound<Tuple>,
        options: ScanOptions,
    ) -> Result<IndexCursor> {
        let slot = self.registry.index(index)?;
        let range = KeyRange::new(self.encode_bound(low), self.encode_bound(high));
        debug!(target: "stratadex::query", index, range = ?range, reverse = options.reverse, "Range scan");
        Ok(IndexCursor::new(slot, range, options, self.batch_size))
    }

    /// Every entry of an index
    pub fn scan_all(&self, index: &str, options: ScanOptions) -> Result<IndexCursor> {
        self.range_scan(index, Bound::Unbounded, Bound::Unbounded, options)
    }

    /// Current value of one aggregator group
    ///
    /// # Errors
    ///
    /// `NotFound` if no aggregator has this name, `GroupNotFound` if the
    /// group has no members.
    pub fn aggregate_get(&self, aggregator: &str, group: &Tuple) -> Result<AggregateValue> {
        let slot = self.registry.aggregator(aggregator)?;
        let key = self.codec.encode(group);
        let value = slot.table.read().get(&key);
        value.ok_or_else(|| Error::GroupNotFound {
            aggregator: aggregator.to_string(),
            group: group.to_string(),
        })
    }

    fn encode_bound(&self, bound: Bound<Tuple>) -> Bound<EncodedKey> {
        match bound {
            Bound::Included(t) => Bound::Included(self.codec.encode(&t)),
            Bound::Excluded(t) => Bound::Excluded(self.codec.encode(&t)),
            Bound::Unbounded => Bound::Unbounded,
        }
    }
}

impl fmt::Debug for QueryFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryFacade")
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

//! Striped per-document exclusion
//!
//! Mutations of the same document must not interleave their
//! extract/diff/apply steps, while mutations of different documents should
//! run in parallel. A fixed array of mutexes is indexed by a hash of the
//! document id: two documents contend only when they land on the same stripe.

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use stratadex_core::DocumentId;

/// Default number of stripes
pub const DEFAULT_STRIPES: usize = 64;

/// Fixed set of mutexes keyed by document id hash
#[derive(Debug)]
pub struct DocumentLocks {
    stripes: Box<[Mutex<()>]>,
    mask: usize,
}

impl DocumentLocks {
    /// Create with `stripes` rounded up to a power of two (minimum 1)
    pub fn new(stripes: usize) -> Self {
        let count = stripes.max(1).next_power_of_two();
        let stripes: Vec<Mutex<()>> = (0..count).map(|_| Mutex::new(())).collect();
        Self {
            stripes: stripes.into_boxed_slice(),
            mask: count - 1,
        }
    }

    /// Number of stripes
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    /// Stripe index for a document
    pub fn stripe_of(&self, id: &DocumentId) -> usize {
        let mut hasher = FxHasher::default();
        id.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    /// Block until the document's stripe is free
    ///
    /// The guard must be dropped before locking another document from the
    /// same `DocumentLocks`; stripes are not re-entrant.
    pub fn lock(&self, id: &DocumentId) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(id)].lock()
    }
}

impl Default for DocumentLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

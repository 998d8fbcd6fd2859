//! Index key codec.
//!
//! Index keys are tuples of scalars. They are stored as [`EncodedKey`] byte
//! strings whose lexicographic order equals the tuple order, so ordered
//! structures keyed by `EncodedKey` support prefix and range scans directly.
//!
//! # Usage
//!
//! ```ignore
//! use stratadex_storage::codec::{KeyCodec, KeyRange};
//!
//! let codec = KeyCodec;
//! let key = codec.encode(&tuple![user_id, category_id]);
//! let range = KeyRange::prefix(codec.encode(&tuple![user_id]));
//! assert!(range.contains(&key));
//! ```

mod tuple;

pub use tuple::KeyCodec;

use smallvec::SmallVec;
use std::fmt;
use std::ops::Bound;

/// Encoded index key.
///
/// Short keys (the common case for numeric and short-string tuples) are
/// stored inline without a heap allocation.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EncodedKey(SmallVec<[u8; 24]>);

impl EncodedKey {
    /// Empty key (encoding of the empty tuple).
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Empty key with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(SmallVec::with_capacity(capacity))
    }

    /// Wrap raw bytes.
    ///
    /// The bytes are not validated; use [`KeyCodec::decode`] to check them.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(SmallVec::from_slice(bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for the empty key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether `prefix` is a byte prefix of this key.
    pub fn starts_with(&self, prefix: &EncodedKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub(crate) fn push(&mut self, b: u8) {
        self.0.push(b);
    }

    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    /// Smallest key strictly greater than every key starting with `self`.
    ///
    /// Returns `None` when no such key exists (empty key or all `0xFF`).
    pub fn prefix_successor(&self) -> Option<EncodedKey> {
        let mut bytes = self.0.clone();
        while let Some(last) = bytes.pop() {
            if last < 0xFF {
                bytes.push(last + 1);
                return Some(EncodedKey(bytes));
            }
        }
        None
    }
}

impl fmt::Debug for EncodedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedKey(")?;
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl AsRef<[u8]> for EncodedKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Bounds over encoded keys used by scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    /// Lower bound
    pub lower: Bound<EncodedKey>,
    /// Upper bound
    pub upper: Bound<EncodedKey>,
}

impl KeyRange {
    /// Range covering every key.
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Range with explicit bounds.
    pub fn new(lower: Bound<EncodedKey>, upper: Bound<EncodedKey>) -> Self {
        Self { lower, upper }
    }

    /// Range covering every key that starts with `prefix`.
    pub fn prefix(prefix: EncodedKey) -> Self {
        let upper = match prefix.prefix_successor() {
            Some(succ) => Bound::Excluded(succ),
            None => Bound::Unbounded,
        };
        Self {
            lower: Bound::Included(prefix),
            upper,
        }
    }

    /// Check whether a key lies inside the range.
    pub fn contains(&self, key: &EncodedKey) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Check whether the range can contain no key at all.
    ///
    /// Ordered-map range queries panic on inverted bounds, so scans test
    /// this first.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }
}

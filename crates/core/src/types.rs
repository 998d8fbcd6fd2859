//! Core types for the indexing layer
//!
//! This module defines the foundational types:
//! - DocumentId: Stable primary key of a document in the base store
//! - Tuple: Ordered list of scalars (an index key or aggregation group)
//! - Mutation: A document change reported by the base store

use crate::document::Document;
use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Primary key of a document
///
/// Owned by the base store. Index entries reference documents by this id,
/// and entries sharing a derived key are ordered by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the id, returning the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered list of scalar values
///
/// Tuples compare component-wise; a tuple that is a strict prefix of another
/// sorts first. This is the order preserved by the key codec.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tuple(Vec<Scalar>);

impl Tuple {
    /// Create an empty tuple
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a component, builder style
    pub fn push(mut self, value: impl Into<Scalar>) -> Self {
        self.0.push(value.into());
        self
    }

    /// Append all components of another tuple
    pub fn concat(mut self, other: &Tuple) -> Self {
        self.0.extend(other.0.iter().cloned());
        self
    }

    /// Components of the tuple
    pub fn values(&self) -> &[Scalar] {
        &self.0
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the tuple has no components
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether `prefix` is a component-wise prefix of this tuple
    pub fn starts_with(&self, prefix: &Tuple) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Consume the tuple, returning its components
    pub fn into_values(self) -> Vec<Scalar> {
        self.0
    }
}

impl From<Vec<Scalar>> for Tuple {
    fn from(values: Vec<Scalar>) -> Self {
        Self(values)
    }
}

impl FromIterator<Scalar> for Tuple {
    fn from_iter<I: IntoIterator<Item = Scalar>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

/// Build a [`Tuple`] from a list of values convertible into [`Scalar`]
///
/// ```
/// use stratadex_core::{tuple, Scalar};
///
/// let t = tuple![1, "books"];
/// assert_eq!(t.values(), &[Scalar::Int(1), Scalar::from("books")]);
/// ```
#[macro_export]
macro_rules! tuple {
    () => { $crate::Tuple::new() };
    ($($v:expr),+ $(,)?) => {
        $crate::Tuple::from(vec![$($crate::Scalar::from($v)),+])
    };
}

/// Kind of a document mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    /// Document did not exist before
    Insert,
    /// Document content replaced
    Update,
    /// Document removed
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Insert => write!(f, "insert"),
            MutationKind::Update => write!(f, "update"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A document change, reported by the base store after it has been applied
///
/// Documents are shared (`Arc`) so extraction can run on a worker thread
/// without copying document content.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// A new document
    Insert {
        /// Content after the mutation
        document: Arc<Document>,
    },
    /// An existing document replaced with new content
    Update {
        /// Content before the mutation
        prior: Arc<Document>,
        /// Content after the mutation
        document: Arc<Document>,
    },
    /// A document removed from the base store
    Delete {
        /// Content before the mutation
        prior: Arc<Document>,
    },
}

impl Mutation {
    /// Build an insert mutation
    pub fn insert(document: impl Into<Arc<Document>>) -> Self {
        Mutation::Insert {
            document: document.into(),
        }
    }

    /// Build an update mutation
    pub fn update(prior: impl Into<Arc<Document>>, document: impl Into<Arc<Document>>) -> Self {
        Mutation::Update {
            prior: prior.into(),
            document: document.into(),
        }
    }

    /// Build a delete mutation
    pub fn delete(prior: impl Into<Arc<Document>>) -> Self {
        Mutation::Delete {
            prior: prior.into(),
        }
    }

    /// Kind of the mutation
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Insert { .. } => MutationKind::Insert,
            Mutation::Update { .. } => MutationKind::Update,
            Mutation::Delete { .. } => MutationKind::Delete,
        }
    }

    /// Id of the mutated document
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Mutation::Insert { document } | Mutation::Update { document, .. } => document.id(),
            Mutation::Delete { prior } => prior.id(),
        }
    }

    /// Content after the mutation (None for Delete)
    pub fn current(&self) -> Option<&Arc<Document>> {
        match self {
            Mutation::Insert { document } | Mutation::Update { document, .. } => Some(document),
            Mutation::Delete { .. } => None,
        }
    }

    /// Content before the mutation (None for Insert)
    pub fn prior(&self) -> Option<&Arc<Document>> {
        match self {
            Mutation::Insert { .. } => None,
            Mutation::Update { prior, .. } | Mutation::Delete { prior } => Some(prior),
        }
    }

    /// Check that prior and current content belong to the same document
    pub fn is_consistent(&self) -> bool {
        match self {
            Mutation::Update { prior, document } => prior.id() == document.id(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;

    #[test]
    fn test_tuple_prefix_sorts_first() {
        assert!(tuple![1] < tuple![1, 0]);
        assert!(tuple![1, 5] < tuple![1, 6]);
        assert!(tuple![1, 5].starts_with(&tuple![1]));
        assert!(!tuple![1, 5].starts_with(&tuple![5]));
    }

    #[test]
    fn test_tuple_display() {
        assert_eq!(tuple![1, "a"].to_string(), "(1, \"a\")");
        assert_eq!(Tuple::new().to_string(), "()");
    }

    #[test]
    fn test_tuple_concat() {
        let t = tuple!["rust"].concat(&tuple!["2024-01-01"]);
        assert_eq!(t, tuple!["rust", "2024-01-01"]);
    }

    #[test]
    fn test_mutation_accessors() {
        let old = Document::new("d1").with_field("n", 1);
        let new = Document::new("d1").with_field("n", 2);
        let m = Mutation::update(old, new);
        assert_eq!(m.kind(), MutationKind::Update);
        assert_eq!(m.document_id().as_str(), "d1");
        assert!(m.prior().is_some());
        assert!(m.current().is_some());
        assert!(m.is_consistent());

        let d = Mutation::delete(Document::new("d2"));
        assert!(d.current().is_none());
        assert_eq!(d.document_id(), &DocumentId::from("d2"));
    }

    #[test]
    fn test_mutation_inconsistent_ids() {
        let m = Mutation::update(Document::new("a"), Document::new("b"));
        assert!(!m.is_consistent());
    }
}

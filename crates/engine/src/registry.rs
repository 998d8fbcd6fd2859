//! Named index and aggregator definitions
//!
//! The registry maps names to definitions together with their backing
//! structures. Index and aggregator names live in separate namespaces, and
//! names are unique within each: registering a taken name is rejected
//! rather than redefining it.
//!
//! The registry is read on every mutation and written only by
//! administrative calls, so it sits behind a single `RwLock`. Mutations work
//! on an `Arc` snapshot of the registered slots and never hold the registry
//! lock while touching a backing structure.

use crate::extract::{Extractor, FieldsExtractor, MultiFieldExtractor};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use stratadex_core::{Document, DocumentFilter, Error, Result};
use stratadex_storage::{AggregateTable, IndexTable, Reducer};

// ============================================================================
// Definitions
// ============================================================================

/// Shape of an index's derived key set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// At most one key per document
    Compound,
    /// Zero or more keys per document
    Multi,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Compound => write!(f, "compound"),
            IndexKind::Multi => write!(f, "multi"),
        }
    }
}

/// A named secondary index
#[derive(Clone)]
pub struct IndexDefinition {
    name: String,
    kind: IndexKind,
    extractor: Arc<dyn Extractor>,
    filter: Option<DocumentFilter>,
}

impl IndexDefinition {
    /// Index with a custom extractor
    pub fn new(name: impl Into<String>, kind: IndexKind, extractor: impl Extractor) -> Self {
        Self {
            name: name.into(),
            kind,
            extractor: Arc::new(extractor),
            filter: None,
        }
    }

    /// Compound index over scalar fields, in order
    pub fn compound<S: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(name, IndexKind::Compound, FieldsExtractor::new(fields))
    }

    /// Multi index over an array field plus required trailing fields
    pub fn multi<S: Into<String>>(
        name: impl Into<String>,
        array_field: impl Into<String>,
        trailing: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            IndexKind::Multi,
            MultiFieldExtractor::new(array_field, trailing),
        )
    }

    /// Restrict the index to documents matching a filter
    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Extractor
    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.extractor
    }

    /// Filter, if any
    pub fn filter(&self) -> Option<&DocumentFilter> {
        self.filter.as_ref()
    }

    /// Whether the definition applies to a document at all
    pub fn accepts(&self, document: &Document) -> bool {
        self.filter.as_ref().map(|f| f.matches(document)).unwrap_or(true)
    }

    fn validate(&self) -> Result<()> {
        validate_name(&self.name)
    }
}

impl fmt::Debug for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("extractor", &self.extractor.describe())
            .field("filter", &self.filter)
            .finish()
    }
}

/// Reducer of an aggregator together with its measure field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorKind {
    /// Count documents per group
    Counter,
    /// Sum a numeric field per group
    Sum {
        /// Measured field
        field: String,
    },
    /// Smallest value of a field per group
    Min {
        /// Measured field
        field: String,
    },
    /// Largest value of a field per group
    Max {
        /// Measured field
        field: String,
    },
}

impl AggregatorKind {
    /// Sum over `field`
    pub fn sum(field: impl Into<String>) -> Self {
        AggregatorKind::Sum {
            field: field.into(),
        }
    }

    /// Minimum of `field`
    pub fn min(field: impl Into<String>) -> Self {
        AggregatorKind::Min {
            field: field.into(),
        }
    }

    /// Maximum of `field`
    pub fn max(field: impl Into<String>) -> Self {
        AggregatorKind::Max {
            field: field.into(),
        }
    }

    /// Storage reducer
    pub fn reducer(&self) -> Reducer {
        match self {
            AggregatorKind::Counter => Reducer::Counter,
            AggregatorKind::Sum { .. } => Reducer::Sum,
            AggregatorKind::Min { .. } => Reducer::Min,
            AggregatorKind::Max { .. } => Reducer::Max,
        }
    }

    /// Measured field, if the reducer needs one
    pub fn measure_field(&self) -> Option<&str> {
        match self {
            AggregatorKind::Counter => None,
            AggregatorKind::Sum { field }
            | AggregatorKind::Min { field }
            | AggregatorKind::Max { field } => Some(field),
        }
    }
}

impl fmt::Display for AggregatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.measure_field() {
            Some(field) => write!(f, "{}({})", self.reducer(), field),
            None => write!(f, "{}", self.reducer()),
        }
    }
}

/// A named aggregator
///
/// The extractor yields the groups a document belongs to; a multi-valued
/// extractor places the document in several groups.
#[derive(Clone)]
pub struct AggregatorDefinition {
    name: String,
    kind: AggregatorKind,
    group: Arc<dyn Extractor>,
    filter: Option<DocumentFilter>,
}

impl AggregatorDefinition {
    /// Aggregator with a custom group extractor
    pub fn new(name: impl Into<String>, kind: AggregatorKind, group: impl Extractor) -> Self {
        Self {
            name: name.into(),
            kind,
            group: Arc::new(group),
            filter: None,
        }
    }

    /// Counter grouped by scalar fields
    pub fn counter<S: Into<String>>(
        name: impl Into<String>,
        group_fields: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            AggregatorKind::Counter,
            FieldsExtractor::new(group_fields),
        )
    }

    /// Aggregator of any kind grouped by scalar fields
    pub fn grouped_by<S: Into<String>>(
        name: impl Into<String>,
        kind: AggregatorKind,
        group_fields: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(name, kind, FieldsExtractor::new(group_fields))
    }

    /// Restrict the aggregator to documents matching a filter
    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind
    pub fn kind(&self) -> &AggregatorKind {
        &self.kind
    }

    /// Group extractor
    pub fn group_extractor(&self) -> &Arc<dyn Extractor> {
        &self.group
    }

    /// Filter, if any
    pub fn filter(&self) -> Option<&DocumentFilter> {
        self.filter.as_ref()
    }

    /// Whether the definition applies to a document at all
    pub fn accepts(&self, document: &Document) -> bool {
        self.filter.as_ref().map(|f| f.matches(document)).unwrap_or(true)
    }

    fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if let Some(field) = self.kind.measure_field() {
            if field.is_empty() {
                return Err(Error::InvalidDefinition(format!(
                    "aggregator '{}' has an empty measure field",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AggregatorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatorDefinition")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("group", &self.group.describe())
            .field("filter", &self.filter)
            .finish()
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidDefinition(
            "definition name must not be empty".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// Slots
// ============================================================================

/// A registered index and its entries
#[derive(Debug)]
pub struct IndexSlot {
    /// Definition
    pub definition: IndexDefinition,
    /// Backing ordered structure
    pub table: RwLock<IndexTable>,
}

impl IndexSlot {
    fn new(definition: IndexDefinition) -> Self {
        Self {
            definition,
            table: RwLock::new(IndexTable::new()),
        }
    }

    /// Name
    pub fn name(&self) -> &str {
        self.definition.name()
    }
}

/// A registered aggregator and its state
#[derive(Debug)]
pub struct AggregatorSlot {
    /// Definition
    pub definition: AggregatorDefinition,
    /// Per-group state
    pub table: RwLock<AggregateTable>,
}

impl AggregatorSlot {
    fn new(definition: AggregatorDefinition) -> Self {
        let reducer = definition.kind().reducer();
        Self {
            definition,
            table: RwLock::new(AggregateTable::new(reducer)),
        }
    }

    /// Name
    pub fn name(&self) -> &str {
        self.definition.name()
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
struct Definitions {
    indexes: FxHashMap<String, Arc<IndexSlot>>,
    aggregators: FxHashMap<String, Arc<AggregatorSlot>>,
}

/// Registry of named definitions
///
/// Created empty; dropping it (or calling [`DefinitionRegistry::clear`])
/// drops every backing structure.
#[derive(Default)]
pub struct DefinitionRegistry {
    inner: RwLock<Definitions>,
}

impl DefinitionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the name is taken, `InvalidDefinition` if the
    /// definition is unusable.
    pub fn register_index(&self, definition: IndexDefinition) -> Result<Arc<IndexSlot>> {
        definition.validate()?;
        let mut inner = self.inner.write();
        if inner.indexes.contains_key(definition.name()) {
            return Err(Error::already_exists(definition.name()));
        }
        let slot = Arc::new(IndexSlot::new(definition));
        inner
            .indexes
            .insert(slot.name().to_string(), Arc::clone(&slot));
        Ok(slot)
    }

    /// Register an aggregator
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the name is taken, `InvalidDefinition` if the
    /// definition is unusable.
    pub fn register_aggregator(
        &self,
        definition: AggregatorDefinition,
    ) -> Result<Arc<AggregatorSlot>> {
        definition.validate()?;
        let mut inner = self.inner.write();
        if inner.aggregators.contains_key(definition.name()) {
            return Err(Error::already_exists(definition.name()));
        }
        let slot = Arc::new(AggregatorSlot::new(definition));
        inner
            .aggregators
            .insert(slot.name().to_string(), Arc::clone(&slot));
        Ok(slot)
    }

    /// Look up an index
    pub fn index(&self, name: &str) -> Result<Arc<IndexSlot>> {
        self.inner
            .read()
            .indexes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(name))
    }

    /// Look up an aggregator
    pub fn aggregator(&self, name: &str) -> Result<Arc<AggregatorSlot>> {
        self.inner
            .read()
            .aggregators
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(name))
    }

    /// Unregister an index, returning its slot
    pub fn remove_index(&self, name: &str) -> Result<Arc<IndexSlot>> {
        self.inner
            .write()
            .indexes
            .remove(name)
            .ok_or_else(|| Error::not_found(name))
    }

    /// Unregister an aggregator, returning its slot
    pub fn remove_aggregator(&self, name: &str) -> Result<Arc<AggregatorSlot>> {
        self.inner
            .write()
            .aggregators
            .remove(name)
            .ok_or_else(|| Error::not_found(name))
    }

    /// Snapshot of registered indexes, sorted by name
    pub fn indexes(&self) -> Vec<Arc<IndexSlot>> {
        let mut slots: Vec<_> = self.inner.read().indexes.values().cloned().collect();
        slots.sort_by(|a, b| a.name().cmp(b.name()));
        slots
    }

    /// Snapshot of registered aggregators, sorted by name
    pub fn aggregators(&self) -> Vec<Arc<AggregatorSlot>> {
        let mut slots: Vec<_> = self.inner.read().aggregators.values().cloned().collect();
        slots.sort_by(|a, b| a.name().cmp(b.name()));
        slots
    }

    /// Total number of definitions
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.indexes.len() + inner.aggregators.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every definition and its backing structure
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.indexes.clear();
        inner.aggregators.clear();
    }
}

impl fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DefinitionRegistry")
            .field("indexes", &inner.indexes.len())
            .field("aggregators", &inner.aggregators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = DefinitionRegistry::new();
        registry
            .register_index(IndexDefinition::compound("by_user", ["user_id"]))
            .unwrap();
        let slot = registry.index("by_user").unwrap();
        assert_eq!(slot.definition.kind(), IndexKind::Compound);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = DefinitionRegistry::new();
        registry
            .register_index(IndexDefinition::compound("idx", ["a"]))
            .unwrap();
        let err = registry
            .register_index(IndexDefinition::multi("idx", "tags", ["date"]))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { ref name } if name == "idx"));
        // the original definition is untouched
        assert_eq!(registry.index("idx").unwrap().definition.kind(), IndexKind::Compound);
    }

    #[test]
    fn test_namespaces_are_separate() {
        let registry = DefinitionRegistry::new();
        registry
            .register_index(IndexDefinition::compound("users", ["user_id"]))
            .unwrap();
        registry
            .register_aggregator(AggregatorDefinition::counter("users", ["user_id"]))
            .unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.aggregator("users").is_ok());
    }

    #[test]
    fn test_lookup_missing() {
        let registry = DefinitionRegistry::new();
        assert!(registry.index("nope").unwrap_err().is_not_found());
        assert!(registry.aggregator("nope").unwrap_err().is_not_found());
        assert!(registry.remove_index("nope").unwrap_err().is_not_found());
        assert!(registry.remove_aggregator("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_then_reregister() {
        let registry = DefinitionRegistry::new();
        registry
            .register_index(IndexDefinition::compound("idx", ["a"]))
            .unwrap();
        registry.remove_index("idx").unwrap();
        assert!(registry.index("idx").is_err());
        registry
            .register_index(IndexDefinition::compound("idx", ["b"]))
            .unwrap();
        assert!(registry.index("idx").is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = DefinitionRegistry::new();
        let err = registry
            .register_index(IndexDefinition::compound("  ", ["a"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition(_)));
        let err = registry
            .register_aggregator(AggregatorDefinition::grouped_by(
                "total",
                AggregatorKind::sum(""),
                ["g"],
            ))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition(_)));
    }

    #[test]
    fn test_snapshots_sorted_and_clear() {
        let registry = DefinitionRegistry::new();
        for name in ["c", "a", "b"] {
            registry
                .register_index(IndexDefinition::compound(name, ["x"]))
                .unwrap();
        }
        let names: Vec<_> = registry
            .indexes()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_filter_accepts() {
        let def = IndexDefinition::compound("events_by_user", ["user_id"])
            .with_filter(DocumentFilter::eq("type", "events"));
        let event = Document::new("e").with_field("type", "events");
        let other = Document::new("o").with_field("type", "clicks");
        assert!(def.accepts(&event));
        assert!(!def.accepts(&other));
    }

    #[test]
    fn test_aggregator_kind_display() {
        assert_eq!(AggregatorKind::Counter.to_string(), "counter");
        assert_eq!(AggregatorKind::sum("amount").to_string(), "sum(amount)");
        assert_eq!(AggregatorKind::max("score").reducer(), Reducer::Max);
    }
}

//! The indexing engine
//!
//! `IndexEngine` owns the definition registry and everything needed to keep
//! it in step with the base store:
//!
//! - mutation propagation ([`MutationHook`]), one document at a time under
//!   that document's lock stripe
//! - registration with optional backfill from a [`DocumentSource`]
//! - reconciliation of definitions that fell behind
//! - queries, through a [`QueryFacade`] sharing the same registry
//!
//! ## Lock order
//!
//! Base-store stripe, then engine stripe, then one table lock at a time.
//! Backfill and reconciliation take the engine stripe and then read the
//! source, which must not block on its own stripes for reads.

use crate::aggregator::AggregatorMaintainer;
use crate::config::EngineConfig;
use crate::extract::{ExtractionEngine, ExtractionRunner};
use crate::maintainer::IndexMaintainer;
use crate::query::{IndexCursor, QueryFacade, ScanOptions};
use crate::reconcile::{BackfillReport, PendingEntry, PendingSet, ReconcileReport};
use crate::registry::{
    AggregatorDefinition, AggregatorKind, DefinitionRegistry, IndexDefinition, IndexKind,
};
use serde::Serialize;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use stratadex_core::{
    DefinitionKind, Document, DocumentId, DocumentSource, ExtractError, MaintenanceFailure,
    MaintenanceResult, Mutation, MutationHook, Result, Tuple,
};
use stratadex_storage::{AggregateValue, DocumentLocks, KeyCodec};
use tracing::{debug, info, warn};

/// Whether registration populates the new definition from existing data
#[derive(Clone, Copy)]
pub enum Backfill<'a> {
    /// Start empty; only later mutations are reflected
    None,
    /// Populate from every document the source currently holds
    From(&'a dyn DocumentSource),
}

/// Size of one index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// `(key, document)` entries
    pub entries: usize,
    /// Distinct keys
    pub distinct_keys: usize,
    /// Documents with at least one entry
    pub documents: usize,
}

/// Description of a registered index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Name
    pub name: String,
    /// Compound or multi
    pub kind: IndexKind,
    /// Extractor description, e.g. `fields(user_id, category_id)`
    pub extractor: String,
    /// Filter expression, if any
    pub filter: Option<String>,
    /// Current size
    pub stats: IndexStats,
}

/// Description of a registered aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorInfo {
    /// Name
    pub name: String,
    /// Counter, sum, min or max
    pub kind: AggregatorKind,
    /// Group extractor description
    pub extractor: String,
    /// Filter expression, if any
    pub filter: Option<String>,
    /// Groups with at least one member
    pub groups: usize,
}

/// Secondary indexes and aggregators over a document store
pub struct IndexEngine {
    config: EngineConfig,
    registry: Arc<DefinitionRegistry>,
    index_maintainer: IndexMaintainer,
    aggregator_maintainer: AggregatorMaintainer,
    locks: DocumentLocks,
    pending: PendingSet,
}

impl IndexEngine {
    /// Create an engine with no definitions
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(
            target: "stratadex::registry",
            lock_stripes = config.lock_stripes,
            timeout_ms = ?config.extraction_timeout_ms,
            "Index engine created"
        );
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        let extraction = ExtractionEngine::new(
            ExtractionRunner::new(config.extraction_timeout())
                .with_thread_limit(config.max_extraction_threads),
            config.limits(),
        );
        Self {
            registry: Arc::new(DefinitionRegistry::new()),
            index_maintainer: IndexMaintainer::new(extraction.clone()),
            aggregator_maintainer: AggregatorMaintainer::new(extraction),
            locks: DocumentLocks::new(config.lock_stripes),
            pending: PendingSet::new(),
            config,
        }
    }

    /// Create from a `stratadex.toml` file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::new(EngineConfig::from_file(path)?)
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Query surface over this engine's definitions
    pub fn query(&self) -> QueryFacade {
        QueryFacade::new(Arc::clone(&self.registry), self.config.scan_batch_size)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register an index, optionally backfilling it
    ///
    /// The index receives mutations from the moment it is registered;
    /// backfill runs afterwards and converges with concurrent writers.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if an index with this name is registered,
    /// `InvalidDefinition` if the definition is unusable.
    pub fn register_index(
        &self,
        definition: IndexDefinition,
        backfill: Backfill<'_>,
    ) -> Result<Option<BackfillReport>> {
        let slot = self.registry.register_index(definition)?;
        info!(
            target: "stratadex::registry",
            index = slot.name(),
            kind = %slot.definition.kind(),
            extractor = %slot.definition.extractor().describe(),
            "Index registered"
        );
        match backfill {
            Backfill::None => Ok(None),
            Backfill::From(source) => self.backfill_index(slot.name(), source).map(Some),
        }
    }

    /// Register an aggregator, optionally backfilling it
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if an aggregator with this name is registered,
    /// `InvalidDefinition` if the definition is unusable.
    pub fn register_aggregator(
        &self,
        definition: AggregatorDefinition,
        backfill: Backfill<'_>,
    ) -> Result<Option<BackfillReport>> {
        let slot = self.registry.register_aggregator(definition)?;
        info!(
            target: "stratadex::registry",
            aggregator = slot.name(),
            kind = %slot.definition.kind(),
            "Aggregator registered"
        );
        match backfill {
            Backfill::None => Ok(None),
            Backfill::From(source) => self.backfill_aggregator(slot.name(), source).map(Some),
        }
    }

    /// Register an index, backfilling when `backfill_on_register` is set
    pub fn register_index_default(
        &self,
        definition: IndexDefinition,
        source: &dyn DocumentSource,
    ) -> Result<Option<BackfillReport>> {
        let backfill = self.default_backfill(source);
        self.register_index(definition, backfill)
    }

    /// Register an aggregator, backfilling when `backfill_on_register` is set
    pub fn register_aggregator_default(
        &self,
        definition: AggregatorDefinition,
        source: &dyn DocumentSource,
    ) -> Result<Option<BackfillReport>> {
        let backfill = self.default_backfill(source);
        self.register_aggregator(definition, backfill)
    }

    fn default_backfill<'a>(&self, source: &'a dyn DocumentSource) -> Backfill<'a> {
        if self.config.backfill_on_register {
            Backfill::From(source)
        } else {
            Backfill::None
        }
    }

    /// Unregister an index and drop its entries
    ///
    /// # Errors
    ///
    /// `NotFound` if no index has this name.
    pub fn remove_index(&self, name: &str) -> Result<()> {
        let slot = self.registry.remove_index(name)?;
        let entries = {
            let mut table = slot.table.write();
            let n = table.len();
            table.clear();
            n
        };
        let forgotten = self.pending.forget_definition(DefinitionKind::Index, name);
        info!(target: "stratadex::registry", index = name, entries, forgotten, "Index removed");
        Ok(())
    }

    /// Unregister an aggregator and drop its state
    ///
    /// # Errors
    ///
    /// `NotFound` if no aggregator has this name.
    pub fn remove_aggregator(&self, name: &str) -> Result<()> {
        let slot = self.registry.remove_aggregator(name)?;
        let groups = {
            let mut table = slot.table.write();
            let n = table.len();
            table.clear();
            n
        };
        let forgotten = self
            .pending
            .forget_definition(DefinitionKind::Aggregator, name);
        info!(target: "stratadex::registry", aggregator = name, groups, forgotten, "Aggregator removed");
        Ok(())
    }

    // ========================================================================
    // Backfill
    // ========================================================================

    /// Make an index reflect every document in `source`
    ///
    /// Each document is replaced wholesale under its lock, re-read from the
    /// source, so the result matches the source even while writers run.
    /// Failures are recorded as pending and reported.
    pub fn backfill_index(&self, name: &str, source: &dyn DocumentSource) -> Result<BackfillReport> {
        let slot = self.registry.index(name)?;
        let report = self.backfill_with(DefinitionKind::Index, name, source, |id, current| {
            self.index_maintainer
                .replace(&slot, id, current)
                .map(|c| c.removed + c.added)
        });
        info!(
            target: "stratadex::registry",
            index = name,
            documents = report.documents,
            changes = report.changes,
            failures = report.failures.len(),
            "Index backfilled"
        );
        Ok(report)
    }

    /// Make an aggregator reflect every document in `source`
    pub fn backfill_aggregator(
        &self,
        name: &str,
        source: &dyn DocumentSource,
    ) -> Result<BackfillReport> {
        let slot = self.registry.aggregator(name)?;
        let report = self.backfill_with(DefinitionKind::Aggregator, name, source, |id, current| {
            self.aggregator_maintainer.replace(&slot, id, current)
        });
        info!(
            target: "stratadex::registry",
            aggregator = name,
            documents = report.documents,
            changes = report.changes,
            failures = report.failures.len(),
            "Aggregator backfilled"
        );
        Ok(report)
    }

    fn backfill_with<F>(
        &self,
        kind: DefinitionKind,
        name: &str,
        source: &dyn DocumentSource,
        mut replace: F,
    ) -> BackfillReport
    where
        F: FnMut(&DocumentId, Option<&Arc<Document>>) -> std::result::Result<usize, ExtractError>,
    {
        // Ids first: the visitor may run under the source's own locks.
        let mut ids = Vec::with_capacity(source.document_count());
        source.for_each_document(&mut |doc| {
            ids.push(doc.id().clone());
            true
        });

        let mut report = BackfillReport {
            definition: name.to_string(),
            ..BackfillReport::default()
        };
        for id in ids {
            let _guard = self.locks.lock(&id);
            let current = source.get_document(&id);
            report.documents += 1;
            let entry = PendingEntry::new(kind, name, id);
            match replace(&entry.document, current.as_ref()) {
                Ok(changes) => {
                    report.changes += changes;
                    self.pending.resolve(&entry);
                }
                Err(cause) => report.failures.push(self.fall_behind(entry, cause)),
            }
        }
        report
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Propagate one mutation to every index and aggregator
    ///
    /// A failing definition does not stop the others; it is recorded as
    /// pending and listed in the result. Two mutations of the same document
    /// are applied one after the other; mutations of different documents
    /// proceed in parallel.
    pub fn apply_mutation(&self, mutation: &Mutation) -> MaintenanceResult {
        let id = mutation.document_id();
        let mut result = MaintenanceResult::new(id.clone(), mutation.kind());

        let indexes = self.registry.indexes();
        let aggregators = self.registry.aggregators();
        if indexes.is_empty() && aggregators.is_empty() {
            return result;
        }
        if !mutation.is_consistent() {
            warn!(
                target: "stratadex::maintain",
                document = %id,
                "Prior content belongs to another document, ignoring it"
            );
        }

        let _guard = self.locks.lock(id);

        for slot in &indexes {
            let entry = PendingEntry::new(DefinitionKind::Index, slot.name(), id.clone());
            let stale = self.pending.contains(&entry);
            match self.index_maintainer.apply(slot, mutation, stale) {
                Ok(counts) => {
                    result.entries_removed += counts.removed;
                    result.entries_added += counts.added;
                    if stale {
                        self.pending.resolve(&entry);
                    }
                }
                Err(cause) => result.failures.push(self.fall_behind(entry, cause)),
            }
        }

        for slot in &aggregators {
            let entry = PendingEntry::new(DefinitionKind::Aggregator, slot.name(), id.clone());
            match self.aggregator_maintainer.apply(slot, mutation) {
                Ok(applied) => {
                    result.deltas_applied += applied;
                    self.pending.resolve(&entry);
                }
                Err(cause) => result.failures.push(self.fall_behind(entry, cause)),
            }
        }

        debug!(
            target: "stratadex::maintain",
            document = %id,
            kind = %mutation.kind(),
            removed = result.entries_removed,
            added = result.entries_added,
            deltas = result.deltas_applied,
            failures = result.failures.len(),
            "Mutation applied"
        );
        result
    }

    fn fall_behind(&self, entry: PendingEntry, cause: ExtractError) -> MaintenanceFailure {
        warn!(
            target: "stratadex::maintain",
            definition = %entry.definition,
            kind = %entry.kind,
            document = %entry.document,
            error = %cause,
            "Definition fell behind"
        );
        let failure = MaintenanceFailure {
            definition: entry.definition.clone(),
            kind: entry.kind,
            document: entry.document.clone(),
            cause,
        };
        self.pending.record(entry);
        failure
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Pairs waiting for re-extraction, ordered
    pub fn pending_reconciliation(&self) -> Vec<PendingEntry> {
        self.pending.snapshot()
    }

    /// Re-derive every pending pair from the source's current content
    ///
    /// A pair whose definition is gone is dropped. A pair whose document is
    /// gone has its derived data removed. Pairs that fail again stay
    /// pending.
    pub fn reconcile(&self, source: &dyn DocumentSource) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for entry in self.pending.snapshot() {
            report.attempted += 1;
            let _guard = self.locks.lock(&entry.document);
            if !self.pending.contains(&entry) {
                // a writer brought it up to date meanwhile
                report.repaired += 1;
                continue;
            }
            let current = source.get_document(&entry.document);

            let outcome = match entry.kind {
                DefinitionKind::Index => self.registry.index(&entry.definition).ok().map(|slot| {
                    self.index_maintainer
                        .replace(&slot, &entry.document, current.as_ref())
                        .map(|counts| {
                            report.entries_removed += counts.removed;
                            report.entries_added += counts.added;
                        })
                }),
                DefinitionKind::Aggregator => {
                    self.registry.aggregator(&entry.definition).ok().map(|slot| {
                        self.aggregator_maintainer
                            .replace(&slot, &entry.document, current.as_ref())
                            .map(|applied| report.deltas_applied += applied)
                    })
                }
            };

            match outcome {
                None => {
                    self.pending.resolve(&entry);
                    report.dropped += 1;
                }
                Some(Ok(())) => {
                    self.pending.resolve(&entry);
                    report.repaired += 1;
                }
                Some(Err(cause)) => {
                    debug!(
                        target: "stratadex::reconcile",
                        definition = %entry.definition,
                        document = %entry.document,
                        error = %cause,
                        "Still failing"
                    );
                    report.still_failing.push(MaintenanceFailure {
                        definition: entry.definition,
                        kind: entry.kind,
                        document: entry.document,
                        cause,
                    });
                }
            }
        }

        info!(
            target: "stratadex::reconcile",
            attempted = report.attempted,
            repaired = report.repaired,
            dropped = report.dropped,
            still_failing = report.still_failing.len(),
            "Reconciliation finished"
        );
        report
    }

    // ========================================================================
    // Queries and introspection
    // ========================================================================

    /// See [`QueryFacade::point_lookup`]
    pub fn point_lookup(&self, index: &str, key: &Tuple) -> Result<IndexCursor> {
        self.query().point_lookup(index, key)
    }

    /// See [`QueryFacade::range_scan`]
    pub fn range_scan(
        &self,
        index: &str,
        low: Bound<Tuple>,
        high: Bound<Tuple>,
        options: ScanOptions,
    ) -> Result<IndexCursor> {
        self.query().range_scan(index, low, high, options)
    }

    /// See [`QueryFacade::aggregate_get`]
    pub fn aggregate_get(&self, aggregator: &str, group: &Tuple) -> Result<AggregateValue> {
        self.query().aggregate_get(aggregator, group)
    }

    /// Every group of an aggregator with its value, in key order
    pub fn aggregate_groups(&self, aggregator: &str) -> Result<Vec<(Tuple, AggregateValue)>> {
        let slot = self.registry.aggregator(aggregator)?;
        let groups = slot.table.read().groups();
        Ok(groups)
    }

    /// Keys an index currently holds for one document, in key order
    pub fn entries_for_document(&self, index: &str, id: &DocumentId) -> Result<Vec<Tuple>> {
        let slot = self.registry.index(index)?;
        let table = slot.table.read();
        table
            .keys_for_document(id)
            .map(|keys| keys.iter().map(|k| KeyCodec.decode(k.as_bytes())).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    /// Size of one index
    pub fn index_stats(&self, index: &str) -> Result<IndexStats> {
        let slot = self.registry.index(index)?;
        let table = slot.table.read();
        Ok(IndexStats {
            entries: table.len(),
            distinct_keys: table.distinct_keys(),
            documents: table.documents(),
        })
    }

    /// Registered indexes, sorted by name
    pub fn list_indexes(&self) -> Vec<IndexInfo> {
        self.registry
            .indexes()
            .into_iter()
            .map(|slot| {
                let stats = {
                    let table = slot.table.read();
                    IndexStats {
                        entries: table.len(),
                        distinct_keys: table.distinct_keys(),
                        documents: table.documents(),
                    }
                };
                let def = &slot.definition;
                IndexInfo {
                    name: def.name().to_string(),
                    kind: def.kind(),
                    extractor: def.extractor().describe(),
                    filter: def.filter().map(|f| f.to_string()),
                    stats,
                }
            })
            .collect()
    }

    /// Registered aggregators, sorted by name
    pub fn list_aggregators(&self) -> Vec<AggregatorInfo> {
        self.registry
            .aggregators()
            .into_iter()
            .map(|slot| {
                let def = &slot.definition;
                AggregatorInfo {
                    name: def.name().to_string(),
                    kind: def.kind().clone(),
                    extractor: def.group_extractor().describe(),
                    filter: def.filter().map(|f| f.to_string()),
                    groups: slot.table.read().len(),
                }
            })
            .collect()
    }

    /// Drop every definition, its backing structure and pending work
    pub fn shutdown(&self) {
        let definitions = self.registry.len();
        self.registry.clear();
        self.pending.clear();
        info!(target: "stratadex::registry", definitions, "Index engine shut down");
    }
}

impl Default for IndexEngine {
    fn default() -> Self {
        Self::build(EngineConfig::default())
    }
}

impl MutationHook for IndexEngine {
    fn on_mutation(&self, mutation: &Mutation) -> MaintenanceResult {
        self.apply_mutation(mutation)
    }
}

impl std::fmt::Debug for IndexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("pending", &self.pending.len())
            .finish()
    }
}

//! Extraction: deriving key tuples from documents
//!
//! An [`Extractor`] turns one document into a [`DerivedKeySet`]. Built-in
//! extractors cover the two common shapes:
//!
//! - [`FieldsExtractor`]: one tuple from a fixed list of scalar fields
//!   (compound keys such as `(user_id, category_id)`)
//! - [`MultiFieldExtractor`]: one tuple per element of an array field, each
//!   followed by shared trailing fields (e.g. `(tag, date)` per tag)
//!
//! Anything else is a native closure wrapped in [`FnExtractor`].
//!
//! [`ExtractionRunner`] invokes an extractor with panic isolation and an
//! optional timeout, so a misbehaving extractor only fails its own
//! definition. [`ExtractionEngine`] applies a definition's filter, kind and
//! size limits on top and encodes the result.

use crate::registry::{AggregatorDefinition, IndexDefinition, IndexKind};
use crossbeam_channel::RecvTimeoutError;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use stratadex_core::{Document, ExtractError, FieldValue, Limits, Scalar, Tuple};
use stratadex_storage::{EncodedKey, KeyCodec, Membership, Reducer};

/// Ordered sequence of derived tuples for one document
pub type DerivedKeySet = Vec<Tuple>;

/// Capability that derives key tuples from a document
///
/// Implementations must be deterministic: the same document content must
/// always produce the same tuples, or stale entries cannot be removed.
pub trait Extractor: Send + Sync + 'static {
    /// Derive tuples for a document; an empty set means "no entry"
    fn extract(&self, document: &Document) -> Result<DerivedKeySet, ExtractError>;

    /// Short human-readable description for listings
    fn describe(&self) -> String {
        "custom".to_string()
    }
}

impl fmt::Debug for dyn Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Extractor({})", self.describe())
    }
}

// ============================================================================
// Built-in extractors
// ============================================================================

fn scalar_field<'a>(document: &'a Document, field: &str) -> Result<Option<&'a Scalar>, ExtractError> {
    match document.get(field) {
        None => Ok(None),
        Some(FieldValue::Scalar(s)) => Ok(Some(s)),
        Some(other) => Err(ExtractError::TypeMismatch {
            field: field.to_string(),
            expected: "scalar".to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

/// One tuple built from scalar fields in order
///
/// A document missing any of the fields produces no tuple. An array-valued
/// field is a type mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldsExtractor {
    fields: Vec<String>,
}

impl FieldsExtractor {
    /// Extract the given fields in order
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Field names
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Extractor for FieldsExtractor {
    fn extract(&self, document: &Document) -> Result<DerivedKeySet, ExtractError> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match scalar_field(document, field)? {
                Some(v) => values.push(v.clone()),
                None => return Ok(Vec::new()),
            }
        }
        Ok(vec![Tuple::from(values)])
    }

    fn describe(&self) -> String {
        format!("fields({})", self.fields.join(", "))
    }
}

/// One tuple per element of an array field, followed by trailing fields
///
/// A scalar in place of the array counts as a one-element array. Trailing
/// fields are required: a document missing any of them produces no tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiFieldExtractor {
    array_field: String,
    trailing: Vec<String>,
}

impl MultiFieldExtractor {
    /// Expand `array_field`, appending `trailing` to every element
    pub fn new<S: Into<String>>(
        array_field: impl Into<String>,
        trailing: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            array_field: array_field.into(),
            trailing: trailing.into_iter().map(Into::into).collect(),
        }
    }

    /// Expanded field name
    pub fn array_field(&self) -> &str {
        &self.array_field
    }

    /// Shared trailing field names
    pub fn trailing(&self) -> &[String] {
        &self.trailing
    }
}

impl Extractor for MultiFieldExtractor {
    fn extract(&self, document: &Document) -> Result<DerivedKeySet, ExtractError> {
        let elements: &[Scalar] = match document.get(&self.array_field) {
            None => return Ok(Vec::new()),
            Some(FieldValue::Array(items)) => items,
            Some(FieldValue::Scalar(s)) => std::slice::from_ref(s),
        };

        let mut shared = Vec::with_capacity(self.trailing.len());
        for field in &self.trailing {
            match scalar_field(document, field)? {
                Some(v) => shared.push(v.clone()),
                None => return Ok(Vec::new()),
            }
        }
        let shared = Tuple::from(shared);

        Ok(elements
            .iter()
            .map(|e| Tuple::from(vec![e.clone()]).concat(&shared))
            .collect())
    }

    fn describe(&self) -> String {
        if self.trailing.is_empty() {
            format!("multi({})", self.array_field)
        } else {
            format!("multi({} + {})", self.array_field, self.trailing.join(", "))
        }
    }
}

/// Native closure as an extractor
pub struct FnExtractor<F> {
    f: F,
    label: String,
}

impl<F> FnExtractor<F>
where
    F: Fn(&Document) -> Result<DerivedKeySet, ExtractError> + Send + Sync + 'static,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self {
            f,
            label: "fn".to_string(),
        }
    }

    /// Wrap a closure with a label shown in listings
    pub fn labeled(label: impl Into<String>, f: F) -> Self {
        Self {
            f,
            label: label.into(),
        }
    }
}

impl<F> Extractor for FnExtractor<F>
where
    F: Fn(&Document) -> Result<DerivedKeySet, ExtractError> + Send + Sync + 'static,
{
    fn extract(&self, document: &Document) -> Result<DerivedKeySet, ExtractError> {
        (self.f)(document)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Default cap on helper threads alive at once
pub const DEFAULT_EXTRACTION_THREADS: usize = 64;

/// Invokes extractors with panic isolation and an optional deadline
///
/// Without a timeout the extractor runs on the calling thread. With one, it
/// runs on a helper thread and the caller stops waiting at the deadline;
/// the helper is abandoned and its eventual result discarded.
///
/// An abandoned helper keeps its thread until the extractor returns. At most
/// `thread_limit` helpers are alive at once across all clones of a runner;
/// past that, calls fail with `ExtractError::Overloaded` without spawning.
#[derive(Debug, Clone)]
pub struct ExtractionRunner {
    timeout: Option<Duration>,
    thread_limit: usize,
    running: Arc<AtomicUsize>,
}

impl Default for ExtractionRunner {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Releases a helper slot when dropped
struct HelperSlot(Arc<AtomicUsize>);

impl Drop for HelperSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ExtractionRunner {
    /// Runner with an optional per-call timeout
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            thread_limit: DEFAULT_EXTRACTION_THREADS,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the cap on helper threads alive at once
    pub fn with_thread_limit(mut self, limit: usize) -> Self {
        self.thread_limit = limit.max(1);
        self
    }

    /// Configured timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Helper threads currently alive, including abandoned ones
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Run an extractor against a document
    pub fn run(
        &self,
        extractor: &Arc<dyn Extractor>,
        document: &Arc<Document>,
    ) -> Result<DerivedKeySet, ExtractError> {
        match self.timeout {
            None => run_isolated(extractor.as_ref(), document),
            Some(timeout) => self.run_with_deadline(extractor, document, timeout),
        }
    }

    fn run_with_deadline(
        &self,
        extractor: &Arc<dyn Extractor>,
        document: &Arc<Document>,
        timeout: Duration,
    ) -> Result<DerivedKeySet, ExtractError> {
        let running = self.running.fetch_add(1, Ordering::AcqRel);
        let slot = HelperSlot(Arc::clone(&self.running));
        if running >= self.thread_limit {
            return Err(ExtractError::Overloaded { running });
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let extractor = Arc::clone(extractor);
        let document = Arc::clone(document);
        let started = Instant::now();

        thread::Builder::new()
            .name("stratadex-extract".to_string())
            .spawn(move || {
                let _slot = slot;
                let result = run_isolated(extractor.as_ref(), &document);
                // The receiver is gone after a timeout
                let _ = tx.send(result);
            })
            .map_err(|e| ExtractError::Custom(format!("failed to spawn extraction: {}", e)))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ExtractError::Timeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(ExtractError::Panicked(
                "extraction thread exited without a result".to_string(),
            )),
        }
    }
}

fn run_isolated(extractor: &dyn Extractor, document: &Document) -> Result<DerivedKeySet, ExtractError> {
    match panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(document))) {
        Ok(result) => result,
        Err(payload) => Err(ExtractError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Extraction engine
// ============================================================================

/// Turns definitions plus documents into encoded keys and group memberships
///
/// Stateless apart from its settings; safe to share across writer threads.
#[derive(Debug, Clone, Default)]
pub struct ExtractionEngine {
    runner: ExtractionRunner,
    limits: Limits,
    codec: KeyCodec,
}

impl ExtractionEngine {
    /// Create with a runner and key limits
    pub fn new(runner: ExtractionRunner, limits: Limits) -> Self {
        Self {
            runner,
            limits,
            codec: KeyCodec,
        }
    }

    /// Key limits
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Derived key set of an index for a document
    ///
    /// A document rejected by the definition's filter has no keys. A
    /// compound extractor returning more than one tuple is a cardinality
    /// error.
    pub fn index_keys(
        &self,
        definition: &IndexDefinition,
        document: &Arc<Document>,
    ) -> Result<BTreeSet<EncodedKey>, ExtractError> {
        if !definition.accepts(document) {
            return Ok(BTreeSet::new());
        }
        let tuples = self.runner.run(definition.extractor(), document)?;
        if definition.kind() == IndexKind::Compound && tuples.len() > 1 {
            return Err(ExtractError::Cardinality {
                count: tuples.len(),
            });
        }
        self.limits.validate_key_count(tuples.len())?;
        tuples.iter().map(|t| self.encode(t)).collect()
    }

    /// Groups an aggregator places a document in, with the document's measure
    ///
    /// A document without the measure field (or with a null measure) joins
    /// no group. Sum measures must be numeric.
    pub fn memberships(
        &self,
        definition: &AggregatorDefinition,
        document: &Arc<Document>,
    ) -> Result<Vec<Membership>, ExtractError> {
        if !definition.accepts(document) {
            return Ok(Vec::new());
        }
        let measure = match definition.kind().measure_field() {
            None => None,
            Some(field) => match document.get(field) {
                None | Some(FieldValue::Scalar(Scalar::Null)) => return Ok(Vec::new()),
                Some(FieldValue::Scalar(s)) => {
                    if definition.kind().reducer() == Reducer::Sum && !s.is_numeric() {
                        return Err(ExtractError::TypeMismatch {
                            field: field.to_string(),
                            expected: "number".to_string(),
                            found: s.type_name().to_string(),
                        });
                    }
                    Some(s.clone())
                }
                Some(other) => {
                    return Err(ExtractError::TypeMismatch {
                        field: field.to_string(),
                        expected: "scalar".to_string(),
                        found: other.type_name().to_string(),
                    })
                }
            },
        };

        let groups = self.runner.run(definition.group_extractor(), document)?;
        self.limits.validate_key_count(groups.len())?;
        groups
            .into_iter()
            .map(|group| {
                let key = self.encode(&group)?;
                Ok(Membership::new(key, group, measure.clone()))
            })
            .collect()
    }

    fn encode(&self, tuple: &Tuple) -> Result<EncodedKey, ExtractError> {
        let key = self.codec.encode(tuple);
        self.limits.validate_key_len(key.len())?;
        Ok(key)
    }
}

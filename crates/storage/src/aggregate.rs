//! Per-aggregator running state
//!
//! An [`AggregateTable`] maps encoded group keys to accumulated state and is
//! only ever changed through [`AggregateDelta`]s. Each delta represents one
//! document joining or leaving a group.
//!
//! The table also records every document's current [`Membership`]s. A
//! document can only leave a group it joined, so withdrawing a document that
//! never contributed is a no-op, and a document's contribution can be
//! replaced wholesale during backfill or reconciliation.
//!
//! Groups with no remaining members are dropped, so a group that was never
//! populated and a group whose members all left look the same to readers.
//!
//! Float measures are kept as a multiset per group and the float total is
//! refolded in ascending order after every change. A sum therefore depends
//! only on the current members, never on the order they arrived or left.

use crate::codec::EncodedKey;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use stratadex_core::{DocumentId, ExtractError, Scalar, Tuple};

/// How deltas combine into group state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reducer {
    /// Number of documents in the group
    Counter,
    /// Sum of a numeric measure
    Sum,
    /// Smallest measure
    Min,
    /// Largest measure
    Max,
}

impl Reducer {
    /// Whether deltas for this reducer carry a measure
    pub fn needs_measure(&self) -> bool {
        !matches!(self, Reducer::Counter)
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reducer::Counter => write!(f, "counter"),
            Reducer::Sum => write!(f, "sum"),
            Reducer::Min => write!(f, "min"),
            Reducer::Max => write!(f, "max"),
        }
    }
}

/// One document joining or leaving a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateDelta {
    /// Document joins the group with an optional measure
    Add(Option<Scalar>),
    /// Document leaves the group with the measure it joined with
    Remove(Option<Scalar>),
}

/// Current value of one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateValue {
    /// Counter value
    Count(u64),
    /// Sum value
    ///
    /// `Int` while every member is an integer and the total fits in an
    /// `i64`. A float member, or an integer total outside the `i64` range,
    /// makes it `Float`.
    Sum(Scalar),
    /// Minimum member value; Int and Float members compare numerically
    Min(Scalar),
    /// Maximum member value; Int and Float members compare numerically
    Max(Scalar),
}

impl AggregateValue {
    /// Counter value, if this is a counter
    pub fn as_count(&self) -> Option<u64> {
        match self {
            AggregateValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// Scalar view of the value
    pub fn to_scalar(&self) -> Scalar {
        match self {
            AggregateValue::Count(n) => Scalar::Int(i64::try_from(*n).unwrap_or(i64::MAX)),
            AggregateValue::Sum(s) | AggregateValue::Min(s) | AggregateValue::Max(s) => s.clone(),
        }
    }
}

impl fmt::Display for AggregateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateValue::Count(n) => write!(f, "{}", n),
            AggregateValue::Sum(s) | AggregateValue::Min(s) | AggregateValue::Max(s) => {
                write!(f, "{}", s)
            }
        }
    }
}

/// Measure ordered for Min and Max
///
/// Int and Float compare by numeric value. When the two are numerically
/// equal the Int sorts first, so `Int(2)` and `Float(2.0)` remain separate
/// entries. Other types keep the `Scalar` order.
#[derive(Debug, Clone)]
struct Extreme(Scalar);

impl Ord for Extreme {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Scalar::Int(a), Scalar::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Scalar::Float(a), Scalar::Int(b)) => {
                a.total_cmp(&(*b as f64)).then(Ordering::Greater)
            }
            (a, b) => a.cmp(b),
        }
    }
}

impl PartialOrd for Extreme {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Extreme {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Extreme {}

#[derive(Debug, Clone)]
enum GroupState {
    Counter(u64),
    Sum {
        members: u64,
        int_total: i128,
        /// Float measure → multiplicity
        floats: BTreeMap<Scalar, u64>,
        float_total: f64,
    },
    /// Value → multiplicity, shared by Min and Max
    Extremes(BTreeMap<Extreme, u64>),
}

impl GroupState {
    fn new(reducer: Reducer) -> Self {
        match reducer {
            Reducer::Counter => GroupState::Counter(0),
            Reducer::Sum => GroupState::Sum {
                members: 0,
                int_total: 0,
                floats: BTreeMap::new(),
                float_total: 0.0,
            },
            Reducer::Min | Reducer::Max => GroupState::Extremes(BTreeMap::new()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            GroupState::Counter(n) => *n == 0,
            GroupState::Sum { members, .. } => *members == 0,
            GroupState::Extremes(values) => values.is_empty(),
        }
    }

    fn value(&self, reducer: Reducer) -> Option<AggregateValue> {
        match (self, reducer) {
            (GroupState::Counter(n), _) => Some(AggregateValue::Count(*n)),
            (
                GroupState::Sum {
                    floats,
                    int_total,
                    float_total,
                    ..
                },
                _,
            ) => {
                let total = if !floats.is_empty() {
                    Scalar::Float(*int_total as f64 + *float_total)
                } else {
                    match i64::try_from(*int_total) {
                        Ok(total) => Scalar::Int(total),
                        Err(_) => Scalar::Float(*int_total as f64),
                    }
                };
                Some(AggregateValue::Sum(total))
            }
            (GroupState::Extremes(values), Reducer::Max) => values
                .keys()
                .next_back()
                .map(|v| AggregateValue::Max(v.0.clone())),
            (GroupState::Extremes(values), _) => {
                values.keys().next().map(|v| AggregateValue::Min(v.0.clone()))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Group {
    tuple: Tuple,
    state: GroupState,
}

/// One document's contribution to one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    /// Encoded group key
    pub key: EncodedKey,
    /// Group tuple
    pub group: Tuple,
    /// Measure for Sum/Min/Max; `None` for Counter
    pub measure: Option<Scalar>,
}

impl Membership {
    /// Create a membership
    pub fn new(key: EncodedKey, group: Tuple, measure: Option<Scalar>) -> Self {
        Self {
            key,
            group,
            measure,
        }
    }
}

/// Accumulated state of one aggregator, keyed by encoded group
#[derive(Debug)]
pub struct AggregateTable {
    reducer: Reducer,
    groups: BTreeMap<EncodedKey, Group>,
    members: FxHashMap<DocumentId, Vec<Membership>>,
}

impl AggregateTable {
    /// Create an empty table for a reducer
    pub fn new(reducer: Reducer) -> Self {
        Self {
            reducer,
            groups: BTreeMap::new(),
            members: FxHashMap::default(),
        }
    }

    /// Reducer of this table
    pub fn reducer(&self) -> Reducer {
        self.reducer
    }

    /// Check a delta's measure without applying it
    ///
    /// Sum needs an Int or Float measure; Min and Max need any measure.
    pub fn validate(&self, delta: &AggregateDelta) -> Result<(), ExtractError> {
        let measure = match delta {
            AggregateDelta::Add(m) | AggregateDelta::Remove(m) => m.as_ref(),
        };
        match (self.reducer, measure) {
            (Reducer::Counter, _) => Ok(()),
            (_, None) => Err(ExtractError::Custom(format!(
                "{} aggregator requires a measure",
                self.reducer
            ))),
            (Reducer::Sum, Some(m)) if !m.is_numeric() => Err(ExtractError::TypeMismatch {
                field: "measure".to_string(),
                expected: "number".to_string(),
                found: m.type_name().to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Make `next` the exact set of groups `document` belongs to
    ///
    /// Groups the document leaves get a `Remove` delta with the measure it
    /// joined with; new or changed groups get an `Add`. Duplicate group keys
    /// in `next` count once. Every delta is validated before any is applied,
    /// so a rejected call leaves the table untouched. Returns the number of
    /// deltas applied.
    pub fn replace_document(
        &mut self,
        document: &DocumentId,
        mut next: Vec<Membership>,
    ) -> Result<usize, ExtractError> {
        next.sort_by(|a, b| a.key.cmp(&b.key));
        next.dedup_by(|a, b| a.key == b.key);
        for m in &next {
            self.validate(&AggregateDelta::Add(m.measure.clone()))?;
        }

        let previous = self.members.remove(document).unwrap_or_default();
        let mut applied = 0;
        for old in &previous {
            if !next.contains(old) {
                let delta = AggregateDelta::Remove(old.measure.clone());
                if self.apply_delta(&old.key, &old.group, &delta) {
                    applied += 1;
                }
            }
        }
        for new in &next {
            if !previous.contains(new) {
                let delta = AggregateDelta::Add(new.measure.clone());
                if self.apply_delta(&new.key, &new.group, &delta) {
                    applied += 1;
                }
            }
        }
        if !next.is_empty() {
            self.members.insert(document.clone(), next);
        }
        Ok(applied)
    }

    /// Withdraw every contribution of a document
    ///
    /// A document that never contributed changes nothing.
    pub fn remove_document(&mut self, document: &DocumentId) -> usize {
        let previous = self.members.remove(document).unwrap_or_default();
        let mut applied = 0;
        for old in &previous {
            let delta = AggregateDelta::Remove(old.measure.clone());
            if self.apply_delta(&old.key, &old.group, &delta) {
                applied += 1;
            }
        }
        applied
    }

    /// Current memberships of a document
    pub fn memberships(&self, document: &DocumentId) -> Option<&[Membership]> {
        self.members.get(document).map(|m| m.as_slice())
    }

    /// Documents with at least one membership
    pub fn documents(&self) -> Vec<DocumentId> {
        self.members.keys().cloned().collect()
    }

    fn apply_delta(&mut self, key: &EncodedKey, group: &Tuple, delta: &AggregateDelta) -> bool {
        match delta {
            AggregateDelta::Add(measure) => {
                let reducer = self.reducer;
                let entry = self.groups.entry(key.clone()).or_insert_with(|| Group {
                    tuple: group.clone(),
                    state: GroupState::new(reducer),
                });
                add_member(&mut entry.state, measure.as_ref());
                true
            }
            AggregateDelta::Remove(measure) => {
                let Some(entry) = self.groups.get_mut(key) else {
                    return false;
                };
                let changed = remove_member(&mut entry.state, measure.as_ref());
                if entry.state.is_empty() {
                    self.groups.remove(key);
                }
                changed
            }
        }
    }

    /// Current value of a group
    pub fn get(&self, key: &EncodedKey) -> Option<AggregateValue> {
        self.groups
            .get(key)
            .and_then(|g| g.state.value(self.reducer))
    }

    /// Every group with its value, ascending by group key
    pub fn groups(&self) -> Vec<(Tuple, AggregateValue)> {
        self.groups
            .values()
            .filter_map(|g| g.state.value(self.reducer).map(|v| (g.tuple.clone(), v)))
            .collect()
    }

    /// Drop every group and membership
    pub fn clear(&mut self) {
        self.groups.clear();
        self.members.clear();
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Check if the table has no groups
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

fn add_member(state: &mut GroupState, measure: Option<&Scalar>) {
    match state {
        GroupState::Counter(n) => *n += 1,
        GroupState::Sum {
            members,
            int_total,
            floats,
            float_total,
        } => {
            *members += 1;
            match measure {
                Some(Scalar::Int(i)) => *int_total += i128::from(*i),
                Some(f @ Scalar::Float(_)) => {
                    *floats.entry(f.clone()).or_insert(0) += 1;
                    *float_total = fold_floats(floats);
                }
                _ => {}
            }
        }
        GroupState::Extremes(values) => {
            if let Some(m) = measure {
                *values.entry(Extreme(m.clone())).or_insert(0) += 1;
            }
        }
    }
}

fn remove_member(state: &mut GroupState, measure: Option<&Scalar>) -> bool {
    match state {
        GroupState::Counter(n) => {
            if *n == 0 {
                return false;
            }
            *n -= 1;
            true
        }
        GroupState::Sum {
            members,
            int_total,
            floats,
            float_total,
        } => {
            if *members == 0 {
                return false;
            }
            match measure {
                Some(Scalar::Int(i)) => *int_total -= i128::from(*i),
                Some(f @ Scalar::Float(_)) => {
                    if !take_one(floats, f) {
                        return false;
                    }
                    *float_total = fold_floats(floats);
                }
                _ => {}
            }
            *members -= 1;
            true
        }
        GroupState::Extremes(values) => match measure {
            Some(m) => take_one(values, &Extreme(m.clone())),
            None => false,
        },
    }
}

/// Drop one occurrence of `value` from a multiset
fn take_one<K: Ord>(values: &mut BTreeMap<K, u64>, value: &K) -> bool {
    match values.get_mut(value) {
        Some(count) if *count > 1 => {
            *count -= 1;
            true
        }
        Some(_) => {
            values.remove(value);
            true
        }
        None => false,
    }
}

/// Ascending fold of a float multiset
fn fold_floats(floats: &BTreeMap<Scalar, u64>) -> f64 {
    let mut total = 0.0;
    for (value, count) in floats {
        if let Scalar::Float(f) = value {
            for _ in 0..*count {
                total += f;
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyCodec;
    use stratadex_core::tuple;

    fn member(group: Tuple, measure: Option<Scalar>) -> Membership {
        Membership::new(KeyCodec.encode(&group), group, measure)
    }

    fn join(table: &mut AggregateTable, doc: &str, group: Tuple, measure: Option<Scalar>) -> usize {
        table
            .replace_document(&DocumentId::from(doc), vec![member(group, measure)])
            .unwrap()
    }

    fn leave(table: &mut AggregateTable, doc: &str) -> usize {
        table.remove_document(&DocumentId::from(doc))
    }

    fn get(table: &AggregateTable, group: Tuple) -> Option<AggregateValue> {
        table.get(&KeyCodec.encode(&group))
    }

    #[test]
    fn test_counter_insert_and_delete() {
        let mut table = AggregateTable::new(Reducer::Counter);
        for doc in ["a", "b", "c"] {
            assert_eq!(join(&mut table, doc, tuple!["g"], None), 1);
        }
        assert_eq!(leave(&mut table, "a"), 1);
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Count(2)));

        // never inserted
        assert_eq!(leave(&mut table, "zzz"), 0);
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Count(2)));
    }

    #[test]
    fn test_counter_group_dropped_at_zero() {
        let mut table = AggregateTable::new(Reducer::Counter);
        join(&mut table, "a", tuple![1], None);
        leave(&mut table, "a");
        assert_eq!(get(&table, tuple![1]), None);
        assert!(table.is_empty());
        assert!(table.documents().is_empty());
    }

    #[test]
    fn test_counter_floor_at_zero() {
        let mut table = AggregateTable::new(Reducer::Counter);
        let key = KeyCodec.encode(&tuple!["g"]);
        assert!(!table.apply_delta(&key, &tuple!["g"], &AggregateDelta::Remove(None)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_replace_moves_between_groups() {
        let mut table = AggregateTable::new(Reducer::Counter);
        join(&mut table, "a", tuple!["old"], None);
        join(&mut table, "b", tuple!["old"], None);
        assert_eq!(join(&mut table, "a", tuple!["new"], None), 2);
        assert_eq!(get(&table, tuple!["old"]), Some(AggregateValue::Count(1)));
        assert_eq!(get(&table, tuple!["new"]), Some(AggregateValue::Count(1)));
    }

    #[test]
    fn test_replace_unchanged_is_noop() {
        let mut table = AggregateTable::new(Reducer::Sum);
        join(&mut table, "a", tuple!["g"], Some(Scalar::Int(3)));
        assert_eq!(join(&mut table, "a", tuple!["g"], Some(Scalar::Int(3))), 0);
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Int(3))));
    }

    #[test]
    fn test_duplicate_groups_count_once() {
        let mut table = AggregateTable::new(Reducer::Counter);
        let doc = DocumentId::from("a");
        let applied = table
            .replace_document(&doc, vec![member(tuple!["x"], None), member(tuple!["x"], None)])
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(table.memberships(&doc).map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_sum_int_and_float() {
        let mut table = AggregateTable::new(Reducer::Sum);
        join(&mut table, "a", tuple!["g"], Some(Scalar::Int(5)));
        join(&mut table, "b", tuple!["g"], Some(Scalar::Int(7)));
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Int(12))));

        join(&mut table, "c", tuple!["g"], Some(Scalar::Float(0.5)));
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Float(12.5))));

        leave(&mut table, "c");
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Int(12))));

        // measure change within the same group
        join(&mut table, "a", tuple!["g"], Some(Scalar::Int(1)));
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Int(8))));
    }

    #[test]
    fn test_sum_float_removal_leaves_no_residue() {
        let mut table = AggregateTable::new(Reducer::Sum);
        join(&mut table, "a", tuple!["g"], Some(Scalar::Float(0.1)));
        join(&mut table, "b", tuple!["g"], Some(Scalar::Float(0.2)));
        leave(&mut table, "a");
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Float(0.2))));

        // same members, different arrival order
        let mut other = AggregateTable::new(Reducer::Sum);
        for (doc, v) in [("x", 0.7), ("y", 0.1), ("z", 0.2)] {
            join(&mut other, doc, tuple!["g"], Some(Scalar::Float(v)));
        }
        let mut table = AggregateTable::new(Reducer::Sum);
        for (doc, v) in [("z", 0.2), ("q", 5.5), ("x", 0.7), ("y", 0.1)] {
            join(&mut table, doc, tuple!["g"], Some(Scalar::Float(v)));
        }
        leave(&mut table, "q");
        assert_eq!(get(&table, tuple!["g"]), get(&other, tuple!["g"]));
    }

    #[test]
    fn test_sum_non_finite_member_withdrawn() {
        let mut table = AggregateTable::new(Reducer::Sum);
        join(&mut table, "a", tuple!["g"], Some(Scalar::Float(1.5)));
        join(&mut table, "b", tuple!["g"], Some(Scalar::Float(f64::INFINITY)));
        assert_eq!(
            get(&table, tuple!["g"]),
            Some(AggregateValue::Sum(Scalar::Float(f64::INFINITY)))
        );
        leave(&mut table, "b");
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Float(1.5))));

        join(&mut table, "c", tuple!["g"], Some(Scalar::Float(f64::INFINITY)));
        join(&mut table, "d", tuple!["g"], Some(Scalar::Float(f64::NEG_INFINITY)));
        match get(&table, tuple!["g"]) {
            Some(AggregateValue::Sum(Scalar::Float(f))) => assert!(f.is_nan()),
            other => panic!("unexpected sum: {:?}", other),
        }
        leave(&mut table, "d");
        assert_eq!(
            get(&table, tuple!["g"]),
            Some(AggregateValue::Sum(Scalar::Float(f64::INFINITY)))
        );

        join(&mut table, "e", tuple!["g"], Some(Scalar::Float(f64::NAN)));
        leave(&mut table, "e");
        leave(&mut table, "c");
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Float(1.5))));
    }

    #[test]
    fn test_sum_beyond_i64_becomes_float() {
        let mut table = AggregateTable::new(Reducer::Sum);
        join(&mut table, "a", tuple!["g"], Some(Scalar::Int(i64::MAX)));
        join(&mut table, "b", tuple!["g"], Some(Scalar::Int(i64::MAX)));
        let expected = (i128::from(i64::MAX) * 2) as f64;
        assert_eq!(
            get(&table, tuple!["g"]),
            Some(AggregateValue::Sum(Scalar::Float(expected)))
        );

        leave(&mut table, "b");
        assert_eq!(
            get(&table, tuple!["g"]),
            Some(AggregateValue::Sum(Scalar::Int(i64::MAX)))
        );
    }

    #[test]
    fn test_min_max_compare_int_and_float_numerically() {
        let mut min = AggregateTable::new(Reducer::Min);
        let mut max = AggregateTable::new(Reducer::Max);
        for table in [&mut min, &mut max] {
            join(table, "a", tuple!["g"], Some(Scalar::Int(3)));
            join(table, "b", tuple!["g"], Some(Scalar::Float(2.5)));
            join(table, "c", tuple!["g"], Some(Scalar::Float(3.5)));
        }
        assert_eq!(get(&min, tuple!["g"]), Some(AggregateValue::Min(Scalar::Float(2.5))));
        assert_eq!(get(&max, tuple!["g"]), Some(AggregateValue::Max(Scalar::Float(3.5))));

        leave(&mut min, "b");
        leave(&mut max, "c");
        assert_eq!(get(&min, tuple!["g"]), Some(AggregateValue::Min(Scalar::Int(3))));
        assert_eq!(get(&max, tuple!["g"]), Some(AggregateValue::Max(Scalar::Int(3))));
    }

    #[test]
    fn test_numerically_equal_int_and_float_stay_distinct() {
        let mut table = AggregateTable::new(Reducer::Min);
        join(&mut table, "a", tuple!["g"], Some(Scalar::Int(2)));
        join(&mut table, "b", tuple!["g"], Some(Scalar::Float(2.0)));
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Min(Scalar::Int(2))));
        leave(&mut table, "a");
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Min(Scalar::Float(2.0))));
        leave(&mut table, "b");
        assert_eq!(get(&table, tuple!["g"]), None);
    }

    #[test]
    fn test_rejected_replace_leaves_table_untouched() {
        let mut table = AggregateTable::new(Reducer::Sum);
        join(&mut table, "a", tuple!["g"], Some(Scalar::Int(2)));
        let err = table
            .replace_document(
                &DocumentId::from("a"),
                vec![member(tuple!["g"], Some(Scalar::from("x")))],
            )
            .unwrap_err();
        assert!(matches!(err, ExtractError::TypeMismatch { .. }));
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Sum(Scalar::Int(2))));
        assert!(table.memberships(&DocumentId::from("a")).is_some());
    }

    #[test]
    fn test_measure_required() {
        let table = AggregateTable::new(Reducer::Max);
        assert!(table.validate(&AggregateDelta::Add(None)).is_err());
        let counter = AggregateTable::new(Reducer::Counter);
        assert!(counter.validate(&AggregateDelta::Add(None)).is_ok());
    }

    #[test]
    fn test_min_falls_back_after_removing_extreme() {
        let mut table = AggregateTable::new(Reducer::Min);
        for (doc, v) in [("a", 3), ("b", 1), ("c", 1), ("d", 2)] {
            join(&mut table, doc, tuple!["g"], Some(Scalar::Int(v)));
        }
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Min(Scalar::Int(1))));
        leave(&mut table, "b");
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Min(Scalar::Int(1))));
        leave(&mut table, "c");
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Min(Scalar::Int(2))));
    }

    #[test]
    fn test_max_tracks_largest() {
        let mut table = AggregateTable::new(Reducer::Max);
        join(&mut table, "a", tuple!["g"], Some(Scalar::Int(4)));
        join(&mut table, "b", tuple!["g"], Some(Scalar::Int(9)));
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Max(Scalar::Int(9))));
        leave(&mut table, "b");
        assert_eq!(get(&table, tuple!["g"]), Some(AggregateValue::Max(Scalar::Int(4))));
    }

    #[test]
    fn test_groups_listing_is_ordered() {
        let mut table = AggregateTable::new(Reducer::Counter);
        join(&mut table, "1", tuple!["b"], None);
        join(&mut table, "2", tuple!["a"], None);
        join(&mut table, "3", tuple!["a"], None);
        assert_eq!(
            table.groups(),
            vec![
                (tuple!["a"], AggregateValue::Count(2)),
                (tuple!["b"], AggregateValue::Count(1)),
            ]
        );
        table.clear();
        assert_eq!(table.len(), 0);
        assert!(table.documents().is_empty());
    }

    #[test]
    fn test_value_display_and_scalar() {
        assert_eq!(AggregateValue::Count(3).to_string(), "3");
        assert_eq!(AggregateValue::Count(3).to_scalar(), Scalar::Int(3));
        assert_eq!(AggregateValue::Count(3).as_count(), Some(3));
        assert_eq!(AggregateValue::Min(Scalar::Int(1)).as_count(), None);
        assert_eq!(Reducer::Sum.to_string(), "sum");
        assert!(!Reducer::Counter.needs_measure());
    }
}

//! Group-by / filter queries over counted events
//!
//! A query names the dimensions to group by, an optional allow-list per
//! dimension, and optional time bounds. The answer maps a 64-bit group key
//! to the summed count of every counter node that falls in that group.
//!
//! # Filter semantics
//!
//! A node passes when, for every filtered dimension, it carries that
//! dimension with one of the allowed values (AND across dimensions, OR
//! within one dimension's allow-list). An empty filter accepts everything.
//!
//! # Grouping
//!
//! Only the group-by dimensions a node actually carries take part in its key;
//! a node carrying none of them is skipped. What the key is built from is
//! set by [`GroupingPolicy`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::{hash_encoded_event, hash_id_set};
use crate::types::{DimensionId, EncodedEvent, ValueId};

/// Group-by dimension set, kept sorted
pub type GroupBy = BTreeSet<DimensionId>;

/// Allowed values per filtered dimension
pub type Filter = HashMap<DimensionId, HashSet<ValueId>>;

/// Partial or final aggregation: group key -> summed count
pub type Counts = HashMap<u64, u64>;

/// How a node's group key is derived from the group-by dimensions it carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingPolicy {
    /// Key on the carried dimensions together with their values
    ///
    /// `{"country":"US"}` and `{"country":"FR"}` land in different buckets.
    #[default]
    Value,

    /// Key on which group-by dimensions are carried, ignoring values
    ///
    /// `{"country":"US"}` and `{"country":"FR"}` share one bucket.
    Presence,
}

impl GroupingPolicy {
    /// Group key for an event, or `None` if it carries no group-by dimension
    pub fn group_key(self, event: &EncodedEvent, group_by: &GroupBy) -> Option<u64> {
        match self {
            GroupingPolicy::Value => {
                let projected: EncodedEvent = event
                    .iter()
                    .filter(|(dimension, _)| group_by.contains(dimension))
                    .collect();
                if projected.is_empty() {
                    None
                } else {
                    Some(hash_encoded_event(&projected))
                }
            },
            GroupingPolicy::Presence => {
                let present: Vec<DimensionId> = event
                    .dimensions()
                    .filter(|dimension| group_by.contains(dimension))
                    .collect();
                if present.is_empty() {
                    None
                } else {
                    Some(hash_id_set(present))
                }
            },
        }
    }

    /// Name used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            GroupingPolicy::Value => "value",
            GroupingPolicy::Presence => "presence",
        }
    }
}

impl std::str::FromStr for GroupingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "value" => Ok(GroupingPolicy::Value),
            "presence" => Ok(GroupingPolicy::Presence),
            other => Err(format!("unknown grouping policy '{}'", other)),
        }
    }
}

/// Whether an event passes a filter
pub fn matches_filter(event: &EncodedEvent, filter: &Filter) -> bool {
    filter.iter().all(|(dimension, allowed)| {
        event
            .get(*dimension)
            .is_some_and(|value| allowed.contains(&value))
    })
}

/// Add every bucket of `partial` into `target`
pub fn merge_counts(target: &mut Counts, partial: Counts) {
    if target.is_empty() {
        *target = partial;
        return;
    }
    for (key, count) in partial {
        *target.entry(key).or_insert(0) += count;
    }
}

// ============================================================================
// Query Descriptions
// ============================================================================

/// Query expressed with encoded ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdQuery {
    /// Dimensions to group by
    pub group_by: GroupBy,
    /// Per-dimension allow-lists
    pub filter: Filter,
    /// Inclusive start; selects the day bucket that is scanned
    pub start: Option<DateTime<Utc>>,
    /// Inclusive end; ignored for any day other than its own
    pub end: Option<DateTime<Utc>>,
}

impl IdQuery {
    /// Create an empty query (no grouping, no filter, whole retention)
    pub fn new() -> Self {
        Self::default()
    }
}

/// Query expressed with dimension names and value strings
///
/// # Example
///
/// ```rust
/// use kuba_counter::query::Query;
///
/// let query = Query::new()
///     .group_by("country")
///     .filter("plan", ["pro", "team"]);
///
/// assert_eq!(query.group_by_names().count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    group_by: BTreeSet<String>,
    filter: BTreeMap<String, BTreeSet<String>>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

impl Query {
    /// Create an empty query
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group-by dimension
    pub fn group_by(mut self, dimension: impl Into<String>) -> Self {
        self.group_by.insert(dimension.into());
        self
    }

    /// Restrict a dimension to the given values
    ///
    /// Calling this twice for one dimension widens its allow-list.
    pub fn filter<I, V>(mut self, dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.filter
            .entry(dimension.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Set the inclusive start bound
    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the inclusive end bound
    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Group-by dimension names
    pub fn group_by_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.group_by.iter().map(String::as_str)
    }

    /// Filter entries as `(dimension, allowed values)`
    pub fn filters(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> + '_ {
        self.filter.iter().map(|(d, v)| (d.as_str(), v))
    }

    /// Start bound
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// End bound
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end
    }
}

// ============================================================================
// Query Result
// ============================================================================

/// Fully merged answer of a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    buckets: Counts,
}

impl QueryResult {
    /// Wrap merged counts
    pub fn new(buckets: Counts) -> Self {
        Self { buckets }
    }

    /// Count for one group key
    pub fn get(&self, key: u64) -> Option<u64> {
        self.buckets.get(&key).copied()
    }

    /// Sum over all buckets
    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Iterate `(group key, count)`
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.buckets.iter().map(|(k, v)| (*k, *v))
    }

    /// Bucket counts, largest first
    pub fn sorted_counts(&self) -> Vec<u64> {
        let mut counts: Vec<u64> = self.buckets.values().copied().collect();
        counts.sort_unstable_by(|a, b| b.cmp(a));
        counts
    }

    /// Unwrap the underlying map
    pub fn into_inner(self) -> Counts {
        self.buckets
    }
}

impl From<Counts> for QueryResult {
    fn from(buckets: Counts) -> Self {
        Self::new(buckets)
    }
}

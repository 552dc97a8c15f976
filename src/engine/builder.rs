//! Engine builder and the counting engine itself
//!
//! This module provides the main [`Engine`] type that ties the dictionary
//! encoder and the per-day cubes into one counting service, and the
//! [`EngineBuilder`] used to configure it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::Config;
use crate::counter::{Cube, Upsert};
use crate::dictionary::DictionaryEncoder;
use crate::error::{Error, Result};
use crate::hash::PartitionPolicy;
use crate::metrics::{self, IncrementOutcome};
use crate::query::{
    merge_counts, Counts, Filter, GroupBy, GroupingPolicy, IdQuery, Query, QueryResult,
};
use crate::types::{EncodedEvent, TimeSlot};

/// Builder for configuring a counting engine
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: Config,
}

impl EngineBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set how content hashes map to partitions
    pub fn with_partition_policy(mut self, policy: PartitionPolicy) -> Self {
        self.config.engine.partition_policy = policy;
        self
    }

    /// Set how query results are bucketed
    pub fn with_grouping_policy(mut self, policy: GroupingPolicy) -> Self {
        self.config.engine.grouping_policy = policy;
        self
    }

    /// Pre-size the dictionary tables
    pub fn with_capacity(mut self, dimensions: usize, values_per_dimension: usize) -> Self {
        self.config.engine.dimension_capacity = dimensions;
        self.config.engine.value_capacity = values_per_dimension;
        self
    }

    /// Enable or disable parallel partition scans
    pub fn with_parallel_queries(mut self, parallel: bool) -> Self {
        self.config.query.parallel = parallel;
        self
    }

    /// Enable or disable Prometheus recording
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.monitoring.metrics_enabled = enabled;
        self
    }

    /// Validate the configuration and build the engine
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        Ok(Engine::from_config(self.config))
    }
}

// ============================================================================
// Engine Statistics
// ============================================================================

/// Statistics for engine operations
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Increments applied
    pub increments: AtomicU64,

    /// Increments rejected (bad minute or invalid labels)
    pub rejected: AtomicU64,

    /// Counter nodes created
    pub nodes_inserted: AtomicU64,

    /// Day cubes created
    pub cubes_created: AtomicU64,

    /// Queries answered
    pub queries: AtomicU64,
}

impl EngineStats {
    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            increments: self.increments.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            nodes_inserted: self.nodes_inserted.load(Ordering::Relaxed),
            cubes_created: self.cubes_created.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    /// Increments applied
    pub increments: u64,
    /// Increments rejected
    pub rejected: u64,
    /// Counter nodes created
    pub nodes_inserted: u64,
    /// Day cubes created
    pub cubes_created: u64,
    /// Queries answered
    pub queries: u64,
}

// ============================================================================
// Engine
// ============================================================================

/// In-memory per-minute event counter
///
/// Events are labelled with string dimensions, encoded to dense ids under
/// the dictionary's mutex, and counted lock-free in the cube of their UTC
/// day. Cubes are created on first use and kept for the engine's lifetime.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use kuba_counter::{Engine, Query};
///
/// let engine = Engine::new();
/// let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
///
/// engine.increment(ts, [("country", "US")], 1).unwrap();
/// engine.increment(ts, [("country", "US")], 1).unwrap();
/// engine.increment(ts, [("country", "FR")], 1).unwrap();
///
/// let result = engine.query(&Query::new().group_by("country"));
/// assert_eq!(result.sorted_counts(), vec![2, 1]);
/// ```
#[derive(Debug)]
pub struct Engine {
    config: Config,
    dictionary: DictionaryEncoder,
    cubes: DashMap<i64, Arc<Cube>>,
    stats: EngineStats,
}

impl Engine {
    /// Create an engine with default configuration
    pub fn new() -> Self {
        Self::from_config(Config::default())
    }

    /// Start configuring an engine
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn from_config(config: Config) -> Self {
        let dictionary = DictionaryEncoder::with_capacity(
            config.engine.dimension_capacity,
            config.engine.value_capacity,
        )
        .with_limits(
            config.engine.max_dimension_name_length,
            config.engine.max_dimension_value_length,
        );

        Self {
            config,
            dictionary,
            cubes: DashMap::new(),
            stats: EngineStats::default(),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dictionary shared by every cube
    pub fn dictionary(&self) -> &DictionaryEncoder {
        &self.dictionary
    }

    /// Snapshot of operation counters
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Grouping policy applied by queries
    pub fn grouping_policy(&self) -> GroupingPolicy {
        self.config.engine.grouping_policy
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Count `delta` occurrences of an event at `timestamp`
    ///
    /// Returns the event's total for that minute after the update.
    pub fn increment<I, K, V>(
        &self,
        timestamp: DateTime<Utc>,
        labels: I,
        delta: u64,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let event = self.dictionary.encode(labels);
        self.apply(TimeSlot::from_datetime(timestamp), event, delta)
    }

    /// Like [`Engine::increment`], with a Unix timestamp in seconds
    pub fn increment_at<I, K, V>(&self, epoch_seconds: i64, labels: I, delta: u64) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let event = self.dictionary.encode(labels);
        self.apply(TimeSlot::from_epoch_seconds(epoch_seconds), event, delta)
    }

    /// Like [`Engine::increment`], rejecting over-long names or values
    ///
    /// Nothing is interned or counted when a label is rejected.
    pub fn try_increment<I, K, V>(
        &self,
        timestamp: DateTime<Utc>,
        labels: I,
        delta: u64,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let event = self.dictionary.try_encode(labels).map_err(|e| {
            self.record_rejected();
            Error::from(e)
        })?;
        self.apply(TimeSlot::from_datetime(timestamp), event, delta)
    }

    /// Count an already encoded event
    pub fn increment_encoded(
        &self,
        timestamp: DateTime<Utc>,
        event: EncodedEvent,
        delta: u64,
    ) -> Result<u64> {
        self.apply(TimeSlot::from_datetime(timestamp), event, delta)
    }

    fn apply(&self, slot: TimeSlot, event: EncodedEvent, delta: u64) -> Result<u64> {
        let cube = self.cube_for_day(slot.day_start);

        match cube.upsert(slot.minute_of_day as i64, event, delta) {
            Ok(outcome) => {
                self.stats.increments.fetch_add(1, Ordering::Relaxed);
                let label = match outcome {
                    Upsert::Inserted(_) => {
                        self.stats.nodes_inserted.fetch_add(1, Ordering::Relaxed);
                        IncrementOutcome::Inserted
                    },
                    Upsert::Incremented(_) => IncrementOutcome::Incremented,
                };
                if self.config.monitoring.metrics_enabled {
                    metrics::record_increment(label);
                }
                Ok(outcome.count())
            },
            Err(e) => {
                self.record_rejected();
                Err(e)
            },
        }
    }

    fn record_rejected(&self) {
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        if self.config.monitoring.metrics_enabled {
            metrics::record_increment(IncrementOutcome::Rejected);
        }
    }

    fn record_query(&self, elapsed: Duration) {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        if self.config.monitoring.metrics_enabled {
            metrics::record_query(elapsed.as_secs_f64());
        }
    }

    /// Cube for a day, created on first use
    fn cube_for_day(&self, day_start: i64) -> Arc<Cube> {
        if let Some(cube) = self.cubes.get(&day_start) {
            return Arc::clone(cube.value());
        }

        let entry = self.cubes.entry(day_start).or_insert_with(|| {
            info!(
                day_start,
                partition_policy = self.config.engine.partition_policy.as_str(),
                "Creating cube for new day"
            );
            self.stats.cubes_created.fetch_add(1, Ordering::Relaxed);
            if self.config.monitoring.metrics_enabled {
                metrics::record_cube_created();
            }
            Arc::new(
                Cube::new(day_start, self.config.engine.partition_policy)
                    .with_parallel(self.config.query.parallel),
            )
        });
        Arc::clone(entry.value())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Cube for the day starting at `day_start`, if one exists
    pub fn cube(&self, day_start: i64) -> Option<Arc<Cube>> {
        self.cubes.get(&day_start).map(|cube| Arc::clone(cube.value()))
    }

    /// Start timestamps of every day holding data, ascending
    pub fn cube_days(&self) -> Vec<i64> {
        let mut days: Vec<i64> = self.cubes.iter().map(|entry| *entry.key()).collect();
        days.sort_unstable();
        days
    }

    /// Current count of one event at the minute containing `timestamp`
    ///
    /// Events with never-seen labels count 0 and are not interned.
    pub fn count<I, K, V>(&self, timestamp: DateTime<Utc>, labels: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let Some(event) = self.dictionary.lookup(labels) else {
            return Ok(0);
        };
        let slot = TimeSlot::from_datetime(timestamp);
        match self.cube(slot.day_start) {
            Some(cube) => cube.count(slot.minute_of_day as i64, &event),
            None => Ok(0),
        }
    }

    /// Group key a query would report for an event with these labels
    ///
    /// Returns `None` when a label is unknown or the event carries none of
    /// the query's group-by dimensions.
    pub fn group_key<I, K, V>(&self, query: &Query, labels: I) -> Option<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let event = self.dictionary.lookup(labels)?;
        let group_by = self.resolve_group_by(query);
        self.grouping_policy().group_key(&event, &group_by)
    }

    fn resolve_group_by(&self, query: &Query) -> GroupBy {
        query
            .group_by_names()
            .filter_map(|name| self.dictionary.dimension_id(name))
            .collect()
    }

    /// Resolve a named filter, or `None` if it can match nothing
    fn resolve_filter(&self, query: &Query) -> Option<Filter> {
        let mut filter = Filter::new();
        for (name, values) in query.filters() {
            let dimension = self.dictionary.dimension_id(name)?;
            let allowed: std::collections::HashSet<_> = values
                .iter()
                .filter_map(|value| self.dictionary.value_id(dimension, value))
                .collect();
            if allowed.is_empty() {
                return None;
            }
            filter.insert(dimension, allowed);
        }
        Some(filter)
    }

    /// Run a query expressed with names
    ///
    /// Unknown group-by names are ignored. A filter naming an unknown
    /// dimension, or listing no known value, matches nothing.
    pub fn query(&self, query: &Query) -> QueryResult {
        let Some(filter) = self.resolve_filter(query) else {
            debug!("Query filter references unknown labels; nothing can match");
            self.record_query(Duration::ZERO);
            return QueryResult::default();
        };

        self.query_ids(&IdQuery {
            group_by: self.resolve_group_by(query),
            filter,
            start: query.start_time(),
            end: query.end_time(),
        })
    }

    /// Run a query expressed with encoded ids
    ///
    /// With a start bound only the start day's cube is scanned; without one
    /// every cube up to the end bound's day is scanned and the results are
    /// merged. A start day after the end day selects nothing. Blocks until
    /// every partition of every selected cube has been merged.
    pub fn query_ids(&self, query: &IdQuery) -> QueryResult {
        let started = Instant::now();
        let policy = self.grouping_policy();

        let start_day = query.start.map(|ts| TimeSlot::from_datetime(ts).day_start);
        let end_day = query.end.map(|ts| TimeSlot::from_datetime(ts).day_start);

        let cubes: Vec<Arc<Cube>> = match (start_day, end_day) {
            (Some(start), Some(end)) if start > end => Vec::new(),
            (Some(start), _) => self.cube(start).into_iter().collect(),
            (None, end) => self
                .cubes
                .iter()
                .filter(|entry| end.map_or(true, |end| *entry.key() <= end))
                .map(|entry| Arc::clone(entry.value()))
                .collect(),
        };

        let mut counts = Counts::new();
        for cube in &cubes {
            let partial = cube.query(
                &query.group_by,
                &query.filter,
                policy,
                query.start,
                query.end,
            );
            merge_counts(&mut counts, partial);
        }

        let elapsed = started.elapsed();
        self.record_query(elapsed);
        debug!(
            cubes = cubes.len(),
            buckets = counts.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Query completed"
        );

        QueryResult::new(counts)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

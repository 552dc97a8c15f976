//! One day of counters
//!
//! A cube owns a fixed `DAY_MINUTES × NUM_PARTITIONS` grid of counter
//! chains. Writes hash the encoded event, pick a partition with the cube's
//! [`PartitionPolicy`] and upsert into the chain at `[minute][partition]`.
//! Queries fan out one rayon task per partition; each task scans its
//! partition over the requested minutes into a private map, and the partial
//! maps are merged once every task has finished.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use super::chain::{CounterChain, CounterNode, Upsert};
use crate::error::{Error, Result};
use crate::hash::{hash_encoded_event, PartitionPolicy};
use crate::query::{merge_counts, Counts, Filter, GroupBy, GroupingPolicy};
use crate::types::{EncodedEvent, TimeSlot, DAY_MINUTES, NUM_PARTITIONS};

/// Counter storage for one UTC day
#[derive(Debug)]
pub struct Cube {
    /// Unix timestamp of the start of the day
    day_start: i64,

    /// Row-major grid: chain for `(minute, partition)` at `minute * NUM_PARTITIONS + partition`
    slots: Box<[CounterChain]>,

    /// How content hashes map to partitions
    partition_policy: PartitionPolicy,

    /// Run queries on the rayon pool (false: scan partitions in order)
    parallel: bool,

    /// Nodes linked so far
    nodes: AtomicU64,
}

impl Cube {
    /// Create an empty cube for the day starting at `day_start`
    pub fn new(day_start: i64, partition_policy: PartitionPolicy) -> Self {
        let slots = (0..DAY_MINUTES * NUM_PARTITIONS)
            .map(|_| CounterChain::new())
            .collect();
        Self {
            day_start,
            slots,
            partition_policy,
            parallel: true,
            nodes: AtomicU64::new(0),
        }
    }

    /// Create the cube for the day containing `ts`
    pub fn for_timestamp(ts: DateTime<Utc>, partition_policy: PartitionPolicy) -> Self {
        Self::new(TimeSlot::from_datetime(ts).day_start, partition_policy)
    }

    /// Enable or disable parallel query execution
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Unix timestamp of the start of this cube's day
    pub fn day_start(&self) -> i64 {
        self.day_start
    }

    /// Partition policy used for writes
    pub fn partition_policy(&self) -> PartitionPolicy {
        self.partition_policy
    }

    /// Number of distinct (minute, event) counters
    pub fn node_count(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    #[inline]
    fn slot(&self, minute: usize, partition: usize) -> &CounterChain {
        &self.slots[minute * NUM_PARTITIONS + partition]
    }

    fn check_minute(minute: i64) -> Result<usize> {
        if (0..DAY_MINUTES as i64).contains(&minute) {
            Ok(minute as usize)
        } else {
            Err(Error::MinuteOutOfRange { minute })
        }
    }

    /// Add `count` to the counter for `event` at `minute`, reporting whether
    /// a new counter was created
    pub fn upsert(&self, minute: i64, event: EncodedEvent, count: u64) -> Result<Upsert> {
        let minute = Self::check_minute(minute).map_err(|e| {
            warn!(minute, day_start = self.day_start, "Rejected increment: {}", e);
            e
        })?;

        let hash = hash_encoded_event(&event);
        let partition = self.partition_policy.partition_for(hash);
        debug!(minute, partition, hash, "Selected partition");

        let outcome = self
            .slot(minute, partition)
            .upsert(Box::new(CounterNode::with_hash(hash, event, count)));

        if outcome.is_inserted() {
            self.nodes.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            minute,
            partition,
            inserted = outcome.is_inserted(),
            total = outcome.count(),
            "Counter updated"
        );

        Ok(outcome)
    }

    /// Add `count` to the counter for `event` at `minute`
    ///
    /// Returns the event's total for that minute after the update. Fails
    /// with [`Error::MinuteOutOfRange`] unless `0 <= minute < DAY_MINUTES`.
    pub fn increment_by(&self, minute: i64, event: EncodedEvent, count: u64) -> Result<u64> {
        self.upsert(minute, event, count).map(Upsert::count)
    }

    /// Current count of `event` at `minute` (0 if never incremented)
    pub fn count(&self, minute: i64, event: &EncodedEvent) -> Result<u64> {
        let minute = Self::check_minute(minute)?;
        let hash = hash_encoded_event(event);
        let partition = self.partition_policy.partition_for(hash);
        Ok(self
            .slot(minute, partition)
            .get(hash)
            .map_or(0, CounterNode::count))
    }

    /// Minutes of this day selected by optional bounds
    ///
    /// A start bound on another day selects nothing. An end bound on another
    /// day is ignored and the range runs to the end of this day.
    pub fn minute_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Option<RangeInclusive<usize>> {
        let mut first = 0;
        let mut last = DAY_MINUTES - 1;

        if let Some(start) = start {
            let slot = TimeSlot::from_datetime(start);
            if slot.day_start != self.day_start {
                return None;
            }
            first = slot.minute_of_day;
        }
        if let Some(end) = end {
            let slot = TimeSlot::from_datetime(end);
            if slot.day_start == self.day_start {
                last = slot.minute_of_day;
            }
        }

        (first <= last).then_some(first..=last)
    }

    /// Sum counts grouped by `group_by`, restricted by `filter` and time bounds
    ///
    /// Blocks until every partition has been scanned and merged.
    pub fn query(
        &self,
        group_by: &GroupBy,
        filter: &Filter,
        policy: GroupingPolicy,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Counts {
        let Some(minutes) = self.minute_range(start, end) else {
            debug!(day_start = self.day_start, "Query bounds select no minute of this cube");
            return Counts::new();
        };
        debug!(
            day_start = self.day_start,
            first = minutes.start(),
            last = minutes.end(),
            "Scanning cube"
        );

        let scan_partition = |partition: usize| {
            let mut partial = Counts::new();
            for minute in minutes.clone() {
                self.slot(minute, partition)
                    .scan(group_by, filter, policy, &mut partial);
            }
            partial
        };

        let partials: Vec<Counts> = if self.parallel {
            (0..NUM_PARTITIONS)
                .into_par_iter()
                .map(scan_partition)
                .collect()
        } else {
            (0..NUM_PARTITIONS).map(scan_partition).collect()
        };

        let mut counts = Counts::new();
        for partial in partials {
            merge_counts(&mut counts, partial);
        }
        counts
    }
}

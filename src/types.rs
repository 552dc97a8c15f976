//! Core data types used throughout the counter engine
//!
//! # Key Types
//!
//! - **`DimensionId`**: Dense identifier of a dimension name (e.g. "country")
//! - **`ValueId`**: Dense identifier of a value within one dimension (e.g. "US")
//! - **`EncodedEvent`**: An event's labels as sorted `(DimensionId, ValueId)` pairs
//! - **`TimeSlot`**: A timestamp split into day bucket and minute of day
//!
//! # Example
//!
//! ```rust
//! use kuba_counter::types::{DimensionId, EncodedEvent, TimeSlot, ValueId};
//!
//! let event = EncodedEvent::from_pairs([
//!     (DimensionId(1), ValueId(7)),
//!     (DimensionId(0), ValueId(3)),
//! ]);
//! assert_eq!(event.get(DimensionId(0)), Some(ValueId(3)));
//!
//! let slot = TimeSlot::from_epoch_seconds(86_400 + 125);
//! assert_eq!(slot.day_start, 86_400);
//! assert_eq!(slot.minute_of_day, 2);
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds in one day bucket
pub const DAY_SECONDS: i64 = 24 * 60 * 60;

/// Minutes in one day bucket (rows of a cube)
pub const DAY_MINUTES: usize = 24 * 60;

/// Partitions per minute (columns of a cube)
pub const NUM_PARTITIONS: usize = 64;

// ============================================================================
// Identifiers
// ============================================================================

/// Dimension name identifier
///
/// Assigned in first-seen order starting at 0 and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimensionId(pub u32);

/// Dimension value identifier, scoped to its `DimensionId`
///
/// "US" under "country" and "US" under "region" get independent ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ============================================================================
// Encoded Event
// ============================================================================

/// An event's dimension labels in integer form
///
/// Stored as a vector sorted by `DimensionId` with at most one entry per
/// dimension, so two events with the same label set compare and hash equal
/// regardless of the order their labels arrived in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedEvent {
    pairs: Vec<(DimensionId, ValueId)>,
}

impl EncodedEvent {
    /// Create an empty event
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Build from arbitrary-order pairs
    ///
    /// If a dimension appears more than once the last value wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (DimensionId, ValueId)>,
    {
        let mut event = Self::new();
        for (dimension, value) in pairs {
            event.insert(dimension, value);
        }
        event
    }

    /// Set the value for a dimension, keeping the pairs sorted
    pub fn insert(&mut self, dimension: DimensionId, value: ValueId) {
        match self.pairs.binary_search_by_key(&dimension, |(d, _)| *d) {
            Ok(pos) => self.pairs[pos].1 = value,
            Err(pos) => self.pairs.insert(pos, (dimension, value)),
        }
    }

    /// Value for a dimension, if the event carries it
    pub fn get(&self, dimension: DimensionId) -> Option<ValueId> {
        self.pairs
            .binary_search_by_key(&dimension, |(d, _)| *d)
            .ok()
            .map(|pos| self.pairs[pos].1)
    }

    /// Whether the event carries a dimension
    pub fn contains(&self, dimension: DimensionId) -> bool {
        self.get(dimension).is_some()
    }

    /// Sorted `(dimension, value)` pairs
    pub fn pairs(&self) -> &[(DimensionId, ValueId)] {
        &self.pairs
    }

    /// Iterate over pairs in ascending dimension order
    pub fn iter(&self) -> impl Iterator<Item = (DimensionId, ValueId)> + '_ {
        self.pairs.iter().copied()
    }

    /// Dimensions in ascending order
    pub fn dimensions(&self) -> impl Iterator<Item = DimensionId> + '_ {
        self.pairs.iter().map(|(d, _)| *d)
    }

    /// Number of dimensions
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the event has no dimensions
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<(DimensionId, ValueId)> for EncodedEvent {
    fn from_iter<I: IntoIterator<Item = (DimensionId, ValueId)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

// ============================================================================
// Time Slots
// ============================================================================

/// A timestamp split into its storage coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeSlot {
    /// Unix timestamp (seconds) of the start of the UTC day
    pub day_start: i64,
    /// Minute within the day, `0..DAY_MINUTES`
    pub minute_of_day: usize,
    /// Second within the day, `0..DAY_SECONDS`
    pub second_of_day: u32,
}

impl TimeSlot {
    /// Split a Unix timestamp in seconds
    ///
    /// Uses Euclidean remainder so instants before 1970 still land inside
    /// their own day rather than producing negative minutes.
    pub fn from_epoch_seconds(epoch: i64) -> Self {
        let second_of_day = epoch.rem_euclid(DAY_SECONDS);
        Self {
            day_start: epoch - second_of_day,
            minute_of_day: (second_of_day / 60) as usize,
            second_of_day: second_of_day as u32,
        }
    }

    /// Split a UTC timestamp (sub-second precision is dropped)
    pub fn from_datetime(ts: DateTime<Utc>) -> Self {
        Self::from_epoch_seconds(ts.timestamp())
    }

    /// Days since the Unix epoch
    pub fn day_index(&self) -> i64 {
        self.day_start.div_euclid(DAY_SECONDS)
    }
}

impl From<DateTime<Utc>> for TimeSlot {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::from_datetime(ts)
    }
}

//! Dictionary Encoding for Event Dimensions
//!
//! Turns string labels such as `{"country": "US", "plan": "pro"}` into an
//! [`EncodedEvent`] of dense integer ids:
//!
//! - one interner for dimension names (`DimensionId`)
//! - one interner per dimension for its values (`ValueId`)
//!
//! Both tables only grow. An id, once assigned, keeps its meaning for the
//! lifetime of the encoder.
//!
//! # Concurrency
//!
//! All tables sit behind one `parking_lot::Mutex`. An `encode` call holds it
//! for the whole event, so concurrent encoders serialize here and nowhere
//! else; everything downstream works on the integer ids it returns.
//!
//! # Example
//!
//! ```rust
//! use kuba_counter::dictionary::DictionaryEncoder;
//! use kuba_counter::types::{DimensionId, ValueId};
//!
//! let encoder = DictionaryEncoder::new();
//! let event = encoder.encode([("country", "US"), ("plan", "pro")]);
//!
//! assert_eq!(event.get(DimensionId(0)), Some(ValueId(0)));
//! assert_eq!(encoder.resolve_dimension(DimensionId(1)), Some("plan".to_string()));
//! ```

mod interner;

pub use interner::StringInterner;

use parking_lot::Mutex;

use crate::error::ValidationError;
use crate::types::{DimensionId, EncodedEvent, ValueId};

/// Maximum allowed length for dimension names
pub const MAX_DIMENSION_NAME_LENGTH: usize = 256;

/// Maximum allowed length for dimension values
pub const MAX_DIMENSION_VALUE_LENGTH: usize = 4096;

/// Interners guarded together by the encoder mutex
#[derive(Debug, Default)]
struct Tables {
    /// Dimension names
    dimensions: StringInterner,

    /// Value interners indexed by `DimensionId`
    values: Vec<StringInterner>,
}

impl Tables {
    fn intern(&mut self, name: &str, value: &str, value_capacity: usize) -> (DimensionId, ValueId) {
        let dimension = self.dimensions.intern(name) as usize;
        if dimension == self.values.len() {
            self.values.push(StringInterner::with_capacity(value_capacity));
        }
        let value = self.values[dimension].intern(value);
        (DimensionId(dimension as u32), ValueId(value))
    }
}

/// Encoder from string labels to dense integer ids
#[derive(Debug)]
pub struct DictionaryEncoder {
    tables: Mutex<Tables>,

    /// Pre-allocation hint for each new value interner
    value_capacity: usize,

    /// Limits enforced by `try_encode`
    max_name_length: usize,
    max_value_length: usize,
}

impl DictionaryEncoder {
    /// Create an encoder with default capacities and limits
    pub fn new() -> Self {
        Self::with_capacity(100, 1000)
    }

    /// Create with pre-allocated capacity
    ///
    /// `dimension_capacity` sizes the name table; `value_capacity` sizes each
    /// per-dimension value table when it is first created.
    pub fn with_capacity(dimension_capacity: usize, value_capacity: usize) -> Self {
        Self {
            tables: Mutex::new(Tables {
                dimensions: StringInterner::with_capacity(dimension_capacity),
                values: Vec::with_capacity(dimension_capacity),
            }),
            value_capacity,
            max_name_length: MAX_DIMENSION_NAME_LENGTH,
            max_value_length: MAX_DIMENSION_VALUE_LENGTH,
        }
    }

    /// Override the label length limits used by `try_encode`
    pub fn with_limits(mut self, max_name_length: usize, max_value_length: usize) -> Self {
        self.max_name_length = max_name_length;
        self.max_value_length = max_value_length;
        self
    }

    /// Encode an event's labels, assigning ids to unseen names and values
    ///
    /// Labels are processed in iteration order, which is the order new ids
    /// are handed out in. A repeated name keeps the last value.
    pub fn encode<I, K, V>(&self, labels: I) -> EncodedEvent
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut tables = self.tables.lock();
        labels
            .into_iter()
            .map(|(name, value)| tables.intern(name.as_ref(), value.as_ref(), self.value_capacity))
            .collect()
    }

    /// Encode after checking every label against the length limits
    ///
    /// Nothing is interned when any label is rejected.
    pub fn try_encode<I, K, V>(&self, labels: I) -> Result<EncodedEvent, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let labels: Vec<(K, V)> = labels.into_iter().collect();
        for (name, value) in &labels {
            let (name, value) = (name.as_ref(), value.as_ref());
            if name.len() > self.max_name_length {
                return Err(ValidationError::TooLong {
                    field: "dimension name",
                    actual: name.len(),
                    max: self.max_name_length,
                });
            }
            if value.len() > self.max_value_length {
                return Err(ValidationError::TooLong {
                    field: "dimension value",
                    actual: value.len(),
                    max: self.max_value_length,
                });
            }
        }
        Ok(self.encode(labels))
    }

    /// Encode without assigning anything
    ///
    /// Returns `None` if any name or value has never been seen.
    pub fn lookup<I, K, V>(&self, labels: I) -> Option<EncodedEvent>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let tables = self.tables.lock();
        labels
            .into_iter()
            .map(|(name, value)| {
                let dimension = tables.dimensions.get_id(name.as_ref())?;
                let value = tables.values[dimension as usize].get_id(value.as_ref())?;
                Some((DimensionId(dimension), ValueId(value)))
            })
            .collect()
    }

    /// Get the id of a dimension name (without interning)
    pub fn dimension_id(&self, name: &str) -> Option<DimensionId> {
        self.tables.lock().dimensions.get_id(name).map(DimensionId)
    }

    /// Get the id of a value within a dimension (without interning)
    pub fn value_id(&self, dimension: DimensionId, value: &str) -> Option<ValueId> {
        let tables = self.tables.lock();
        tables
            .values
            .get(dimension.0 as usize)?
            .get_id(value)
            .map(ValueId)
    }

    /// Resolve a dimension id to its name
    pub fn resolve_dimension(&self, dimension: DimensionId) -> Option<String> {
        self.tables
            .lock()
            .dimensions
            .resolve(dimension.0)
            .map(str::to_string)
    }

    /// Resolve a value id within a dimension to its string
    pub fn resolve_value(&self, dimension: DimensionId, value: ValueId) -> Option<String> {
        let tables = self.tables.lock();
        tables
            .values
            .get(dimension.0 as usize)?
            .resolve(value.0)
            .map(str::to_string)
    }

    /// Turn an encoded event back into `(name, value)` labels
    ///
    /// Pairs with unknown ids are dropped.
    pub fn decode(&self, event: &EncodedEvent) -> Vec<(String, String)> {
        let tables = self.tables.lock();
        event
            .iter()
            .filter_map(|(dimension, value)| {
                let name = tables.dimensions.resolve(dimension.0)?;
                let value = tables.values.get(dimension.0 as usize)?.resolve(value.0)?;
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }

    /// All dimension names with their ids, in id order
    pub fn dimensions(&self) -> Vec<(String, DimensionId)> {
        self.tables
            .lock()
            .dimensions
            .iter()
            .map(|(id, name)| (name.to_string(), DimensionId(id)))
            .collect()
    }

    /// Number of known dimensions
    pub fn dimension_count(&self) -> usize {
        self.tables.lock().dimensions.len()
    }

    /// Number of known values for one dimension
    pub fn value_count(&self, dimension: DimensionId) -> usize {
        self.tables
            .lock()
            .values
            .get(dimension.0 as usize)
            .map_or(0, StringInterner::len)
    }

    /// Statistics about the dictionary
    pub fn stats(&self) -> DictionaryStats {
        let tables = self.tables.lock();
        let total_value_count = tables.values.iter().map(StringInterner::len).sum();
        let max_values_per_dimension = tables
            .values
            .iter()
            .map(StringInterner::len)
            .max()
            .unwrap_or(0);
        let memory_bytes = tables.dimensions.memory_usage()
            + tables
                .values
                .iter()
                .map(StringInterner::memory_usage)
                .sum::<usize>();

        DictionaryStats {
            dimension_count: tables.dimensions.len(),
            total_value_count,
            max_values_per_dimension,
            memory_bytes,
        }
    }
}

impl Default for DictionaryEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about a dictionary encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryStats {
    /// Number of unique dimension names
    pub dimension_count: usize,

    /// Unique values summed over all dimensions
    pub total_value_count: usize,

    /// Largest value table (indicates a high-cardinality dimension)
    pub max_values_per_dimension: usize,

    /// Estimated memory usage in bytes
    pub memory_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_seen_order() {
        let encoder = DictionaryEncoder::new();

        let e1 = encoder.encode([("a", "x")]);
        let e2 = encoder.encode([("a", "y")]);
        let e3 = encoder.encode([("b", "x")]);

        assert_eq!(e1.pairs(), &[(DimensionId(0), ValueId(0))]);
        assert_eq!(e2.pairs(), &[(DimensionId(0), ValueId(1))]);
        // "x" under "b" is a separate namespace from "x" under "a"
        assert_eq!(e3.pairs(), &[(DimensionId(1), ValueId(0))]);

        assert_eq!(encoder.dimension_id("a"), Some(DimensionId(0)));
        assert_eq!(encoder.dimension_id("b"), Some(DimensionId(1)));
        assert_eq!(encoder.value_id(DimensionId(0), "y"), Some(ValueId(1)));
    }

    #[test]
    fn test_reencoding_is_stable() {
        let encoder = DictionaryEncoder::new();
        let mut labels = HashMap::new();
        labels.insert("country".to_string(), "US".to_string());
        labels.insert("plan".to_string(), "pro".to_string());

        let first = encoder.encode(&labels);
        let second = encoder.encode(&labels);
        assert_eq!(first, second);
        assert_eq!(encoder.dimension_count(), 2);
    }

    #[test]
    fn test_decode_round_trip() {
        let encoder = DictionaryEncoder::new();
        let event = encoder.encode([("host", "server1"), ("dc", "us-east")]);

        let mut decoded = encoder.decode(&event);
        decoded.sort();
        assert_eq!(
            decoded,
            vec![
                ("dc".to_string(), "us-east".to_string()),
                ("host".to_string(), "server1".to_string()),
            ]
        );
    }

    #[test]
    fn test_lookup_never_assigns() {
        let encoder = DictionaryEncoder::new();
        encoder.encode([("country", "US")]);

        assert!(encoder.lookup([("country", "US")]).is_some());
        assert!(encoder.lookup([("country", "FR")]).is_none());
        assert!(encoder.lookup([("plan", "pro")]).is_none());
        assert_eq!(encoder.dimension_count(), 1);
        assert_eq!(encoder.value_count(DimensionId(0)), 1);
    }

    #[test]
    fn test_try_encode_rejects_without_side_effects() {
        let encoder = DictionaryEncoder::new().with_limits(8, 8);
        let long = "x".repeat(9);

        let err = encoder
            .try_encode([("ok", "fine"), ("name", long.as_str())])
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::TooLong {
                field: "dimension value",
                actual: 9,
                max: 8,
            }
        );
        assert_eq!(encoder.dimension_count(), 0);

        assert!(encoder.try_encode([("ok", "fine")]).is_ok());
    }

    #[test]
    fn test_unknown_ids_resolve_to_none() {
        let encoder = DictionaryEncoder::new();
        assert_eq!(encoder.resolve_dimension(DimensionId(3)), None);
        assert_eq!(encoder.resolve_value(DimensionId(0), ValueId(0)), None);
        assert_eq!(encoder.value_count(DimensionId(0)), 0);
    }

    #[test]
    fn test_concurrent_encoding_assigns_unique_ids() {
        let encoder = Arc::new(DictionaryEncoder::new());
        let mut handles = vec![];

        for t in 0..4 {
            let encoder = Arc::clone(&encoder);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let value = format!("host-{}", (i + t) % 10);
                    encoder.encode([("host", value.as_str())]);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let host = encoder.dimension_id("host").unwrap();
        assert_eq!(encoder.value_count(host), 10);

        let mut ids: Vec<u32> = (0..10)
            .map(|i| encoder.value_id(host, &format!("host-{}", i)).unwrap().0)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_stats() {
        let encoder = DictionaryEncoder::new();
        encoder.encode([("host", "server1")]);
        encoder.encode([("host", "server2")]);
        encoder.encode([("host", "server3")]);
        encoder.encode([("dc", "us-east")]);

        let stats = encoder.stats();
        assert_eq!(stats.dimension_count, 2);
        assert_eq!(stats.total_value_count, 4);
        assert_eq!(stats.max_values_per_dimension, 3);
        assert!(stats.memory_bytes > 0);
    }
}

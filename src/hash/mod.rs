//! Content hashing and partition placement
//!
//! Every encoded event is identified by a 64-bit content hash. The same hash
//! picks the event's partition inside a cube minute, and a hash over a set of
//! dimension ids keys the group-by buckets of a query.
//!
//! Integers are serialized big-endian before hashing so results do not
//! depend on the host byte order. Keys are sorted first, which makes every
//! hash here independent of the order labels were supplied in.

mod city;

pub use city::hash64;

use serde::{Deserialize, Serialize};

use crate::types::{DimensionId, EncodedEvent, NUM_PARTITIONS};

/// Hash an ordered list of u32 values (no sorting)
pub fn hash_u32s(values: &[u32]) -> u64 {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_be_bytes());
    }
    hash64(&bytes)
}

/// Sort the values ascending, then hash them
pub fn hash_sorted_u32s(mut values: Vec<u32>) -> u64 {
    values.sort_unstable();
    hash_u32s(&values)
}

/// Content hash of an encoded event
///
/// Layout: `n` big-endian dimension ids in ascending order, followed by the
/// `n` value ids in the same order.
pub fn hash_encoded_event(event: &EncodedEvent) -> u64 {
    let n = event.len();
    let mut bytes = vec![0u8; n * 8];
    for (i, (dimension, value)) in event.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&dimension.0.to_be_bytes());
        let at = (n + i) * 4;
        bytes[at..at + 4].copy_from_slice(&value.0.to_be_bytes());
    }
    hash64(&bytes)
}

/// Hash of a set of dimension ids (values are not involved)
pub fn hash_id_set<I>(dimensions: I) -> u64
where
    I: IntoIterator<Item = DimensionId>,
{
    hash_sorted_u32s(dimensions.into_iter().map(|d| d.0).collect())
}

// ============================================================================
// Partition Selection
// ============================================================================

/// Rule mapping a content hash to one of `NUM_PARTITIONS` partitions
///
/// Queries scan every partition, so the policy only affects how evenly
/// writes spread over the chains of a minute, never query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionPolicy {
    /// `hash & (NUM_PARTITIONS - 1)`: uniform for a well-mixed hash
    #[default]
    LowBits,

    /// Index of the most significant set bit (`floor(log2(hash))`)
    ///
    /// Skewed: half of all hashes land in partition 63, a quarter in 62 and
    /// so on. A zero hash maps to partition 0.
    MostSignificantBit,
}

impl PartitionPolicy {
    /// Partition index for a content hash, always `< NUM_PARTITIONS`
    #[inline]
    pub fn partition_for(self, hash: u64) -> usize {
        match self {
            PartitionPolicy::LowBits => (hash & (NUM_PARTITIONS as u64 - 1)) as usize,
            PartitionPolicy::MostSignificantBit => {
                if hash == 0 {
                    0
                } else {
                    63 - hash.leading_zeros() as usize
                }
            },
        }
    }

    /// Name used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            PartitionPolicy::LowBits => "low_bits",
            PartitionPolicy::MostSignificantBit => "most_significant_bit",
        }
    }
}

impl std::str::FromStr for PartitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low_bits" | "lowbits" | "mod" => Ok(PartitionPolicy::LowBits),
            "most_significant_bit" | "msb" => Ok(PartitionPolicy::MostSignificantBit),
            other => Err(format!("unknown partition policy '{}'", other)),
        }
    }
}

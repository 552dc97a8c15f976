//! Kuba Counter - in-memory, lock-free, per-minute dimensional event counter
//!
//! This library counts events labelled with string dimensions
//! (`{"country": "US", "plan": "pro"}`) at one-minute resolution and answers
//! grouped, filtered aggregate queries over them:
//! - Dictionary encoding of labels to dense `u32` ids (the only lock on ingest)
//! - CityHash-style 64-bit content hashing for identity and partitioning
//! - One cube per UTC day of `1440 × 64` lock-free counter chains
//! - Parallel per-partition query fan-out with a blocking merge
//!
//! ```rust
//! use chrono::Utc;
//! use kuba_counter::{Engine, Query};
//!
//! let engine = Engine::new();
//! engine.increment(Utc::now(), [("country", "US"), ("plan", "pro")], 1)?;
//!
//! let result = engine.query(&Query::new().group_by("country").filter("plan", ["pro"]));
//! assert_eq!(result.total(), 1);
//! # Ok::<(), kuba_counter::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod counter;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod hash;
pub mod query;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

// Re-export main types
pub use config::Config;
pub use dictionary::DictionaryEncoder;
pub use engine::{Engine, EngineBuilder, EngineStatsSnapshot};
pub use error::{Error, Result, ValidationError};
pub use hash::PartitionPolicy;
pub use query::{GroupingPolicy, IdQuery, Query, QueryResult};
pub use types::{DimensionId, EncodedEvent, TimeSlot, ValueId};

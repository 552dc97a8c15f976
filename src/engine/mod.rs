//! Counting engine façade: dictionary encoding plus per-day cubes

pub mod builder;

pub use builder::{Engine, EngineBuilder, EngineStats, EngineStatsSnapshot};

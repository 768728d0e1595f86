//! Core engine: classify results, settle pools, aggregate balances.

pub mod classifier;
pub mod settlement;
pub mod aggregator;
pub mod settler;

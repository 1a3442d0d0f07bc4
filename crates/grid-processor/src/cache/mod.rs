//! Cache implementations for grid processing.

mod weight_cache;

pub use weight_cache::{WeightCache, WeightKey};

//! strata-cache-core: Core traits and types for the strata-cache library
//!
//! This crate provides the contracts shared by every strategy and store:
//! the store contract, the system-of-record contract, the strategy traits,
//! key patterns and the metrics hooks.

mod error;
mod pattern;
mod traits;
mod types;

pub use error::{CacheError, Result};
pub use pattern::KeyPattern;
pub use traits::*;
pub use types::*;

/// Values cached and propagated by strategies
pub use serde_json::Value;

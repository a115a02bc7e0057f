//! strata-cache-storage: Store implementations for strata-cache

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::{MemoryConfig, MemoryStore};

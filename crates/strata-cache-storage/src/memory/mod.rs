//! In-memory cache store

mod store;

pub use store::{MemoryConfig, MemoryStore};

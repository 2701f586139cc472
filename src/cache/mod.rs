//! Local snapshot cache.
//!
//! This module keeps one persisted copy of all categories and flashcards:
//! - Stored under a fixed key per remote database
//! - Valid only while the remote change marker equals the stored one
//! - Unreadable or malformed entries behave like an empty cache

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, MemoryStorage, NoopStorage, SqliteStorage};
pub use traits::{cache_key, CacheResult, CacheSnapshot, CacheSource, Library};

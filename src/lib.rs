//! Categorized study flashcards stored in Firestore.
//!
//! Reads go through a local snapshot that stays valid while the remote
//! `meta/globalData.updated_at` marker is unchanged. Writes bump the marker.

pub mod cache;
pub mod cli;
pub mod config;
pub mod deck;
pub mod seed;
pub mod store;
pub mod sync;

pub use cache::{CacheResult, CacheSource, Library};
pub use store::types::{Category, Flashcard};
pub use sync::{CategoryInUse, DeleteCategoryOutcome, SyncCoordinator};

//! Remote document store access.
//!
//! [`DocumentStore`] is the raw document database (Firestore in production,
//! [`MemoryStore`] in tests). [`Gateway`] maps flashcard records onto it.

pub mod api_types;
pub mod client;
pub mod gateway;
pub mod memory;
pub mod types;

use std::future::Future;

use color_eyre::Result;

pub use client::FirestoreClient;
pub use gateway::Gateway;
pub use memory::MemoryStore;

/// Document fields as plain JSON.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A document read from a collection
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  pub id: String,
  pub fields: Fields,
}

/// How `set` treats fields already present on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
  /// Replace the whole document
  Overwrite,
  /// Replace only the given top-level fields, creating the document if needed
  Merge,
}

/// Minimal document database interface.
pub trait DocumentStore: Send + Sync {
  /// All documents in a collection.
  fn list(&self, collection: &str) -> impl Future<Output = Result<Vec<Document>>> + Send;

  /// A single document, or `None` if it does not exist.
  fn get(&self, collection: &str, id: &str)
    -> impl Future<Output = Result<Option<Document>>> + Send;

  /// Create a document with a store-generated id and return that id.
  fn create(&self, collection: &str, fields: Fields) -> impl Future<Output = Result<String>> + Send;

  fn set(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
    mode: WriteMode,
  ) -> impl Future<Output = Result<()>> + Send;

  /// Delete a document. Deleting a missing document is not an error.
  fn delete(&self, collection: &str, id: &str) -> impl Future<Output = Result<()>> + Send;

  /// Set `field` to the store's current time and return the normalized value.
  fn stamp(
    &self,
    collection: &str,
    id: &str,
    field: &str,
  ) -> impl Future<Output = Result<String>> + Send;
}

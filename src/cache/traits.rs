//! Core types for the snapshot cache.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::store::types::{Category, Flashcard};

/// Prefix of the single storage key a snapshot is kept under.
pub const CACHE_KEY_PREFIX: &str = "flashcards_data";

/// Everything the application shows: categories and flashcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
  pub categories: Vec<Category>,
  pub flashcards: Vec<Flashcard>,
}

impl Library {
  pub fn category(&self, id: &str) -> Option<&Category> {
    self.categories.iter().find(|c| c.id == id)
  }

  pub fn flashcard(&self, id: &str) -> Option<&Flashcard> {
    self.flashcards.iter().find(|f| f.id == id)
  }

  /// Flashcards belonging to a category, in library order.
  pub fn flashcards_in(&self, category_id: &str) -> Vec<Flashcard> {
    self
      .flashcards
      .iter()
      .filter(|f| f.category_id == category_id)
      .cloned()
      .collect()
  }

  /// Number of flashcards referencing a category.
  pub fn usage_count(&self, category_id: &str) -> usize {
    self
      .flashcards
      .iter()
      .filter(|f| f.category_id == category_id)
      .count()
  }
}

/// The persisted copy of a [`Library`] plus the marker it was fetched against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
  pub last_updated: String,
  pub categories: Vec<Category>,
  pub flashcards: Vec<Flashcard>,
}

impl CacheSnapshot {
  pub fn new(last_updated: String, library: Library) -> Self {
    Self {
      last_updated,
      categories: library.categories,
      flashcards: library.flashcards,
    }
  }

  /// Valid only for exactly the marker it was stamped with.
  pub fn is_valid_for(&self, marker: &str) -> bool {
    self.last_updated == marker
  }

  pub fn into_library(self) -> Library {
    Library {
      categories: self.categories,
      flashcards: self.flashcards,
    }
  }
}

/// Storage key for the snapshot of one remote database.
///
/// Hashing keeps the key fixed-length and lets several configured databases
/// share one cache file without overwriting each other.
pub fn cache_key(database: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(database.trim().as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("{}:{}", CACHE_KEY_PREFIX, &digest[..16])
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// Marker the data is valid for, if the store had one
  pub marker: Option<String>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T, marker: Option<String>) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      marker,
    }
  }

  /// Create a new cache result from a snapshot that matched the marker.
  pub fn from_cache(data: T, marker: String) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      marker: Some(marker),
    }
  }

  pub fn is_cached(&self) -> bool {
    self.source == CacheSource::Cache
  }
}

/// Indicates where data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Full fetch from the remote store
  Network,
  /// Local snapshot whose marker matched the remote marker
  Cache,
}

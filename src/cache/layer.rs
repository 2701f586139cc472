//! Cache layer that decides between the local snapshot and a remote fetch.

use std::future::Future;
use std::sync::Arc;

use color_eyre::Result;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, CacheSnapshot, Library};

/// Cache layer holding exactly one [`CacheSnapshot`].
///
/// The snapshot is reused only while the remote marker equals the marker it
/// was stored with. There is no time-based staleness and no offline fallback.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  key: String,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer storing its snapshot under `key`.
  pub fn new(storage: S, key: impl Into<String>) -> Self {
    Self {
      storage: Arc::new(storage),
      key: key.into(),
    }
  }

  /// The stored snapshot, or `None` if it is absent or unreadable.
  pub fn get(&self) -> Option<CacheSnapshot> {
    let raw = match self.storage.get(&self.key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key = %self.key, error = %e, "Failed to read cached snapshot");
        return None;
      }
    };

    match serde_json::from_str(&raw) {
      Ok(snapshot) => Some(snapshot),
      Err(e) => {
        warn!(key = %self.key, error = %e, "Ignoring malformed cached snapshot");
        None
      }
    }
  }

  /// Overwrite the stored snapshot.
  pub fn set(&self, snapshot: &CacheSnapshot) -> Result<()> {
    let raw = serde_json::to_string(snapshot)?;
    self.storage.set(&self.key, &raw)
  }

  /// Return the snapshot if it matches `marker`, otherwise fetch and store.
  ///
  /// 1. Marker and snapshot both present and equal: cached data
  /// 2. Otherwise fetch from the network
  /// 3. Store the fetched data stamped with `marker` (only if there is one)
  ///
  /// `force_refresh` skips step 1.
  pub async fn fetch_validated<F, Fut>(
    &self,
    marker: Option<String>,
    force_refresh: bool,
    fetcher: F,
  ) -> Result<CacheResult<Library>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Library>>,
  {
    if let Some(marker) = marker.as_deref().filter(|_| !force_refresh) {
      if let Some(snapshot) = self.get().filter(|s| s.is_valid_for(marker)) {
        debug!(%marker, "Snapshot matches marker");
        return Ok(CacheResult::from_cache(
          snapshot.into_library(),
          marker.to_string(),
        ));
      }
    }

    let data = fetcher().await?;

    if let Some(marker) = &marker {
      let snapshot = CacheSnapshot::new(marker.clone(), data.clone());
      // A snapshot that can't be written only costs a refetch next time
      if let Err(e) = self.set(&snapshot) {
        warn!(key = %self.key, error = %e, "Failed to persist snapshot");
      }
    }

    Ok(CacheResult::from_network(data, marker))
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      key: self.key.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::MemoryStorage;
  use crate::cache::traits::CacheSource;
  use crate::store::types::Category;
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn library(name: &str) -> Library {
    Library {
      categories: vec![Category {
        id: "c1".to_string(),
        name: name.to_string(),
        description: String::new(),
        order: None,
      }],
      flashcards: Vec::new(),
    }
  }

  fn layer() -> CacheLayer<MemoryStorage> {
    CacheLayer::new(MemoryStorage::new(), "flashcards_data:test")
  }

  #[test]
  fn test_malformed_snapshot_is_a_miss() {
    let storage = MemoryStorage::new();
    storage.set("k", "{not json").unwrap();
    let cache = CacheLayer::new(storage, "k");
    assert!(cache.get().is_none());
  }

  #[tokio::test]
  async fn test_matching_marker_serves_snapshot() {
    let cache = layer();
    cache
      .set(&CacheSnapshot::new("T1".to_string(), library("Cached")))
      .unwrap();

    let calls = AtomicUsize::new(0);
    let result = cache
      .fetch_validated(Some("T1".to_string()), false, || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(library("Fresh"))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.categories[0].name, "Cached");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_changed_marker_refetches_and_restamps() {
    let cache = layer();
    cache
      .set(&CacheSnapshot::new("T1".to_string(), library("Cached")))
      .unwrap();

    let result = cache
      .fetch_validated(Some("T2".to_string()), false, || async { Ok(library("Fresh")) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.categories[0].name, "Fresh");

    let stored = cache.get().unwrap();
    assert_eq!(stored.last_updated, "T2");
    assert_eq!(stored.categories[0].name, "Fresh");
  }

  #[tokio::test]
  async fn test_missing_marker_fetches_without_storing() {
    let cache = layer();
    let result = cache
      .fetch_validated(None, false, || async { Ok(library("Fresh")) })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
    assert!(cache.get().is_none());
  }

  #[tokio::test]
  async fn test_force_refresh_bypasses_matching_snapshot() {
    let cache = layer();
    cache
      .set(&CacheSnapshot::new("T1".to_string(), library("Cached")))
      .unwrap();

    let result = cache
      .fetch_validated(Some("T1".to_string()), true, || async { Ok(library("Fresh")) })
      .await
      .unwrap();
    assert_eq!(result.data.categories[0].name, "Fresh");
  }

  #[tokio::test]
  async fn test_fetch_error_leaves_snapshot_untouched() {
    let cache = layer();
    cache
      .set(&CacheSnapshot::new("T1".to_string(), library("Cached")))
      .unwrap();

    let result = cache
      .fetch_validated(Some("T2".to_string()), false, || async {
        Err::<Library, _>(eyre!("network down"))
      })
      .await;

    assert!(result.is_err());
    assert_eq!(cache.get().unwrap().last_updated, "T1");
  }
}

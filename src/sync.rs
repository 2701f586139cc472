//! Sync coordinator: the query/mutation interface over the remote store.
//!
//! Reads compare the remote change marker with the local snapshot and only
//! fetch records when they differ. Every successful write bumps the marker
//! and invalidates the coordinator's view, so a read that follows a write
//! always sees it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard as ViewGuard};

use color_eyre::{eyre::eyre, Result};
use tokio::sync::{watch, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CacheLayer, CacheResult, CacheSource, CacheStorage, Library};
use crate::store::types::{
  sort_categories, sort_flashcards, CategoryUpdate, Flashcard, NewCategory, NewFlashcard,
};
use crate::store::{DocumentStore, Gateway};

/// A category that can't be deleted because flashcards still use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryInUse {
  pub category_id: String,
  pub category_name: String,
  pub flashcard_count: usize,
}

impl fmt::Display for CategoryInUse {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Category '{}' still has {} flashcard(s); delete or move them first",
      self.category_name, self.flashcard_count
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteCategoryOutcome {
  Deleted,
  /// Nothing was sent to the remote store
  Rejected(CategoryInUse),
}

/// Coordinates the snapshot cache, the remote gateway and the change marker.
pub struct SyncCoordinator<D: DocumentStore, S: CacheStorage> {
  gateway: Gateway<D>,
  cache: CacheLayer<S>,
  /// Library returned by the last successful load
  current: Mutex<Option<Library>>,
  /// Set by writes; the next load skips the snapshot
  invalidated: AtomicBool,
  /// Serializes writes from this coordinator
  write_lock: tokio::sync::Mutex<()>,
  generation: watch::Sender<u64>,
}

impl<D: DocumentStore, S: CacheStorage> SyncCoordinator<D, S> {
  pub fn new(docs: D, storage: S, cache_key: impl Into<String>) -> Self {
    let (generation, _) = watch::channel(0);
    Self {
      gateway: Gateway::new(docs),
      cache: CacheLayer::new(storage, cache_key),
      current: Mutex::new(None),
      invalidated: AtomicBool::new(false),
      write_lock: tokio::sync::Mutex::new(()),
      generation,
    }
  }

  pub fn gateway(&self) -> &Gateway<D> {
    &self.gateway
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  /// Invalidation counter, incremented after every committed write.
  ///
  /// Views holding loaded data should reload when it changes.
  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.generation.subscribe()
  }

  /// The library from the last load, unless a write invalidated it.
  pub fn current(&self) -> Result<Option<Library>> {
    Ok(self.view()?.clone())
  }

  fn view(&self) -> Result<ViewGuard<'_, Option<Library>>> {
    self
      .current
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  // ==========================================================================
  // Read path
  // ==========================================================================

  /// Load categories and flashcards, reusing the snapshot if it is current.
  pub async fn load(&self) -> Result<CacheResult<Library>> {
    let marker = self
      .gateway
      .fetch_marker()
      .await
      .map_err(|e| eyre!("Failed to fetch change marker: {}", e))?;

    let force_refresh = self.invalidated.swap(false, Ordering::SeqCst);

    let result = match self
      .cache
      .fetch_validated(marker, force_refresh, || self.fetch_library())
      .await
    {
      Ok(result) => result,
      Err(e) => {
        if force_refresh {
          self.invalidated.store(true, Ordering::SeqCst);
        }
        return Err(e);
      }
    };

    match result.source {
      CacheSource::Cache => info!(marker = ?result.marker, "Loaded data from local cache"),
      CacheSource::Network => info!(marker = ?result.marker, "Loaded data from database"),
    }

    *self.view()? = Some(result.data.clone());

    Ok(result)
  }

  /// Load categories and flashcards.
  pub async fn load_data(&self) -> Result<Library> {
    Ok(self.load().await?.data)
  }

  /// Flashcards of one category from the current view.
  pub async fn flashcards_by_category(&self, category_id: &str) -> Result<Vec<Flashcard>> {
    Ok(self.loaded().await?.flashcards_in(category_id))
  }

  /// The current view, loading it first if needed.
  async fn loaded(&self) -> Result<Library> {
    match self.current()? {
      Some(library) => Ok(library),
      None => self.load_data().await,
    }
  }

  async fn fetch_library(&self) -> Result<Library> {
    let mut categories = self.gateway.list_categories().await?;
    let mut flashcards = self.gateway.list_flashcards(&categories).await?;
    sort_categories(&mut categories);
    sort_flashcards(&mut flashcards);
    Ok(Library {
      categories,
      flashcards,
    })
  }

  // ==========================================================================
  // Write path
  // ==========================================================================

  /// Serialize writes. Checks against the loaded view must run while this is held.
  pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
    self.write_lock.lock().await
  }

  /// Finish a write: bump the marker on success, then invalidate.
  ///
  /// A failed write leaves the marker alone. Either way the next local read
  /// refetches, since a multi-document write may have partly applied.
  pub(crate) async fn settle<T>(&self, operation: &str, written: Result<T>) -> Result<T> {
    let value = match written {
      Ok(value) => value,
      Err(e) => {
        warn!(operation, error = %e, "Mutation failed; change marker left unchanged");
        self.force_refetch()?;
        return Err(e);
      }
    };

    let bumped = self.gateway.bump_marker().await;
    self.invalidate()?;

    let marker = bumped.map_err(|e| {
      eyre!(
        "{} succeeded but the change marker was not updated: {}",
        operation,
        e
      )
    })?;
    info!(operation, %marker, "Mutation committed");
    Ok(value)
  }

  /// Drop the current view and notify subscribers.
  pub fn invalidate(&self) -> Result<()> {
    self.force_refetch()?;
    self.generation.send_modify(|g| *g += 1);
    Ok(())
  }

  fn force_refetch(&self) -> Result<()> {
    self.invalidated.store(true, Ordering::SeqCst);
    *self.view()? = None;
    Ok(())
  }

  pub async fn add_category(&self, category: NewCategory) -> Result<String> {
    category.validate()?;
    let _guard = self.lock_writes().await;
    let written = self.gateway.create_category(&category).await;
    self.settle("add category", written).await
  }

  pub async fn edit_category(&self, id: &str, update: CategoryUpdate) -> Result<()> {
    update.validate()?;
    let _guard = self.lock_writes().await;
    self.require_category(id).await?;
    let written = self.gateway.update_category(id, &update).await;
    self.settle("edit category", written).await
  }

  /// Delete a category that no flashcard references.
  ///
  /// The check runs against the current view before any remote write, with
  /// the write lock held so a concurrent flashcard insert can't slip past it.
  pub async fn delete_category(&self, id: &str) -> Result<DeleteCategoryOutcome> {
    let _guard = self.lock_writes().await;
    let library = self.loaded().await?;
    let category = library
      .category(id)
      .ok_or_else(|| eyre!("Category {} not found", id))?;

    let flashcard_count = library.usage_count(id);
    if flashcard_count > 0 {
      let in_use = CategoryInUse {
        category_id: id.to_string(),
        category_name: category.name.clone(),
        flashcard_count,
      };
      warn!(category = id, flashcard_count, "Refusing to delete category in use");
      return Ok(DeleteCategoryOutcome::Rejected(in_use));
    }

    let written = self.gateway.delete_category(id).await;
    self.settle("delete category", written).await?;
    Ok(DeleteCategoryOutcome::Deleted)
  }

  /// Rank the given categories in list order, starting at 0.
  ///
  /// Unlisted categories that already had a rank keep their relative order
  /// after the listed ones; unranked ones stay unranked.
  pub async fn reorder_categories(&self, ordered_ids: &[String]) -> Result<()> {
    let _guard = self.lock_writes().await;
    let library = self.loaded().await?;
    for (i, id) in ordered_ids.iter().enumerate() {
      if library.category(id).is_none() {
        return Err(eyre!("Category {} not found", id));
      }
      if ordered_ids[..i].contains(id) {
        return Err(eyre!("Category {} listed more than once", id));
      }
    }

    let ranked_rest = library
      .categories
      .iter()
      .filter(|c| c.order.is_some() && !ordered_ids.contains(&c.id))
      .map(|c| &c.id);
    let ranking: Vec<&String> = ordered_ids.iter().chain(ranked_rest).collect();

    let written = async {
      for (rank, id) in ranking.iter().enumerate() {
        let update = CategoryUpdate {
          order: Some(rank as i64),
          ..Default::default()
        };
        self.gateway.update_category(id, &update).await?;
      }
      Ok::<_, color_eyre::Report>(())
    }
    .await;
    self.settle("reorder categories", written).await
  }

  pub async fn add_flashcard(&self, flashcard: NewFlashcard) -> Result<Flashcard> {
    flashcard.validate()?;
    let _guard = self.lock_writes().await;
    self.require_category(&flashcard.category_id).await?;

    let card = flashcard.with_id(Uuid::new_v4().to_string());
    let written = self.gateway.insert_flashcard(&card).await;
    self.settle("add flashcard", written).await?;
    Ok(card)
  }

  /// Replace a flashcard, moving it if its category changed.
  pub async fn edit_flashcard(&self, flashcard: Flashcard) -> Result<()> {
    flashcard.validate()?;
    let _guard = self.lock_writes().await;
    let library = self.loaded().await?;
    let existing = library
      .flashcard(&flashcard.id)
      .ok_or_else(|| eyre!("Flashcard {} not found", flashcard.id))?;
    if library.category(&flashcard.category_id).is_none() {
      return Err(eyre!("Category {} not found", flashcard.category_id));
    }
    let previous_category = existing.category_id.clone();

    let written = if previous_category == flashcard.category_id {
      self.gateway.update_flashcard(&flashcard).await
    } else {
      // Insert before removing: a failure in between duplicates, never loses
      async {
        self.gateway.insert_flashcard(&flashcard).await?;
        self
          .gateway
          .remove_flashcard(&previous_category, &flashcard.id)
          .await
      }
      .await
    };
    self.settle("edit flashcard", written).await
  }

  pub async fn delete_flashcard(&self, id: &str) -> Result<()> {
    let _guard = self.lock_writes().await;
    let library = self.loaded().await?;
    let card = library
      .flashcard(id)
      .ok_or_else(|| eyre!("Flashcard {} not found", id))?;

    let written = self.gateway.remove_flashcard(&card.category_id, id).await;
    self.settle("delete flashcard", written).await
  }

  async fn require_category(&self, id: &str) -> Result<()> {
    match self.loaded().await?.category(id) {
      Some(_) => Ok(()),
      None => Err(eyre!("Category {} not found", id)),
    }
  }
}

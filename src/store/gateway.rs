//! Flashcard records on top of a [`DocumentStore`].
//!
//! Layout:
//! - `categories/{id}`: one document per category
//! - `flashcards/{categoryId}`: a [`FlashcardSet`] holding that category's cards
//! - `meta/globalData`: the `updated_at` marker
//!
//! Gateway writes never touch the marker. Callers bump it after a successful
//! mutation with [`Gateway::bump_marker`].

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::api_types::reserialize;
use super::types::{
  normalize_timestamp, Category, CategoryUpdate, Flashcard, FlashcardSet, NewCategory,
};
use super::{Document, DocumentStore, Fields, WriteMode};

pub const CATEGORIES: &str = "categories";
pub const FLASHCARDS: &str = "flashcards";
pub const META: &str = "meta";
pub const MARKER_DOC: &str = "globalData";
pub const MARKER_FIELD: &str = "updated_at";

/// Typed access to categories, flashcards and the change marker.
pub struct Gateway<D: DocumentStore> {
  docs: D,
}

impl<D: DocumentStore> Gateway<D> {
  pub fn new(docs: D) -> Self {
    Self { docs }
  }

  /// The underlying document store.
  pub fn store(&self) -> &D {
    &self.docs
  }

  // ==========================================================================
  // Marker
  // ==========================================================================

  /// Current marker value, or `None` if it was never set.
  pub async fn fetch_marker(&self) -> Result<Option<String>> {
    let doc = self.docs.get(META, MARKER_DOC).await?;
    match doc.and_then(|d| d.fields.get(MARKER_FIELD).cloned()) {
      Some(Value::String(ts)) => Ok(Some(normalize_timestamp(&ts)?)),
      Some(Value::Null) | None => Ok(None),
      Some(other) => Err(eyre!("Unexpected marker value: {}", other)),
    }
  }

  /// Set the marker to the store's current time.
  pub async fn bump_marker(&self) -> Result<String> {
    let marker = self.docs.stamp(META, MARKER_DOC, MARKER_FIELD).await?;
    debug!(%marker, "Bumped change marker");
    Ok(marker)
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  /// All categories, unsorted.
  pub async fn list_categories(&self) -> Result<Vec<Category>> {
    self
      .docs
      .list(CATEGORIES)
      .await?
      .into_iter()
      .map(|doc| {
        let id = doc.id;
        let mut category: Category = reserialize(Value::Object(doc.fields))
          .map_err(|e| eyre!("Failed to parse category {}: {}", id, e))?;
        category.id = id;
        Ok(category)
      })
      .collect()
  }

  /// All flashcards of the given categories, unsorted.
  ///
  /// Flashcard sets are fetched concurrently, one document per category.
  pub async fn list_flashcards(&self, categories: &[Category]) -> Result<Vec<Flashcard>> {
    let sets = try_join_all(categories.iter().map(|c| self.flashcard_set(&c.id))).await?;

    Ok(
      sets
        .into_iter()
        .zip(categories)
        .flat_map(|(set, category)| set.flashcards.into_cards(&category.id))
        .collect(),
    )
  }

  /// The flashcard set document of a category; empty if it does not exist.
  pub async fn flashcard_set(&self, category_id: &str) -> Result<FlashcardSet> {
    match self.docs.get(FLASHCARDS, category_id).await? {
      Some(doc) => parse_flashcard_set(doc),
      None => Ok(FlashcardSet::empty(category_id)),
    }
  }

  // ==========================================================================
  // Category writes
  // ==========================================================================

  pub async fn create_category(&self, category: &NewCategory) -> Result<String> {
    self.docs.create(CATEGORIES, to_fields(category)?).await
  }

  pub async fn update_category(&self, id: &str, update: &CategoryUpdate) -> Result<()> {
    self
      .docs
      .set(CATEGORIES, id, to_fields(update)?, WriteMode::Merge)
      .await
  }

  /// Delete a category and its (empty) flashcard set document.
  pub async fn delete_category(&self, id: &str) -> Result<()> {
    self.docs.delete(CATEGORIES, id).await?;
    self.docs.delete(FLASHCARDS, id).await
  }

  // ==========================================================================
  // Flashcard writes (read-modify-write of the category's flashcard map)
  // ==========================================================================

  pub async fn insert_flashcard(&self, card: &Flashcard) -> Result<()> {
    let mut set = self.flashcard_set(&card.category_id).await?;
    set.flashcards.insert(card.clone())?;
    self.write_flashcard_set(&card.category_id, set).await
  }

  pub async fn update_flashcard(&self, card: &Flashcard) -> Result<()> {
    let mut set = self.existing_flashcard_set(&card.category_id).await?;
    set.flashcards.update(card.clone())?;
    self.write_flashcard_set(&card.category_id, set).await
  }

  pub async fn remove_flashcard(&self, category_id: &str, id: &str) -> Result<()> {
    let mut set = self.existing_flashcard_set(category_id).await?;
    set
      .flashcards
      .remove(id)
      .ok_or_else(|| eyre!("Flashcard {} not found in category {}", id, category_id))?;
    self.write_flashcard_set(category_id, set).await
  }

  /// Overwrite a category's whole flashcard set in one write.
  pub async fn replace_flashcard_set(&self, set: &FlashcardSet) -> Result<()> {
    self
      .docs
      .set(FLASHCARDS, &set.category_id, to_fields(set)?, WriteMode::Overwrite)
      .await
  }

  async fn existing_flashcard_set(&self, category_id: &str) -> Result<FlashcardSet> {
    let doc = self
      .docs
      .get(FLASHCARDS, category_id)
      .await?
      .ok_or_else(|| eyre!("Category {} has no flashcards", category_id))?;
    parse_flashcard_set(doc)
  }

  async fn write_flashcard_set(&self, category_id: &str, mut set: FlashcardSet) -> Result<()> {
    set.category_id = category_id.to_string();
    self
      .docs
      .set(FLASHCARDS, category_id, to_fields(&set)?, WriteMode::Merge)
      .await
  }
}

fn parse_flashcard_set(doc: Document) -> Result<FlashcardSet> {
  let id = doc.id;
  reserialize(Value::Object(doc.fields))
    .map_err(|e| eyre!("Failed to parse flashcards of category {}: {}", id, e))
}

fn to_fields(value: impl Serialize) -> Result<Fields> {
  match serde_json::to_value(value).map_err(|e| eyre!("Failed to serialize record: {}", e))? {
    Value::Object(map) => Ok(map),
    other => Err(eyre!("Record did not serialize to an object: {}", other)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use serde_json::json;

  fn new_category(name: &str) -> NewCategory {
    NewCategory {
      name: name.to_string(),
      description: format!("{} accounts", name),
      order: None,
    }
  }

  fn card(id: &str, category_id: &str, front: &str, back: &[&str]) -> Flashcard {
    Flashcard {
      id: id.to_string(),
      category_id: category_id.to_string(),
      front: front.to_string(),
      back: back.iter().map(|s| s.to_string()).collect(),
      img_src: None,
    }
  }

  #[tokio::test]
  async fn test_marker_absent_then_bumped() {
    let gateway = Gateway::new(MemoryStore::new());
    assert_eq!(gateway.fetch_marker().await.unwrap(), None);

    let bumped = gateway.bump_marker().await.unwrap();
    assert_eq!(gateway.fetch_marker().await.unwrap(), Some(bumped));
  }

  #[tokio::test]
  async fn test_categories_carry_document_ids() {
    let gateway = Gateway::new(MemoryStore::new());
    let id = gateway.create_category(&new_category("Assets")).await.unwrap();

    let categories = gateway.list_categories().await.unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].id, id);
    assert_eq!(categories[0].name, "Assets");

    let update = CategoryUpdate {
      order: Some(4),
      ..Default::default()
    };
    gateway.update_category(&id, &update).await.unwrap();
    let categories = gateway.list_categories().await.unwrap();
    assert_eq!(categories[0].order, Some(4));
    assert_eq!(categories[0].description, "Assets accounts");
  }

  #[tokio::test]
  async fn test_flashcards_grouped_per_category_document() {
    let gateway = Gateway::new(MemoryStore::new());
    let assets = gateway.create_category(&new_category("Assets")).await.unwrap();
    let entries = gateway.create_category(&new_category("Entries")).await.unwrap();

    gateway
      .insert_flashcard(&card("f1", &assets, "Cash", &["Asset"]))
      .await
      .unwrap();
    gateway
      .insert_flashcard(&card("f2", &assets, "Land", &["Asset"]))
      .await
      .unwrap();
    gateway
      .insert_flashcard(&card("f3", &entries, "Pay rent", &["Debit text", "Credit text"]))
      .await
      .unwrap();

    let set = gateway.flashcard_set(&assets).await.unwrap();
    assert_eq!(set.flashcards.len(), 2);
    assert_eq!(set.category_id, assets);

    let categories = gateway.list_categories().await.unwrap();
    let cards = gateway.list_flashcards(&categories).await.unwrap();
    assert_eq!(cards.len(), 3);

    let t_chart = cards.iter().find(|c| c.id == "f3").unwrap();
    assert_eq!(t_chart.back, vec!["Debit text", "Credit text"]);
    assert_eq!(t_chart.category_id, entries);
  }

  #[tokio::test]
  async fn test_update_and_remove_flashcard() {
    let gateway = Gateway::new(MemoryStore::new());
    let cat = gateway.create_category(&new_category("Assets")).await.unwrap();
    gateway
      .insert_flashcard(&card("f1", &cat, "Cash", &["Asset"]))
      .await
      .unwrap();

    gateway
      .update_flashcard(&card("f1", &cat, "Petty Cash", &["Asset"]))
      .await
      .unwrap();
    let set = gateway.flashcard_set(&cat).await.unwrap();
    assert_eq!(set.flashcards.get("f1").unwrap().front, "Petty Cash");

    gateway.remove_flashcard(&cat, "f1").await.unwrap();
    assert!(gateway.flashcard_set(&cat).await.unwrap().flashcards.is_empty());
    assert!(gateway.remove_flashcard(&cat, "f1").await.is_err());
  }

  #[tokio::test]
  async fn test_missing_flashcard_set_reads_as_empty() {
    let store = MemoryStore::new();
    store.insert_raw(CATEGORIES, "c1", to_fields(json!({ "name": "Empty" })).unwrap());
    let gateway = Gateway::new(store);

    let categories = gateway.list_categories().await.unwrap();
    assert!(gateway.list_flashcards(&categories).await.unwrap().is_empty());
    assert!(gateway
      .update_flashcard(&card("f1", "c1", "Cash", &["Asset"]))
      .await
      .is_err());
  }
}

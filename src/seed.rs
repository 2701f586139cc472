//! Bulk import of a flashcard dataset.
//!
//! Dataset files are YAML (JSON parses too):
//!
//! ```yaml
//! - category: Assets
//!   description: Things the business owns
//!   flashcards:
//!     - front: Cash
//!       back: Asset
//!     - front: Pay rent
//!       back: [Rent Expense, Cash]
//! ```

use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::cache::CacheStorage;
use crate::deck::parse_back;
use crate::store::types::{FlashcardSet, NewCategory, NewFlashcard};
use crate::store::DocumentStore;
use crate::sync::SyncCoordinator;

/// A card's answer: a list, or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SeedBack {
  List(Vec<String>),
  Text(String),
}

impl SeedBack {
  pub fn entries(&self) -> Vec<String> {
    match self {
      SeedBack::List(entries) => entries.iter().map(|e| e.trim().to_string()).collect(),
      SeedBack::Text(text) => parse_back(text),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedCard {
  pub front: String,
  pub back: SeedBack,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeedSet {
  pub category: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub flashcards: Vec<SeedCard>,
}

/// Ordered list of category sets to import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Dataset(pub Vec<SeedSet>);

impl Dataset {
  pub fn parse(raw: &str) -> Result<Self> {
    serde_yaml::from_str(raw).map_err(|e| eyre!("Failed to parse dataset: {}", e))
  }

  pub fn load(path: &Path) -> Result<Self> {
    let raw = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read dataset {}: {}", path.display(), e))?;
    Self::parse(&raw).map_err(|e| eyre!("{}: {}", path.display(), e))
  }

  pub fn card_count(&self) -> usize {
    self.0.iter().map(|s| s.flashcards.len()).sum()
  }

  /// Check every set and card. Nothing is written if this fails.
  pub fn validate(&self) -> Result<()> {
    for set in &self.0 {
      set.new_category().validate()?;
      for (i, card) in set.flashcards.iter().enumerate() {
        // Placeholder id; the real one is assigned on import
        set
          .new_flashcard("pending", card)
          .validate()
          .map_err(|e| eyre!("{} card {}: {}", set.category, i + 1, e))?;
      }
    }
    Ok(())
  }
}

impl SeedSet {
  fn new_category(&self) -> NewCategory {
    NewCategory {
      name: self.category.clone(),
      description: self.description.clone(),
      order: None,
    }
  }

  fn new_flashcard(&self, category_id: &str, card: &SeedCard) -> NewFlashcard {
    NewFlashcard {
      category_id: category_id.to_string(),
      front: card.front.trim().to_string(),
      back: card.back.entries(),
      img_src: None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
  pub categories: usize,
  pub flashcards: usize,
}

impl<D: DocumentStore, S: CacheStorage> SyncCoordinator<D, S> {
  /// Import a dataset: one category plus its flashcard set per entry.
  ///
  /// The change marker is bumped once, after everything is written.
  pub async fn seed(&self, dataset: &Dataset) -> Result<SeedSummary> {
    dataset.validate()?;

    let _guard = self.lock_writes().await;
    let written = async {
      let mut summary = SeedSummary::default();
      for set in &dataset.0 {
        let category_id = self.gateway().create_category(&set.new_category()).await?;

        let mut cards = FlashcardSet::empty(&category_id);
        for card in &set.flashcards {
          let card = set
            .new_flashcard(&category_id, card)
            .with_id(Uuid::new_v4().to_string());
          cards.flashcards.insert(card)?;
        }
        self.gateway().replace_flashcard_set(&cards).await?;

        info!(category = %set.category, cards = cards.flashcards.len(), "Seeded category");
        summary.categories += 1;
        summary.flashcards += cards.flashcards.len();
      }
      Ok::<_, color_eyre::Report>(summary)
    }
    .await;

    self.settle("seed", written).await
  }
}

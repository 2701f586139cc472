//! Flashcard domain records as stored in the remote document database.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of answer entries on the back of a card (debit + credit).
pub const MAX_BACK_ENTRIES: usize = 2;

/// A flashcard category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  /// Document id. Remote documents carry it in their name, not their fields.
  #[serde(default)]
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  /// Explicit display rank. Unranked categories sort after ranked ones.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub order: Option<i64>,
}

/// Fields for a category that does not exist yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCategory {
  pub name: String,
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order: Option<i64>,
}

impl NewCategory {
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(eyre!("Category name must not be empty"));
    }
    Ok(())
  }
}

/// Partial category update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order: Option<i64>,
}

impl CategoryUpdate {
  pub fn is_empty(&self) -> bool {
    self.name.is_none() && self.description.is_none() && self.order.is_none()
  }

  pub fn validate(&self) -> Result<()> {
    if self.is_empty() {
      return Err(eyre!("Category update has no fields to change"));
    }
    if matches!(&self.name, Some(name) if name.trim().is_empty()) {
      return Err(eyre!("Category name must not be empty"));
    }
    Ok(())
  }
}

/// A single flashcard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub category_id: String,
  pub front: String,
  /// One answer, or a debit/credit pair
  pub back: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub img_src: Option<String>,
}

impl Flashcard {
  /// Whether the answer is a two-column debit/credit layout.
  pub fn is_t_chart(&self) -> bool {
    self.back.len() == MAX_BACK_ENTRIES
  }

  pub fn validate(&self) -> Result<()> {
    validate_card_fields(&self.category_id, &self.front, &self.back)
  }
}

/// Fields for a flashcard that does not exist yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFlashcard {
  pub category_id: String,
  pub front: String,
  pub back: Vec<String>,
  pub img_src: Option<String>,
}

impl NewFlashcard {
  pub fn validate(&self) -> Result<()> {
    validate_card_fields(&self.category_id, &self.front, &self.back)
  }

  /// Assign an id, producing the stored record.
  pub fn with_id(self, id: String) -> Flashcard {
    Flashcard {
      id,
      category_id: self.category_id,
      front: self.front,
      back: self.back,
      img_src: self.img_src,
    }
  }
}

fn validate_card_fields(category_id: &str, front: &str, back: &[String]) -> Result<()> {
  if category_id.is_empty() {
    return Err(eyre!("Flashcard must belong to a category"));
  }
  if front.trim().is_empty() {
    return Err(eyre!("Flashcard front must not be empty"));
  }
  if back.is_empty() || back.len() > MAX_BACK_ENTRIES {
    return Err(eyre!(
      "Flashcard back must have 1 or {} entries, got {}",
      MAX_BACK_ENTRIES,
      back.len()
    ));
  }
  if back.iter().any(|b| b.trim().is_empty()) {
    return Err(eyre!("Flashcard back entries must not be empty"));
  }
  Ok(())
}

/// Flashcards of one category keyed by flashcard id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlashcardMap(BTreeMap<String, Flashcard>);

impl FlashcardMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, id: &str) -> Option<&Flashcard> {
    self.0.get(id)
  }

  /// Add a card. Fails if the id is already taken.
  pub fn insert(&mut self, card: Flashcard) -> Result<()> {
    if self.0.contains_key(&card.id) {
      return Err(eyre!("Flashcard {} already exists", card.id));
    }
    self.0.insert(card.id.clone(), card);
    Ok(())
  }

  /// Replace an existing card. Fails if the id is unknown.
  pub fn update(&mut self, card: Flashcard) -> Result<()> {
    match self.0.get_mut(&card.id) {
      Some(existing) => {
        *existing = card;
        Ok(())
      }
      None => Err(eyre!("Flashcard {} not found", card.id)),
    }
  }

  /// Remove a card, returning it if it was present.
  pub fn remove(&mut self, id: &str) -> Option<Flashcard> {
    self.0.remove(id)
  }

  /// Cards with `category_id` forced to the owning category.
  ///
  /// Older documents may carry cards without a usable category id.
  pub fn into_cards(self, category_id: &str) -> Vec<Flashcard> {
    self
      .0
      .into_iter()
      .map(|(id, mut card)| {
        card.id = id;
        card.category_id = category_id.to_string();
        card
      })
      .collect()
  }
}

/// Document `flashcards/{categoryId}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSet {
  #[serde(default)]
  pub category_id: String,
  #[serde(default)]
  pub flashcards: FlashcardMap,
}

impl FlashcardSet {
  pub fn empty(category_id: &str) -> Self {
    Self {
      category_id: category_id.to_string(),
      flashcards: FlashcardMap::new(),
    }
  }
}

/// Ranked categories first by rank, then the rest by name (case-insensitive).
pub fn sort_categories(categories: &mut [Category]) {
  categories.sort_by(|a, b| match (a.order, b.order) {
    (Some(x), Some(y)) => x.cmp(&y).then_with(|| compare_folded(&a.name, &b.name)),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => compare_folded(&a.name, &b.name),
  });
}

/// Flashcards by front text (case-insensitive).
pub fn sort_flashcards(flashcards: &mut [Flashcard]) {
  flashcards.sort_by(|a, b| compare_folded(&a.front, &b.front));
}

fn compare_folded(a: &str, b: &str) -> Ordering {
  a.to_lowercase().cmp(&b.to_lowercase())
}

/// Normalize a timestamp string so equal instants compare equal as strings.
///
/// Output is RFC 3339 UTC with a `Z` suffix, keeping sub-second precision.
pub fn normalize_timestamp(raw: &str) -> Result<String> {
  let parsed = DateTime::parse_from_rfc3339(raw)
    .map_err(|e| eyre!("Invalid timestamp '{}': {}", raw, e))?;
  Ok(format_timestamp(parsed.with_timezone(&Utc)))
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn card(id: &str, front: &str, back: &[&str]) -> Flashcard {
    Flashcard {
      id: id.to_string(),
      category_id: "cat".to_string(),
      front: front.to_string(),
      back: back.iter().map(|s| s.to_string()).collect(),
      img_src: None,
    }
  }

  fn category(name: &str, order: Option<i64>) -> Category {
    Category {
      id: name.to_lowercase(),
      name: name.to_string(),
      description: String::new(),
      order,
    }
  }

  #[test]
  fn test_flashcard_uses_camel_case_fields() {
    let mut c = card("1", "Cash", &["Asset"]);
    c.img_src = Some("cash.png".to_string());
    let json = serde_json::to_value(&c).unwrap();
    assert_eq!(json["categoryId"], "cat");
    assert_eq!(json["imgSrc"], "cash.png");
  }

  #[test]
  fn test_category_fields_without_id_or_order() {
    let parsed: Category =
      serde_json::from_value(serde_json::json!({ "name": "Assets", "description": "d" })).unwrap();
    assert_eq!(parsed.id, "");
    assert_eq!(parsed.order, None);

    let json = serde_json::to_value(category("Assets", None)).unwrap();
    assert!(json.get("order").is_none());
  }

  #[test]
  fn test_back_must_have_one_or_two_entries() {
    assert!(card("1", "Cash", &["Asset"]).validate().is_ok());
    assert!(card("1", "Pay rent", &["Rent Expense", "Cash"]).validate().is_ok());
    assert!(card("1", "Cash", &[]).validate().is_err());
    assert!(card("1", "Cash", &["a", "b", "c"]).validate().is_err());
    assert!(card("1", "  ", &["Asset"]).validate().is_err());
  }

  #[test]
  fn test_t_chart_detection() {
    assert!(card("1", "Pay rent", &["Rent Expense", "Cash"]).is_t_chart());
    assert!(!card("1", "Cash", &["Asset"]).is_t_chart());
  }

  #[test]
  fn test_flashcard_map_helpers() {
    let mut map = FlashcardMap::new();
    map.insert(card("a", "Cash", &["Asset"])).unwrap();
    assert!(map.insert(card("a", "Dup", &["x"])).is_err());

    map.update(card("a", "Petty Cash", &["Asset"])).unwrap();
    assert_eq!(map.get("a").unwrap().front, "Petty Cash");
    assert!(map.update(card("missing", "x", &["y"])).is_err());

    assert!(map.remove("a").is_some());
    assert!(map.remove("a").is_none());
    assert!(map.is_empty());
  }

  #[test]
  fn test_flashcard_set_parses_stored_document() {
    let doc = serde_json::json!({
      "categoryId": "cat-1",
      "flashcards": {
        "f1": { "id": "f1", "categoryId": "cat-1", "front": "Cash", "back": ["Asset"] },
        "f2": { "id": "f2", "categoryId": "", "front": "Pay rent", "back": ["Rent Expense", "Cash"] }
      }
    });
    let set: FlashcardSet = serde_json::from_value(doc).unwrap();
    let cards = set.flashcards.into_cards("cat-1");
    assert_eq!(cards.len(), 2);
    assert!(cards.iter().all(|c| c.category_id == "cat-1"));
    assert_eq!(cards[1].back, vec!["Rent Expense", "Cash"]);
  }

  #[test]
  fn test_sort_categories_ranked_first_then_name() {
    let mut cats = vec![
      category("zeta", None),
      category("Alpha", None),
      category("Second", Some(2)),
      category("First", Some(1)),
    ];
    sort_categories(&mut cats);
    let names: Vec<_> = cats.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["First", "Second", "Alpha", "zeta"]);
  }

  #[test]
  fn test_sort_flashcards_case_insensitive() {
    let mut cards = vec![card("1", "land", &["x"]), card("2", "Cash", &["x"]), card("3", "building", &["x"])];
    sort_flashcards(&mut cards);
    let fronts: Vec<_> = cards.iter().map(|c| c.front.as_str()).collect();
    assert_eq!(fronts, vec!["building", "Cash", "land"]);
  }

  #[test]
  fn test_normalize_timestamp() {
    assert_eq!(
      normalize_timestamp("2025-03-01T10:00:00.123456+00:00").unwrap(),
      "2025-03-01T10:00:00.123456Z"
    );
    assert_eq!(
      normalize_timestamp("2025-03-01T12:00:00+02:00").unwrap(),
      "2025-03-01T10:00:00Z"
    );
    assert!(normalize_timestamp("yesterday").is_err());
  }
}

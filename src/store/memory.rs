//! In-process [`DocumentStore`] with call counters and failure injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};

use super::types::format_timestamp;
use super::{Document, DocumentStore, Fields, WriteMode};

type Collection = BTreeMap<String, Fields>;

#[derive(Default)]
pub struct MemoryStore {
  collections: Mutex<HashMap<String, Collection>>,
  /// Reads (list or get) per collection
  reads: Mutex<HashMap<String, usize>>,
  writes: AtomicUsize,
  next_id: AtomicUsize,
  last_stamp: Mutex<Option<DateTime<Utc>>>,
  fail_writes: AtomicBool,
  fail_reads: AtomicBool,
  fail_lists: AtomicBool,
  fail_stamps: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of list/get calls made against `collection`.
  pub fn reads_of(&self, collection: &str) -> usize {
    self
      .reads
      .lock()
      .map(|r| r.get(collection).copied().unwrap_or(0))
      .unwrap_or(0)
  }

  /// Number of create/set/delete/stamp calls.
  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  /// Make every subsequent mutating call fail.
  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  /// Make every subsequent read call fail.
  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  /// Make only collection listings fail; single-document reads still work.
  pub fn fail_lists(&self, fail: bool) {
    self.fail_lists.store(fail, Ordering::SeqCst);
  }

  /// Make only `stamp` fail; record writes still succeed.
  pub fn fail_stamps(&self, fail: bool) {
    self.fail_stamps.store(fail, Ordering::SeqCst);
  }

  /// Store a document directly, bypassing counters.
  pub fn insert_raw(&self, collection: &str, id: &str, fields: Fields) {
    if let Ok(mut collections) = self.collections.lock() {
      collections
        .entry(collection.to_string())
        .or_default()
        .insert(id.to_string(), fields);
    }
  }

  fn record_read(&self, collection: &str) -> Result<()> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(eyre!("Simulated read failure on {}", collection));
    }
    let mut reads = self
      .reads
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *reads.entry(collection.to_string()).or_default() += 1;
    Ok(())
  }

  fn record_write(&self, collection: &str) -> Result<()> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("Simulated write failure on {}", collection));
    }
    self.writes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  fn with_collections<T>(&self, f: impl FnOnce(&mut HashMap<String, Collection>) -> T) -> Result<T> {
    let mut collections = self
      .collections
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(f(&mut collections))
  }

  /// A strictly increasing clock so two stamps never collide.
  fn next_stamp(&self) -> Result<DateTime<Utc>> {
    let mut last = self
      .last_stamp
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let now = Utc::now();
    let stamp = match *last {
      Some(prev) if now <= prev => prev + Duration::microseconds(1),
      _ => now,
    };
    *last = Some(stamp);
    Ok(stamp)
  }
}

impl DocumentStore for MemoryStore {
  async fn list(&self, collection: &str) -> Result<Vec<Document>> {
    if self.fail_lists.load(Ordering::SeqCst) {
      return Err(eyre!("Simulated list failure on {}", collection));
    }
    self.record_read(collection)?;
    self.with_collections(|c| {
      c.get(collection)
        .map(|docs| {
          docs
            .iter()
            .map(|(id, fields)| Document {
              id: id.clone(),
              fields: fields.clone(),
            })
            .collect::<Vec<_>>()
        })
        .unwrap_or_default()
    })
  }

  async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
    self.record_read(collection)?;
    self.with_collections(|c| {
      c.get(collection)
        .and_then(|docs| docs.get(id))
        .map(|fields| Document {
          id: id.to_string(),
          fields: fields.clone(),
        })
    })
  }

  async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
    self.record_write(collection)?;
    let id = format!("doc{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
    self.with_collections(|c| {
      c.entry(collection.to_string())
        .or_default()
        .insert(id.clone(), fields);
    })?;
    Ok(id)
  }

  async fn set(&self, collection: &str, id: &str, fields: Fields, mode: WriteMode) -> Result<()> {
    self.record_write(collection)?;
    self.with_collections(|c| {
      let docs = c.entry(collection.to_string()).or_default();
      match mode {
        WriteMode::Overwrite => {
          docs.insert(id.to_string(), fields);
        }
        WriteMode::Merge => {
          docs.entry(id.to_string()).or_default().extend(fields);
        }
      }
    })
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<()> {
    self.record_write(collection)?;
    self.with_collections(|c| {
      if let Some(docs) = c.get_mut(collection) {
        docs.remove(id);
      }
    })
  }

  async fn stamp(&self, collection: &str, id: &str, field: &str) -> Result<String> {
    if self.fail_stamps.load(Ordering::SeqCst) {
      return Err(eyre!("Simulated stamp failure on {}/{}", collection, id));
    }
    self.record_write(collection)?;
    let stamp = format_timestamp(self.next_stamp()?);
    let value = serde_json::Value::String(stamp.clone());
    self.with_collections(|c| {
      c.entry(collection.to_string())
        .or_default()
        .entry(id.to_string())
        .or_default()
        .insert(field.to_string(), value);
    })?;
    Ok(stamp)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn fields(value: serde_json::Value) -> Fields {
    match value {
      serde_json::Value::Object(map) => map,
      _ => Fields::new(),
    }
  }

  #[tokio::test]
  async fn test_merge_keeps_other_fields() {
    let store = MemoryStore::new();
    store
      .set("categories", "c1", fields(json!({ "name": "Assets", "description": "d" })), WriteMode::Overwrite)
      .await
      .unwrap();
    store
      .set("categories", "c1", fields(json!({ "name": "Liabilities" })), WriteMode::Merge)
      .await
      .unwrap();

    let doc = store.get("categories", "c1").await.unwrap().unwrap();
    assert_eq!(doc.fields["name"], "Liabilities");
    assert_eq!(doc.fields["description"], "d");
    assert_eq!(store.reads_of("categories"), 1);
    assert_eq!(store.writes(), 2);
  }

  #[tokio::test]
  async fn test_stamps_strictly_increase() {
    let store = MemoryStore::new();
    let a = store.stamp("meta", "globalData", "updated_at").await.unwrap();
    let b = store.stamp("meta", "globalData", "updated_at").await.unwrap();
    assert_ne!(a, b);
    assert!(DateTime::parse_from_rfc3339(&b).unwrap() > DateTime::parse_from_rfc3339(&a).unwrap());

    let doc = store.get("meta", "globalData").await.unwrap().unwrap();
    assert_eq!(doc.fields["updated_at"], json!(b));
  }

  #[tokio::test]
  async fn test_injected_failures() {
    let store = MemoryStore::new();
    store.fail_writes(true);
    assert!(store.create("categories", Fields::new()).await.is_err());
    assert_eq!(store.writes(), 0);

    store.fail_reads(true);
    assert!(store.list("categories").await.is_err());
  }

  #[tokio::test]
  async fn test_targeted_failures() {
    let store = MemoryStore::new();
    store.fail_stamps(true);
    assert!(store.stamp("meta", "globalData", "updated_at").await.is_err());
    store.create("categories", Fields::new()).await.unwrap();

    store.fail_lists(true);
    assert!(store.list("categories").await.is_err());
    assert!(store.get("meta", "globalData").await.unwrap().is_none());
  }
}

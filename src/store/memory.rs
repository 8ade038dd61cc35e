//! In-process document store.
//!
//! Holds every document in one path-keyed map behind a `tokio::sync::RwLock`.
//! A commit takes the write lock, checks all preconditions, then applies all
//! writes, so readers never observe half of a batch.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{DocPath, Document, DocumentStore, Write};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
  docs: RwLock<BTreeMap<DocPath, Map<String, Value>>>,
  commits: AtomicUsize,
}

impl MemoryStore {
  /// Build a store pre-populated with documents (catalog, users).
  pub fn with_documents<I>(docs: I) -> Self
  where
    I: IntoIterator<Item = (DocPath, Map<String, Value>)>,
  {
    Self {
      docs: RwLock::new(docs.into_iter().collect()),
      commits: AtomicUsize::new(0),
    }
  }

  /// Number of successful commits since construction.
  #[cfg(test)]
  pub fn commit_count(&self) -> usize {
    self.commits.load(Ordering::SeqCst)
  }

  /// Remove a document outside of any batch. Only tests need to fake a
  /// dangling index entry.
  #[cfg(test)]
  pub async fn delete(&self, path: &DocPath) {
    self.docs.write().await.remove(path);
  }

  fn to_document(path: &DocPath, fields: &Map<String, Value>) -> Document {
    Document { id: path.id().to_string(), fields: fields.clone() }
  }
}

/// Recursive merge: nested objects merge key by key, everything else overwrites.
pub(crate) fn merge_into(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
  for (k, v) in patch {
    match (target.get_mut(k), v) {
      (Some(Value::Object(existing)), Value::Object(incoming)) => merge_into(existing, incoming),
      _ => {
        target.insert(k.clone(), v.clone());
      }
    }
  }
}

#[async_trait]
impl DocumentStore for MemoryStore {
  fn backend(&self) -> &'static str { "memory" }

  async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
    let docs = self.docs.read().await;
    Ok(docs.get(path).map(|f| Self::to_document(path, f)))
  }

  async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
    let docs = self.docs.read().await;
    Ok(
      docs
        .iter()
        .filter(|(p, _)| p.collection() == collection)
        .map(|(p, f)| Self::to_document(p, f))
        .collect(),
    )
  }

  async fn query_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>, StoreError> {
    let docs = self.docs.read().await;
    Ok(
      docs
        .iter()
        .filter(|(p, f)| p.collection() == collection && f.get(field) == Some(value))
        .map(|(p, f)| Self::to_document(p, f))
        .collect(),
    )
  }

  #[instrument(level = "debug", skip(self, writes), fields(writes = writes.len()))]
  async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
    let mut docs = self.docs.write().await;
    let paths: Vec<String> = writes.iter().map(|w| w.path().to_string()).collect();

    for w in &writes {
      if let Write::Create { path, .. } = w {
        if docs.contains_key(path) {
          return Err(StoreError::AlreadyExists(path.to_string()));
        }
      }
    }

    for w in writes {
      match w {
        Write::Create { path, fields } => {
          docs.insert(path, fields);
        }
        Write::Set { path, fields, merge: false } => {
          docs.insert(path, fields);
        }
        Write::Set { path, fields, merge: true } => {
          let entry = docs.entry(path).or_default();
          merge_into(entry, &fields);
        }
      }
    }

    let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(target: "store", commits = n, ?paths, "memory commit applied");
    Ok(())
  }
}

//! Document store abstraction: collection/document addressing, reads, equality
//! queries and atomic multi-document commits.
//!
//! Two backends implement [`DocumentStore`]:
//!   - [`memory::MemoryStore`] for local development and tests
//!   - [`firestore::FirestoreStore`] talking to Cloud Firestore over REST
//!
//! The handle is constructed once in `AppState` and passed down explicitly.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;

pub mod firestore;
pub mod memory;
pub mod value;

pub const USERS: &str = "users";
pub const DAILY_CHALLENGES: &str = "daily_challenges";
pub const TOPICS: &str = "topics";
pub const VOCABULARY: &str = "vocabulary";

/// Slash-separated document path: `collection/id[/collection/id...]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
  /// Top-level document, e.g. `users/{uid}`.
  pub fn new(collection: &str, id: &str) -> Result<Self, StoreError> {
    check_segment(collection)?;
    check_segment(id)?;
    Ok(DocPath(format!("{collection}/{id}")))
  }

  /// Document in a subcollection of this one.
  pub fn child(&self, collection: &str, id: &str) -> Result<Self, StoreError> {
    check_segment(collection)?;
    check_segment(id)?;
    Ok(DocPath(format!("{}/{collection}/{id}", self.0)))
  }

  pub fn id(&self) -> &str {
    self.0.rsplit('/').next().unwrap_or_default()
  }

  /// Path of the collection holding this document.
  pub fn collection(&self) -> &str {
    match self.0.rfind('/') {
      Some(i) => &self.0[..i],
      None => "",
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DocPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

fn check_segment(s: &str) -> Result<(), StoreError> {
  if s.is_empty() || s.contains('/') || s == "." || s == ".." {
    return Err(StoreError::InvalidPath(s.to_string()));
  }
  Ok(())
}

/// A stored document: its id plus its fields as a JSON object.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
  pub id: String,
  pub fields: Map<String, Value>,
}

impl Document {
  /// Decode into a typed record. The document id is injected as `id`.
  pub fn decode<T: DeserializeOwned>(&self, path_hint: &str) -> Result<T, StoreError> {
    let mut fields = self.fields.clone();
    fields.insert("id".into(), Value::String(self.id.clone()));
    serde_json::from_value(Value::Object(fields)).map_err(|e| StoreError::Decode {
      path: format!("{path_hint}/{}", self.id),
      reason: e.to_string(),
    })
  }
}

/// Serialize a record into document fields. `id` lives in the path, but we keep
/// it in the body too so clients reading the raw document see it.
pub fn encode<T: Serialize>(record: &T) -> Result<Map<String, Value>, StoreError> {
  match serde_json::to_value(record) {
    Ok(Value::Object(m)) => Ok(m),
    Ok(other) => Err(StoreError::Decode {
      path: String::new(),
      reason: format!("record encoded to non-object {other}"),
    }),
    Err(e) => Err(StoreError::Decode { path: String::new(), reason: e.to_string() }),
  }
}

/// One write inside an atomic commit.
#[derive(Clone, Debug, PartialEq)]
pub enum Write {
  /// Create only if no document exists at `path`.
  Create { path: DocPath, fields: Map<String, Value> },
  /// Set the document. With `merge`, nested maps are merged into the existing
  /// document instead of replacing it.
  Set { path: DocPath, fields: Map<String, Value>, merge: bool },
}

impl Write {
  pub fn path(&self) -> &DocPath {
    match self {
      Write::Create { path, .. } | Write::Set { path, .. } => path,
    }
  }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// Short backend name for logs.
  fn backend(&self) -> &'static str;

  async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

  /// Every document in a collection (e.g. `topics`).
  async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

  /// Documents whose top-level `field` equals `value`.
  async fn query_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>, StoreError>;

  /// Apply all writes or none. A failed `Create` precondition yields
  /// [`StoreError::AlreadyExists`] and leaves the store untouched.
  async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError>;
}

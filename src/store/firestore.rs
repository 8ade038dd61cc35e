//! Cloud Firestore backend over the REST v1 API.
//!
//! Only what the handlers need: get, paginated list, single-field equality
//! query (`:runQuery`) and atomic `:commit` with create preconditions and
//! merge update masks. Calls log paths and latencies, never document bodies.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, instrument};

use super::value::{decode_fields, encode_fields, encode_value, merge_mask, quote_segment};
use super::{DocPath, Document, DocumentStore, Write};
use crate::config::FirestoreCfg;
use crate::error::StoreError;

const PAGE_SIZE: u32 = 300;

#[derive(Clone)]
pub struct FirestoreStore {
  client: reqwest::Client,
  base_url: String,
  /// `projects/{p}/databases/{db}/documents`
  root: String,
  access_token: Option<String>,
}

#[derive(Deserialize)]
struct FsDocument {
  name: String,
  #[serde(default)]
  fields: Map<String, Value>,
}

#[derive(Deserialize)]
struct ListResponse {
  #[serde(default)]
  documents: Vec<FsDocument>,
  #[serde(default, rename = "nextPageToken")]
  next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct QueryRow {
  #[serde(default)]
  document: Option<FsDocument>,
}

impl FirestoreStore {
  pub fn from_config(cfg: &FirestoreCfg, project_id: &str) -> Result<Self, StoreError> {
    let base_url = match &cfg.emulator_host {
      Some(host) => format!("http://{host}/v1"),
      None => cfg.base_url.trim_end_matches('/').to_string(),
    };
    // The emulator accepts the magic "owner" token and bypasses security rules.
    let access_token = match (&cfg.access_token, &cfg.emulator_host) {
      (Some(t), _) => Some(t.clone()),
      (None, Some(_)) => Some("owner".to_string()),
      (None, None) => None,
    };

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()?;

    Ok(Self {
      client,
      base_url,
      root: format!("projects/{project_id}/databases/{}/documents", cfg.database),
      access_token,
    })
  }

  fn doc_name(&self, path: &DocPath) -> String {
    format!("{}/{}", self.root, path.as_str())
  }

  /// REST URL for `rel` (a document or collection path under the database
  /// root, possibly empty) with `suffix` glued to the last segment, e.g.
  /// `:commit`. Every segment is percent-encoded.
  fn endpoint(&self, rel: &str, suffix: &str) -> Result<Url, StoreError> {
    let invalid = || StoreError::Unavailable(format!("invalid Firestore base URL {}", self.base_url));
    let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
    let mut segments: Vec<String> = self
      .root
      .split('/')
      .chain(rel.split('/'))
      .filter(|s| !s.is_empty())
      .map(str::to_string)
      .collect();
    if let Some(last) = segments.last_mut() {
      last.push_str(suffix);
    }
    url.path_segments_mut().map_err(|_| invalid())?.pop_if_empty().extend(&segments);
    Ok(url)
  }

  fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
    let req = self
      .client
      .request(method, url)
      .header(USER_AGENT, "vocab-backend/0.1")
      .header(CONTENT_TYPE, "application/json");
    match &self.access_token {
      Some(t) => req.header(AUTHORIZATION, format!("Bearer {t}")),
      None => req,
    }
  }

  fn to_document(&self, raw: FsDocument) -> Result<Document, StoreError> {
    let id = raw.name.rsplit('/').next().unwrap_or_default().to_string();
    let fields = decode_fields(&raw.fields).map_err(|reason| StoreError::Decode { path: raw.name.clone(), reason })?;
    Ok(Document { id, fields })
  }

  /// `:runQuery` body: `from` names the last collection segment, the parent
  /// resource carries the rest of the path.
  fn run_query_body(collection_id: &str, field: &str, value: &Value) -> Value {
    json!({
      "structuredQuery": {
        "from": [{ "collectionId": collection_id }],
        "where": {
          "fieldFilter": {
            "field": { "fieldPath": quote_segment(field) },
            "op": "EQUAL",
            "value": encode_value(value)
          }
        }
      }
    })
  }

  fn commit_body(&self, writes: &[Write]) -> Value {
    let writes: Vec<Value> = writes
      .iter()
      .map(|w| match w {
        Write::Create { path, fields } => json!({
          "update": { "name": self.doc_name(path), "fields": encode_fields(fields) },
          "currentDocument": { "exists": false }
        }),
        Write::Set { path, fields, merge: false } => json!({
          "update": { "name": self.doc_name(path), "fields": encode_fields(fields) }
        }),
        Write::Set { path, fields, merge: true } => json!({
          "update": { "name": self.doc_name(path), "fields": encode_fields(fields) },
          "updateMask": { "fieldPaths": merge_mask(fields) }
        }),
      })
      .collect();
    json!({ "writes": writes })
  }
}

/// Map a failed commit to a store error. A rejected create precondition comes
/// back as 409 ALREADY_EXISTS.
fn classify_commit_error(status: StatusCode, body: &str, writes: &[Write]) -> StoreError {
  let api_status = extract_api_error(body).map(|(s, _)| s);
  if status == StatusCode::CONFLICT || api_status.as_deref() == Some("ALREADY_EXISTS") {
    let path = writes
      .iter()
      .find_map(|w| match w {
        Write::Create { path, .. } => Some(path.to_string()),
        _ => None,
      })
      .unwrap_or_default();
    return StoreError::AlreadyExists(path);
  }
  http_error(status, body)
}

/// The API's own message is passed through unchanged; the status only goes to the log.
fn http_error(status: StatusCode, body: &str) -> StoreError {
  let msg = extract_api_error(body).map(|(_, m)| m).unwrap_or_else(|| body.to_string());
  error!(target: "store", status = status.as_u16(), message = %msg, "firestore request failed");
  StoreError::Unavailable(msg)
}

/// `{"error": {"code": 409, "message": "...", "status": "ALREADY_EXISTS"}}`
fn extract_api_error(body: &str) -> Option<(String, String)> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj {
    #[serde(default)] status: String,
    #[serde(default)] message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| (w.error.status, w.error.message))
}

#[async_trait]
impl DocumentStore for FirestoreStore {
  fn backend(&self) -> &'static str { "firestore" }

  #[instrument(level = "debug", skip(self), fields(%path))]
  async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
    let start = Instant::now();
    let res = self.request(reqwest::Method::GET, self.endpoint(path.as_str(), "")?).send().await?;
    let status = res.status();
    debug!(target: "store", ?status, elapsed = ?start.elapsed(), "firestore get");

    if status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(http_error(status, &body));
    }
    let raw: FsDocument = res.json().await?;
    self.to_document(raw).map(Some)
  }

  #[instrument(level = "debug", skip(self), fields(%collection))]
  async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
    let url = self.endpoint(collection, "")?;
    let mut out = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
      let mut req = self.request(reqwest::Method::GET, url.clone()).query(&[("pageSize", PAGE_SIZE.to_string())]);
      if let Some(t) = &page_token {
        req = req.query(&[("pageToken", t)]);
      }
      let res = req.send().await?;
      let status = res.status();
      if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(http_error(status, &body));
      }
      let page: ListResponse = res.json().await?;
      for raw in page.documents {
        out.push(self.to_document(raw)?);
      }
      match page.next_page_token {
        Some(t) if !t.is_empty() => page_token = Some(t),
        _ => break,
      }
    }

    debug!(target: "store", %collection, count = out.len(), "firestore list");
    Ok(out)
  }

  #[instrument(level = "debug", skip(self, value), fields(%collection, %field))]
  async fn query_eq(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>, StoreError> {
    let (parent, collection_id) = collection.rsplit_once('/').unwrap_or(("", collection));
    let url = self.endpoint(parent, ":runQuery")?;
    let body = Self::run_query_body(collection_id, field, value);

    let res = self.request(reqwest::Method::POST, url).json(&body).send().await?;
    let status = res.status();
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(http_error(status, &body));
    }
    let rows: Vec<QueryRow> = res.json().await?;
    let docs = rows
      .into_iter()
      .filter_map(|r| r.document)
      .map(|raw| self.to_document(raw))
      .collect::<Result<Vec<_>, _>>()?;
    debug!(target: "store", %collection, count = docs.len(), "firestore query");
    Ok(docs)
  }

  #[instrument(level = "debug", skip(self, writes), fields(writes = writes.len()))]
  async fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
    let url = self.endpoint("", ":commit")?;
    let body = self.commit_body(&writes);
    let start = Instant::now();

    let res = self.request(reqwest::Method::POST, url).json(&body).send().await?;
    let status = res.status();
    debug!(target: "store", ?status, elapsed = ?start.elapsed(), "firestore commit");
    if !status.is_success() {
      let body = res.text().await.unwrap_or_default();
      return Err(classify_commit_error(status, &body, &writes));
    }
    Ok(())
  }
}

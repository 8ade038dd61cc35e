//! Minimal Gemini client for our use-case: one `generateContent` call that asks
//! for a vocabulary entry as JSON.
//!
//! The completion is free text that should contain one JSON object; we extract
//! it, decode it into an explicit record and fill the fields we own ourselves.
//! Calls are instrumented and log model names, latencies and response sizes (not contents).
//!
//! NOTE: The API key travels in a header, never in the URL, and is never logged.

use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::config::{GeminiCfg, Prompts};
use crate::domain::AiVocabularyEntry;
use crate::error::{DefinitionError, UpstreamError};
use crate::util::{extract_json_object, fill_template, slugify_word, trunc_for_log};

const SERVICE: &str = "Gemini";
const DEFAULT_LEVEL: &str = "C1";
const SOURCE_TYPE: &str = "ai_added";
const AI_TOPIC_ID: &str = "ai_researched";

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
}

/// What we accept from the model. Anything else in its JSON is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawDefinition {
  definitions: BTreeMap<String, String>,
  synonyms: Vec<String>,
  collocations: Vec<String>,
  example_sentences: BTreeMap<String, Vec<String>>,
  level: Option<String>,
  grammar_hint: Option<String>,
  contextual_text: Option<String>,
}

impl Gemini {
  /// Construct the client if an API key is configured; otherwise return None.
  pub fn from_config(cfg: &GeminiCfg) -> Option<Self> {
    let api_key = cfg.api_key.clone().filter(|k| !k.is_empty())?;
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()
      .ok()?;
    Some(Self {
      client,
      api_key,
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
    })
  }

  /// Single-turn `generateContent`; returns the first candidate's text (may be empty).
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn generate_text(&self, prompt: &str) -> Result<String, UpstreamError> {
    let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
    let req = GenerateContentRequest {
      contents: vec![ContentReq { parts: vec![PartReq { text: prompt.to_string() }] }],
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "vocab-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&req).send().await
      .map_err(|e| UpstreamError::Transport { service: SERVICE, reason: e.to_string() })?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_google_error(&body).unwrap_or(body);
      return Err(UpstreamError::Http { service: SERVICE, status, body: trunc_for_log(&msg, 300) });
    }

    let body: GenerateContentResponse = res.json().await
      .map_err(|e| UpstreamError::Body { service: SERVICE, reason: e.to_string() })?;
    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, completion_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }
    Ok(first_candidate_text(&body))
  }

  /// Research `word` and return an app-shaped vocabulary entry.
  #[instrument(level = "info", skip(self, prompts), fields(model = %self.model, word_len = word.len()))]
  pub async fn define_word(&self, prompts: &Prompts, word: &str) -> Result<AiVocabularyEntry, DefinitionError> {
    let prompt = fill_template(&prompts.definition_user_template, &[("word", word)]);
    let start = Instant::now();
    let result = self.generate_text(&prompt).await;
    let elapsed = start.elapsed();

    let text = match result {
      Ok(t) => {
        info!(?elapsed, text_len = t.len(), "Model response received");
        t
      }
      Err(e) => {
        error!(target: "definition", ?elapsed, error = %e, "Gemini call failed");
        return Err(DefinitionError::Upstream);
      }
    };

    if text.trim().is_empty() {
      error!(target: "definition", "Gemini returned empty content");
      return Err(DefinitionError::EmptyResponse);
    }

    let raw = parse_definition(&text).ok_or_else(|| {
      error!(target: "definition", preview = %trunc_for_log(&text, 120), "Failed to parse Gemini JSON");
      DefinitionError::InvalidFormat
    })?;

    Ok(build_entry(word, raw, unix_millis()))
  }
}

fn parse_definition(text: &str) -> Option<RawDefinition> {
  let json = extract_json_object(text)?;
  serde_json::from_str::<RawDefinition>(json).ok()
}

/// Fields we own (id, word, source, topic) are never taken from the model.
fn build_entry(word: &str, raw: RawDefinition, now_ms: u128) -> AiVocabularyEntry {
  AiVocabularyEntry {
    id: format!("ai-{}-{}", slugify_word(word), now_ms),
    word: word.to_string(),
    definitions: raw.definitions,
    synonyms: raw.synonyms,
    collocations: raw.collocations,
    example_sentences: raw.example_sentences,
    level: raw.level.filter(|l| !l.trim().is_empty()).unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
    source_type: SOURCE_TYPE.to_string(),
    topic_id: AI_TOPIC_ID.to_string(),
    grammar_hint: raw.grammar_hint,
    contextual_text: raw.contextual_text,
  }
}

fn unix_millis() -> u128 {
  SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default()
}

fn first_candidate_text(body: &GenerateContentResponse) -> String {
  body.candidates.first()
    .and_then(|c| c.content.as_ref())
    .and_then(|c| c.parts.first())
    .and_then(|p| p.text.clone())
    .unwrap_or_default()
}

// --- generateContent DTOs ---

#[derive(Serialize)]
struct GenerateContentRequest { contents: Vec<ContentReq> }
#[derive(Serialize)]
struct ContentReq { parts: Vec<PartReq> }
#[derive(Serialize)]
struct PartReq { text: String }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate { #[serde(default)] content: Option<ContentResp> }
#[derive(Deserialize)]
struct ContentResp { #[serde(default)] parts: Vec<PartResp> }
#[derive(Deserialize)]
struct PartResp { #[serde(default)] text: Option<String> }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

/// Google APIs wrap errors as `{"error": {"code", "message", "status"}}`.
pub fn extract_google_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}

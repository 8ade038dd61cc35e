//! Service configuration: optional TOML file (`APP_CONFIG_PATH`) overlaid by
//! environment variables, plus the TOML catalog used to seed the memory store.
//!
//! Env variables (all optional):
//!   PORT                     : u16 (default 3000)
//!   ALLOWED_ORIGINS          : comma-separated CORS origins
//!   STORE_BACKEND            : "memory" (default) or "firestore"
//!   CATALOG_PATH             : TOML catalog for the memory store
//!   FIREBASE_PROJECT_ID      : project for Firestore and ID-token audience
//!   FIRESTORE_EMULATOR_HOST  : host:port of a local Firestore emulator
//!   FIRESTORE_ACCESS_TOKEN   : OAuth bearer token for Firestore REST
//!   AUTH_MODE                : "firebase" (default) or "static"
//!   GEMINI_API_KEY / GEMINI_BASE_URL / GEMINI_MODEL
//!   VISION_API_KEY / VISION_BASE_URL

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{Topic, VocabularyItem};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub port: u16,
  /// Explicit CORS allow-list. Never a wildcard.
  pub allowed_origins: Vec<String>,
  pub firebase_project_id: String,
  pub store: StoreCfg,
  pub firestore: FirestoreCfg,
  pub auth: AuthCfg,
  pub gemini: GeminiCfg,
  pub vision: VisionCfg,
  pub prompts: Prompts,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      port: 3000,
      allowed_origins: Vec::new(),
      firebase_project_id: String::new(),
      store: StoreCfg::default(),
      firestore: FirestoreCfg::default(),
      auth: AuthCfg::default(),
      gemini: GeminiCfg::default(),
      vision: VisionCfg::default(),
      prompts: Prompts::default(),
    }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
  #[default]
  Memory,
  Firestore,
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct StoreCfg {
  pub backend: StoreBackend,
  /// TOML catalog (topics, vocabulary, users) for the memory backend.
  pub catalog_path: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FirestoreCfg {
  pub base_url: String,
  pub database: String,
  pub emulator_host: Option<String>,
  pub access_token: Option<String>,
  pub timeout_secs: u64,
}

impl Default for FirestoreCfg {
  fn default() -> Self {
    Self {
      base_url: "https://firestore.googleapis.com/v1".into(),
      database: "(default)".into(),
      emulator_host: None,
      access_token: None,
      timeout_secs: 20,
    }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
  #[default]
  Firebase,
  /// Fixed token -> uid table. Local development only.
  Static,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AuthCfg {
  pub mode: AuthMode,
  pub jwks_url: String,
  pub jwks_ttl_secs: u64,
  pub static_tokens: HashMap<String, String>,
}

impl Default for AuthCfg {
  fn default() -> Self {
    Self {
      mode: AuthMode::Firebase,
      jwks_url: "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com".into(),
      jwks_ttl_secs: 3600,
      static_tokens: HashMap::new(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeminiCfg {
  pub api_key: Option<String>,
  pub base_url: String,
  pub model: String,
  pub timeout_secs: u64,
}

impl Default for GeminiCfg {
  fn default() -> Self {
    Self {
      api_key: None,
      base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
      model: "gemini-pro".into(),
      timeout_secs: 30,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VisionCfg {
  pub api_key: Option<String>,
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for VisionCfg {
  fn default() -> Self {
    Self {
      api_key: None,
      base_url: "https://vision.googleapis.com/v1".into(),
      timeout_secs: 30,
    }
  }
}

/// Prompt used by the Gemini client. Override in TOML to tune languages or fields.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub definition_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      definition_user_template: "Create a vocabulary entry for the German word \"{word}\" as JSON with the following fields: definitions (de,en,es), synonyms (min 3), collocations (min 3), exampleSentences (de,en,es with two each), grammarHint, contextualText. Respond only with JSON.".into(),
    }
  }
}

/// Seed content for the memory store.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct CatalogCfg {
  pub topics: Vec<Topic>,
  pub vocabulary: Vec<VocabularyItem>,
  /// User ids that get an (empty) profile document.
  pub users: Vec<String>,
}

fn env_var(key: &str) -> Option<String> {
  std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
  /// Overlay environment variables on top of file/default values.
  pub fn apply_env(&mut self) {
    if let Some(p) = env_var("PORT") {
      match p.parse::<u16>() {
        Ok(port) => self.port = port,
        Err(e) => warn!(target: "vocab_backend", value = %p, error = %e, "Invalid PORT, keeping default"),
      }
    }
    if let Some(list) = env_var("ALLOWED_ORIGINS") {
      self.allowed_origins = list.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }
    if let Some(b) = env_var("STORE_BACKEND") {
      match b.as_str() {
        "memory" => self.store.backend = StoreBackend::Memory,
        "firestore" => self.store.backend = StoreBackend::Firestore,
        other => warn!(target: "vocab_backend", value = %other, "Unknown STORE_BACKEND, keeping configured backend"),
      }
    }
    if let Some(p) = env_var("CATALOG_PATH") { self.store.catalog_path = Some(p); }
    if let Some(p) = env_var("FIREBASE_PROJECT_ID") { self.firebase_project_id = p; }
    if let Some(h) = env_var("FIRESTORE_EMULATOR_HOST") { self.firestore.emulator_host = Some(h); }
    if let Some(t) = env_var("FIRESTORE_ACCESS_TOKEN") { self.firestore.access_token = Some(t); }
    if let Some(m) = env_var("AUTH_MODE") {
      match m.as_str() {
        "firebase" => self.auth.mode = AuthMode::Firebase,
        "static" => self.auth.mode = AuthMode::Static,
        other => warn!(target: "vocab_backend", value = %other, "Unknown AUTH_MODE, keeping configured mode"),
      }
    }
    if let Some(k) = env_var("GEMINI_API_KEY") { self.gemini.api_key = Some(k); }
    if let Some(u) = env_var("GEMINI_BASE_URL") { self.gemini.base_url = u; }
    if let Some(m) = env_var("GEMINI_MODEL") { self.gemini.model = m; }
    if let Some(k) = env_var("VISION_API_KEY") { self.vision.api_key = Some(k); }
    if let Some(u) = env_var("VISION_BASE_URL") { self.vision.base_url = u; }
  }
}

/// Load `AppConfig` from APP_CONFIG_PATH (if set) and overlay env variables.
/// A missing or broken file is logged and replaced by defaults.
pub fn load_app_config() -> AppConfig {
  let mut cfg = match std::env::var("APP_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match toml::from_str::<AppConfig>(&s) {
        Ok(cfg) => {
          info!(target: "vocab_backend", %path, "Loaded app config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "vocab_backend", %path, error = %e, "Failed to parse TOML config");
          AppConfig::default()
        }
      },
      Err(e) => {
        error!(target: "vocab_backend", %path, error = %e, "Failed to read TOML config file");
        AppConfig::default()
      }
    },
    Err(_) => AppConfig::default(),
  };
  cfg.apply_env();
  cfg
}

/// Read the memory-store catalog. On any parsing/IO error, returns None.
pub fn load_catalog(path: &str) -> Option<CatalogCfg> {
  match std::fs::read_to_string(path) {
    Ok(s) => match toml::from_str::<CatalogCfg>(&s) {
      Ok(cat) => {
        info!(target: "vocab_backend", %path, topics = cat.topics.len(), vocabulary = cat.vocabulary.len(), users = cat.users.len(), "Loaded catalog (TOML)");
        Some(cat)
      }
      Err(e) => {
        error!(target: "vocab_backend", %path, error = %e, "Failed to parse catalog");
        None
      }
    },
    Err(e) => {
      error!(target: "vocab_backend", %path, error = %e, "Failed to read catalog file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn toml_sections_override_defaults() {
    let cfg: AppConfig = toml::from_str(
      r#"
        port = 8081
        allowed_origins = ["https://app.example.com"]
        firebase_project_id = "vocab-prod"

        [store]
        backend = "firestore"

        [auth]
        mode = "static"
        static_tokens = { "dev-token" = "u1" }

        [gemini]
        model = "gemini-1.5-flash"
      "#,
    )
    .expect("config");

    assert_eq!(cfg.port, 8081);
    assert_eq!(cfg.allowed_origins, vec!["https://app.example.com".to_string()]);
    assert_eq!(cfg.store.backend, StoreBackend::Firestore);
    assert_eq!(cfg.auth.mode, AuthMode::Static);
    assert_eq!(cfg.auth.static_tokens.get("dev-token").map(String::as_str), Some("u1"));
    assert_eq!(cfg.gemini.model, "gemini-1.5-flash");
    assert_eq!(cfg.gemini.base_url, GeminiCfg::default().base_url);
    assert_eq!(cfg.firestore.database, "(default)");
    assert!(cfg.prompts.definition_user_template.contains("{word}"));
  }

  #[test]
  fn catalog_uses_app_field_names() {
    let cat: CatalogCfg = toml::from_str(
      r#"
        users = ["u1"]

        [[topics]]
        id = "t1"
        titleEn = "Food"

        [[vocabulary]]
        id = "v1"
        word = "Brot"
        topicId = "t1"
      "#,
    )
    .expect("catalog");
    assert_eq!(cat.topics[0].title_en, "Food");
    assert_eq!(cat.vocabulary[0].topic_id, "t1");
    assert_eq!(cat.users, vec!["u1".to_string()]);
  }
}

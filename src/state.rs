//! Application state: document store, identity verifier, prompts and the
//! optional Gemini / Vision clients.
//!
//! The store backend is chosen by config:
//!   - memory: seeded from the TOML catalog (if given) or the built-in seeds
//!   - firestore: Firestore REST (or the local emulator)
//! Missing API keys disable the matching endpoint instead of failing startup.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::auth::{FirebaseIdentity, IdentityVerifier, StaticIdentity};
use crate::config::{load_catalog, AppConfig, AuthMode, Prompts, StoreBackend};
use crate::gemini::Gemini;
use crate::seeds::{catalog_documents, seed_catalog};
use crate::store::{firestore::FirestoreStore, memory::MemoryStore, DocumentStore};
use crate::vision::Vision;

pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub gemini: Option<Gemini>,
    pub vision: Option<Vision>,
    pub prompts: Prompts,
}

impl AppState {
    /// Build state from config: store backend, identity verifier, API clients.
    #[instrument(level = "info", skip_all, fields(store = ?cfg.store.backend, auth = ?cfg.auth.mode))]
    pub fn from_config(cfg: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn DocumentStore> = match cfg.store.backend {
            StoreBackend::Memory => {
                let catalog = cfg
                    .store
                    .catalog_path
                    .as_deref()
                    .and_then(load_catalog)
                    .unwrap_or_else(|| {
                        info!(target: "vocab_backend", "No catalog loaded; using built-in seeds");
                        seed_catalog()
                    });
                info!(
                    target: "vocab_backend",
                    topics = catalog.topics.len(),
                    vocabulary = catalog.vocabulary.len(),
                    users = catalog.users.len(),
                    "Memory store seeded"
                );
                Arc::new(MemoryStore::with_documents(catalog_documents(&catalog)?))
            }
            StoreBackend::Firestore => {
                let fs = FirestoreStore::from_config(&cfg.firestore, &cfg.firebase_project_id)?;
                info!(target: "vocab_backend", project = %cfg.firebase_project_id, emulator = cfg.firestore.emulator_host.is_some(), "Firestore store enabled.");
                Arc::new(fs)
            }
        };

        let identity: Arc<dyn IdentityVerifier> = match cfg.auth.mode {
            AuthMode::Firebase => {
                if cfg.firebase_project_id.is_empty() {
                    return Err("FIREBASE_PROJECT_ID is required for firebase auth".into());
                }
                Arc::new(FirebaseIdentity::new(&cfg.auth, &cfg.firebase_project_id)?)
            }
            AuthMode::Static => {
                warn!(target: "vocab_backend", tokens = cfg.auth.static_tokens.len(), "Static token auth enabled. Do not use in production.");
                Arc::new(StaticIdentity::new(cfg.auth.static_tokens.clone()))
            }
        };

        let gemini = Gemini::from_config(&cfg.gemini);
        if let Some(g) = &gemini {
            info!(target: "vocab_backend", base_url = %g.base_url, model = %g.model, "Gemini enabled.");
        } else {
            warn!(target: "vocab_backend", "Gemini disabled (no GEMINI_API_KEY). /generateAiDefinition will answer 500.");
        }

        let vision = Vision::from_config(&cfg.vision);
        if let Some(v) = &vision {
            info!(target: "vocab_backend", base_url = %v.base_url, "Cloud Vision enabled.");
        } else {
            warn!(target: "vocab_backend", "Cloud Vision disabled (no VISION_API_KEY). /processImageForOcr will answer INTERNAL.");
        }

        if cfg.allowed_origins.is_empty() {
            warn!(target: "vocab_backend", "ALLOWED_ORIGINS is empty; browsers will be refused by CORS");
        }

        Ok(Self {
            store,
            identity,
            gemini,
            vision,
            prompts: cfg.prompts.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocPath, USERS};

    #[tokio::test]
    async fn memory_backend_with_static_auth_boots_from_seeds() {
        let mut cfg = AppConfig::default();
        cfg.auth.mode = AuthMode::Static;
        cfg.auth.static_tokens.insert("dev".into(), "demo".into());

        let state = AppState::from_config(&cfg).expect("state");
        assert_eq!(state.store.backend(), "memory");
        assert!(state.gemini.is_none());
        assert!(state.vision.is_none());
        assert_eq!(state.identity.verify("dev").await.expect("uid"), "demo");

        let demo = DocPath::new(USERS, "demo").expect("path");
        assert!(state.store.get(&demo).await.expect("get").is_some());
    }

    #[test]
    fn firebase_auth_needs_a_project() {
        let cfg = AppConfig::default();
        assert!(AppState::from_config(&cfg).is_err());
    }
}

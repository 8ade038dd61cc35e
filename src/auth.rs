//! Caller identity: bearer credential -> stable user id.
//!
//! - `FirebaseIdentity` verifies Firebase ID tokens (RS256) against Google's
//!   securetoken JWKS, cached for a TTL and refreshed on an unknown `kid`.
//! - `StaticIdentity` maps fixed tokens to uids for local development.
//!
//! Tokens are never logged.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AuthCfg;
use crate::error::AuthError;

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
  /// Resolve a bearer token to the caller's uid.
  async fn verify(&self, token: &str) -> Result<String, AuthError>;
}

/// Extract `<token>` from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
  let raw = headers
    .get(AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(AuthError::MissingCredential)?;
  let (scheme, token) = raw.trim().split_once(' ').ok_or(AuthError::MissingCredential)?;
  let token = token.trim();
  if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
    return Err(AuthError::MissingCredential);
  }
  Ok(token)
}

/// Header extraction + verification, logging the failure reason.
#[instrument(level = "debug", skip_all)]
pub async fn authenticate(verifier: &dyn IdentityVerifier, headers: &HeaderMap) -> Result<String, AuthError> {
  let result = match bearer_token(headers) {
    Ok(token) => verifier.verify(token).await,
    Err(e) => Err(e),
  };
  match &result {
    Ok(uid) => debug!(target: "auth", %uid, "caller authenticated"),
    Err(AuthError::KeyFetch(reason)) => error!(target: "auth", %reason, "could not load signing keys"),
    Err(e) => warn!(target: "auth", error = %e, "unauthenticated call"),
  }
  result
}

pub struct StaticIdentity {
  tokens: HashMap<String, String>,
}

impl StaticIdentity {
  pub fn new(tokens: HashMap<String, String>) -> Self {
    Self { tokens }
  }
}

#[async_trait]
impl IdentityVerifier for StaticIdentity {
  async fn verify(&self, token: &str) -> Result<String, AuthError> {
    self
      .tokens
      .get(token)
      .filter(|uid| !uid.is_empty())
      .cloned()
      .ok_or_else(|| AuthError::InvalidCredential("unknown token".into()))
  }
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
  sub: String,
}

struct KeyCache {
  fetched: Instant,
  keys: HashMap<String, DecodingKey>,
}

pub struct FirebaseIdentity {
  client: reqwest::Client,
  jwks_url: String,
  project_id: String,
  ttl: Duration,
  cache: RwLock<Option<KeyCache>>,
}

impl FirebaseIdentity {
  pub fn new(cfg: &AuthCfg, project_id: &str) -> Result<Self, AuthError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| AuthError::KeyFetch(e.to_string()))?;
    Ok(Self {
      client,
      jwks_url: cfg.jwks_url.clone(),
      project_id: project_id.to_string(),
      ttl: Duration::from_secs(cfg.jwks_ttl_secs),
      cache: RwLock::new(None),
    })
  }

  fn validation(&self) -> Validation {
    let mut v = Validation::new(Algorithm::RS256);
    v.set_audience(&[&self.project_id]);
    v.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);
    v.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
    v
  }

  async fn cached_key(&self, kid: &str) -> Option<DecodingKey> {
    let cache = self.cache.read().await;
    cache
      .as_ref()
      .filter(|c| c.fetched.elapsed() < self.ttl)
      .and_then(|c| c.keys.get(kid).cloned())
  }

  #[instrument(level = "info", skip(self))]
  async fn refresh_keys(&self) -> Result<(), AuthError> {
    let res = self
      .client
      .get(&self.jwks_url)
      .send()
      .await
      .map_err(|e| AuthError::KeyFetch(e.to_string()))?;
    if !res.status().is_success() {
      return Err(AuthError::KeyFetch(format!("JWKS HTTP {}", res.status())));
    }
    let set: JwkSet = res.json().await.map_err(|e| AuthError::KeyFetch(e.to_string()))?;
    let keys = keys_from_jwks(&set);
    info!(target: "auth", keys = keys.len(), "refreshed Firebase signing keys");
    *self.cache.write().await = Some(KeyCache { fetched: Instant::now(), keys });
    Ok(())
  }

  async fn key_for(&self, kid: &str) -> Result<DecodingKey, AuthError> {
    if let Some(k) = self.cached_key(kid).await {
      return Ok(k);
    }
    self.refresh_keys().await?;
    self
      .cached_key(kid)
      .await
      .ok_or_else(|| AuthError::InvalidCredential(format!("unknown signing key id {kid}")))
  }
}

fn keys_from_jwks(set: &JwkSet) -> HashMap<String, DecodingKey> {
  set
    .keys
    .iter()
    .filter_map(|jwk| {
      let kid = jwk.common.key_id.clone()?;
      match DecodingKey::from_jwk(jwk) {
        Ok(k) => Some((kid, k)),
        Err(e) => {
          warn!(target: "auth", %kid, error = %e, "skipping unusable JWK");
          None
        }
      }
    })
    .collect()
}

#[async_trait]
impl IdentityVerifier for FirebaseIdentity {
  async fn verify(&self, token: &str) -> Result<String, AuthError> {
    let header = decode_header(token).map_err(|e| AuthError::InvalidCredential(e.to_string()))?;
    if header.alg != Algorithm::RS256 {
      return Err(AuthError::InvalidCredential(format!("unexpected algorithm {:?}", header.alg)));
    }
    let kid = header.kid.ok_or_else(|| AuthError::InvalidCredential("token has no key id".into()))?;
    let key = self.key_for(&kid).await?;

    let data = decode::<FirebaseClaims>(token, &key, &self.validation())
      .map_err(|e| AuthError::InvalidCredential(e.to_string()))?;
    if data.claims.sub.is_empty() {
      return Err(AuthError::InvalidCredential("empty subject".into()));
    }
    Ok(data.claims.sub)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::HeaderValue;
  use jsonwebtoken::{encode, EncodingKey, Header};

  fn headers(v: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(AUTHORIZATION, HeaderValue::from_str(v).expect("header"));
    h
  }

  #[test]
  fn bearer_token_requires_scheme_and_value() {
    assert_eq!(bearer_token(&headers("Bearer abc")).expect("token"), "abc");
    assert_eq!(bearer_token(&headers("bearer   abc ")).expect("token"), "abc");
    assert!(matches!(bearer_token(&headers("Basic abc")), Err(AuthError::MissingCredential)));
    assert!(matches!(bearer_token(&headers("Bearer")), Err(AuthError::MissingCredential)));
    assert!(matches!(bearer_token(&HeaderMap::new()), Err(AuthError::MissingCredential)));
  }

  #[tokio::test]
  async fn static_identity_resolves_known_tokens_only() {
    let ids = StaticIdentity::new(HashMap::from([("dev".to_string(), "u1".to_string())]));
    assert_eq!(authenticate(&ids, &headers("Bearer dev")).await.expect("uid"), "u1");
    assert!(matches!(
      authenticate(&ids, &headers("Bearer nope")).await,
      Err(AuthError::InvalidCredential(_))
    ));
  }

  #[tokio::test]
  async fn firebase_identity_rejects_before_fetching_keys() {
    let ids = FirebaseIdentity::new(&AuthCfg::default(), "vocab-test").expect("verifier");

    assert!(matches!(ids.verify("not-a-jwt").await, Err(AuthError::InvalidCredential(_))));

    let hs = encode(
      &Header::default(),
      &serde_json::json!({ "sub": "u1", "exp": 4_102_444_800u64 }),
      &EncodingKey::from_secret(b"secret"),
    )
    .expect("token");
    match ids.verify(&hs).await {
      Err(AuthError::InvalidCredential(reason)) => assert!(reason.contains("algorithm")),
      other => panic!("unexpected {other:?}"),
    }
    assert!(ids.cache.read().await.is_none());
  }

  #[test]
  fn validation_pins_project_audience_and_issuer() {
    let ids = FirebaseIdentity::new(&AuthCfg::default(), "vocab-test").expect("verifier");
    let v = ids.validation();
    assert!(v.aud.as_ref().is_some_and(|a| a.contains("vocab-test")));
    assert!(v.iss.as_ref().is_some_and(|i| i.contains("https://securetoken.google.com/vocab-test")));
  }
}

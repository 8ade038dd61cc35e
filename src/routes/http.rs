//! HTTP endpoint handlers. These are thin wrappers that authenticate the caller
//! and forward to core logic. Each handler is instrumented and logs basic result info.

use std::sync::Arc;

use axum::{
  body::Bytes,
  extract::State,
  http::{HeaderMap, Method, StatusCode},
  response::IntoResponse,
  Json,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{info, instrument};

use crate::auth::authenticate;
use crate::challenge::{generate_daily_challenge, ChallengeOutcome};
use crate::domain::{AiVocabularyEntry, DateKey};
use crate::error::{ChallengeError, DefinitionError, OcrError};
use crate::logic::{ai_definition, ocr_words};
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, headers))]
pub async fn http_generate_daily_challenge(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> Result<(StatusCode, Json<ChallengeOut>), ChallengeError> {
  let uid = authenticate(state.identity.as_ref(), &headers)
    .await
    .map_err(|_| ChallengeError::Unauthenticated)?;

  let today = DateKey::today_utc();
  let mut rng = StdRng::from_entropy();
  let outcome = generate_daily_challenge(state.store.as_ref(), &uid, &today, &mut rng).await?;

  info!(target: "challenge", %uid, id = %outcome.challenge().id, created = matches!(outcome, ChallengeOutcome::Created(_)), "HTTP daily challenge served");
  let (status, message, challenge) = match outcome {
    ChallengeOutcome::Existing(c) => (StatusCode::OK, CHALLENGE_EXISTING, c),
    ChallengeOutcome::Created(c) => (StatusCode::CREATED, CHALLENGE_CREATED, c),
  };
  Ok((status, Json(ChallengeOut { message, challenge })))
}

#[instrument(level = "info", skip(state, headers, body), fields(body_len = body.len()))]
pub async fn http_process_image_for_ocr(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<CallableOut<OcrOut>>, OcrError> {
  let uid = authenticate(state.identity.as_ref(), &headers)
    .await
    .map_err(|_| OcrError::Unauthenticated)?;
  let words = ocr_words(&state, &uid, &body).await?;
  Ok(Json(CallableOut { result: OcrOut { words } }))
}

/// Routed for every method so that auth is checked before the method.
#[instrument(level = "info", skip(state, headers, body), fields(%method, body_len = body.len()))]
pub async fn http_generate_ai_definition(
  State(state): State<Arc<AppState>>,
  method: Method,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<AiVocabularyEntry>, DefinitionError> {
  let uid = authenticate(state.identity.as_ref(), &headers)
    .await
    .map_err(|_| DefinitionError::Unauthenticated)?;
  if method != Method::POST {
    return Err(DefinitionError::MethodNotAllowed);
  }
  let entry = ai_definition(&state, &uid, &body).await?;
  Ok(Json(entry))
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use axum::{body::Body, http::Request, Router};
  use serde_json::{json, Value};
  use tokio::net::TcpListener;
  use tower::ServiceExt;

  use super::*;
  use crate::auth::StaticIdentity;
  use crate::config::{GeminiCfg, Prompts, VisionCfg};
  use crate::gemini::Gemini;
  use crate::routes::build_router;
  use crate::seeds::{catalog_documents, seed_catalog};
  use crate::store::memory::MemoryStore;
  use crate::vision::Vision;

  const ORIGIN: &str = "https://app.example.com";

  fn state() -> AppState {
    let tokens = HashMap::from([
      ("tok-demo".to_string(), "demo".to_string()),
      ("tok-ghost".to_string(), "ghost".to_string()),
    ]);
    AppState {
      store: Arc::new(MemoryStore::with_documents(catalog_documents(&seed_catalog()).expect("docs"))),
      identity: Arc::new(StaticIdentity::new(tokens)),
      gemini: None,
      vision: None,
      prompts: Prompts::default(),
    }
  }

  fn app(state: AppState) -> Router {
    build_router(Arc::new(state), &[ORIGIN.to_string()])
  }

  fn request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut b = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    if let Some(t) = token {
      b = b.header("authorization", format!("Bearer {t}"));
    }
    b.body(Body::from(body.to_string())).expect("request")
  }

  async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.expect("response");
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.expect("body");
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
    (status, json)
  }

  /// Serve `reply` for every request on a local port; returns the base URL.
  async fn fake_upstream(reply: Value) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let upstream = Router::new().fallback(move || {
      let reply = reply.clone();
      async move { Json(reply) }
    });
    tokio::spawn(async move {
      let _ = axum::serve(listener, upstream).await;
    });
    format!("http://{addr}")
  }

  #[tokio::test]
  async fn health_is_public() {
    let (status, body) = call(&app(state()), request(Method::GET, "/api/v1/health", None, "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
  }

  #[tokio::test]
  async fn daily_challenge_requires_a_known_caller() {
    let app = app(state());
    let (status, body) = call(&app, request(Method::POST, "/generateDailyChallenge", None, "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized. User must be authenticated.");

    let (status, _) = call(&app, request(Method::GET, "/generateDailyChallenge", Some("forged"), "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, request(Method::GET, "/generateDailyChallenge", Some("tok-ghost"), "")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User profile not found.");
  }

  #[tokio::test]
  async fn daily_challenge_is_created_once_then_returned() {
    let app = app(state());
    let today = DateKey::today_utc().to_string();

    let (status, first) = call(&app, request(Method::POST, "/generateDailyChallenge", Some("tok-demo"), "")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["message"], CHALLENGE_CREATED);
    assert_eq!(first["challenge"]["id"], today.as_str());
    assert_eq!(first["challenge"]["userId"], "demo");
    assert_eq!(first["challenge"]["status"], "open");

    let (status, second) = call(&app, request(Method::GET, "/generateDailyChallenge", Some("tok-demo"), "")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], CHALLENGE_EXISTING);
    assert_eq!(second["challenge"], first["challenge"]);
  }

  #[tokio::test]
  async fn preflight_allows_configured_origin_only() {
    let app = app(state());
    let preflight = |origin: &str| {
      Request::builder()
        .method(Method::OPTIONS)
        .uri("/generateDailyChallenge")
        .header("origin", origin)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .body(Body::empty())
        .expect("request")
    };

    let res = app.clone().oneshot(preflight(ORIGIN)).await.expect("response");
    assert!(res.status().is_success());
    let h = res.headers();
    assert_eq!(h["access-control-allow-origin"], ORIGIN);
    let methods = h["access-control-allow-methods"].to_str().expect("methods").to_ascii_uppercase();
    for m in ["GET", "POST", "OPTIONS"] {
      assert!(methods.contains(m), "missing {m} in {methods}");
    }
    let allowed = h["access-control-allow-headers"].to_str().expect("headers").to_ascii_lowercase();
    assert!(allowed.contains("authorization") && allowed.contains("content-type"));

    let res = app.oneshot(preflight("https://evil.example.com")).await.expect("response");
    assert!(res.headers().get("access-control-allow-origin").is_none());
  }

  #[tokio::test]
  async fn ocr_uses_callable_error_shapes() {
    let app = app(state());
    let body = r#"{"data":{"imageData":"aGVsbG8="}}"#;

    let (status, err) = call(&app, request(Method::POST, "/processImageForOcr", None, body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["error"]["status"], "UNAUTHENTICATED");

    let (status, err) = call(&app, request(Method::POST, "/processImageForOcr", Some("tok-demo"), r#"{"data":{}}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["status"], "INVALID_ARGUMENT");

    // valid input but no Vision client configured
    let (status, err) = call(&app, request(Method::POST, "/processImageForOcr", Some("tok-demo"), body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err["error"]["status"], "INTERNAL");
  }

  #[tokio::test]
  async fn ocr_returns_word_boxes_from_vision() {
    let base = fake_upstream(json!({ "responses": [{ "textAnnotations": [
      { "description": "Brot Käse", "boundingPoly": { "vertices": [{ "x": 0, "y": 0 }, { "x": 90, "y": 30 }] } },
      { "description": "Brot", "boundingPoly": { "vertices": [{ "x": 1, "y": 2 }, { "x": 41, "y": 2 }, { "x": 41, "y": 22 }, { "x": 1, "y": 22 }] } }
    ]}]}))
    .await;
    let mut st = state();
    st.vision = Vision::from_config(&VisionCfg { api_key: Some("k".into()), base_url: base, ..VisionCfg::default() });
    let app = app(st);

    let body = r#"{"data":{"imageData":"data:image/png;base64,aGVsbG8=","mimeType":"image/png"}}"#;
    let (status, out) = call(&app, request(Method::POST, "/processImageForOcr", Some("tok-demo"), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
      out,
      json!({ "result": { "words": [{ "text": "Brot", "bounds": { "x": 1, "y": 2, "width": 40, "height": 20 } }] } })
    );
  }

  #[tokio::test]
  async fn ocr_surfaces_vision_api_errors_as_internal() {
    let base = fake_upstream(json!({ "responses": [{ "error": { "code": 3, "message": "Bad image data." } }] })).await;
    let mut st = state();
    st.vision = Vision::from_config(&VisionCfg { api_key: Some("k".into()), base_url: base, ..VisionCfg::default() });

    let body = r#"{"data":{"imageData":"aGVsbG8="}}"#;
    let (status, err) = call(&app(st), request(Method::POST, "/processImageForOcr", Some("tok-demo"), body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err["error"], json!({ "status": "INTERNAL", "message": "Vision API Error: Bad image data." }));
  }

  #[tokio::test]
  async fn definition_checks_auth_then_method_then_body() {
    let app = app(state());

    let (status, err) = call(&app, request(Method::GET, "/generateAiDefinition", None, "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(err["error"]["message"].is_string());

    let (status, err) = call(&app, request(Method::GET, "/generateAiDefinition", Some("tok-demo"), "")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(err["error"]["message"], "Method Not Allowed. Please use POST.");

    let (status, err) = call(&app, request(Method::POST, "/generateAiDefinition", Some("tok-demo"), r#"{"word":""}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["message"], "Bad Request. Please provide a 'word' in the JSON body.");

    let (status, err) = call(&app, request(Method::POST, "/generateAiDefinition", Some("tok-demo"), r#"{"word":"Brot"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(err["error"]["message"], "Internal server error: AI service not configured.");
  }

  #[tokio::test]
  async fn definition_builds_entry_from_gemini_output() {
    let text = "```json\n{\"definitions\":{\"en\":\"bread\"},\"synonyms\":[\"Laib\"],\"level\":\"A1\"}\n```";
    let base = fake_upstream(json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })).await;
    let mut st = state();
    st.gemini = Gemini::from_config(&GeminiCfg { api_key: Some("k".into()), base_url: base, ..GeminiCfg::default() });

    let (status, entry) = call(&app(st), request(Method::POST, "/generateAiDefinition", Some("tok-demo"), r#"{"word":"Brot"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(entry["id"].as_str().is_some_and(|id| id.starts_with("ai-brot-")));
    assert_eq!(entry["word"], "Brot");
    assert_eq!(entry["level"], "A1");
    assert_eq!(entry["sourceType"], "ai_added");
    assert_eq!(entry["topicId"], "ai_researched");
    assert_eq!(entry["definitions"]["en"], "bread");
    assert_eq!(entry["collocations"], json!([]));
  }

  #[tokio::test]
  async fn definition_maps_empty_and_unparseable_model_output() {
    for (text, expected) in [("", "AI response was empty."), ("no json here", "Invalid AI response format.")] {
      let base = fake_upstream(json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })).await;
      let mut st = state();
      st.gemini = Gemini::from_config(&GeminiCfg { api_key: Some("k".into()), base_url: base, ..GeminiCfg::default() });

      let (status, err) = call(&app(st), request(Method::POST, "/generateAiDefinition", Some("tok-demo"), r#"{"word":"Brot"}"#)).await;
      assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
      assert_eq!(err["error"]["message"], expected);
    }
  }
}

//! Error types for the store, identity layer, upstream APIs and the three handlers.
//!
//! Each handler keeps the error body shape its mobile client already parses:
//! - daily challenge: `{"error": "..."}`
//! - AI definition:   `{"error": {"message": "..."}}`
//! - OCR (callable):  `{"error": {"status": "...", "message": "..."}}`

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  /// A conditional create hit an existing document; nothing in the batch was applied.
  #[error("Document already exists: {0}")]
  AlreadyExists(String),

  #[error("Invalid document path: {0}")]
  InvalidPath(String),

  #[error("Malformed document {path}: {reason}")]
  Decode { path: String, reason: String },

  #[error("{0}")]
  Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
  #[error("missing bearer credential")]
  MissingCredential,

  #[error("invalid credential: {0}")]
  InvalidCredential(String),

  #[error("signing keys unavailable: {0}")]
  KeyFetch(String),
}

#[derive(Debug, Error)]
pub enum ChallengeError {
  #[error("Unauthorized. User must be authenticated.")]
  Unauthenticated,

  #[error("User profile not found.")]
  UserNotFound(String),

  #[error("No topics available to generate challenge.")]
  NoTopicsAvailable,

  #[error("No vocabulary items for topic '{title}'.")]
  NoVocabularyForTopic { topic_id: String, title: String },

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl ChallengeError {
  pub fn status(&self) -> StatusCode {
    match self {
      ChallengeError::Unauthenticated => StatusCode::UNAUTHORIZED,
      ChallengeError::UserNotFound(_) => StatusCode::NOT_FOUND,
      ChallengeError::NoTopicsAvailable
      | ChallengeError::NoVocabularyForTopic { .. }
      | ChallengeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ChallengeError {
  fn into_response(self) -> Response {
    (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
  }
}

/// Failures talking to Gemini or Cloud Vision.
#[derive(Debug, Error)]
pub enum UpstreamError {
  #[error("{service} request failed: {reason}")]
  Transport { service: &'static str, reason: String },

  #[error("{service} HTTP {status}: {body}")]
  Http { service: &'static str, status: u16, body: String },

  #[error("{service} returned an unreadable body: {reason}")]
  Body { service: &'static str, reason: String },
}

impl From<reqwest::Error> for StoreError {
  fn from(e: reqwest::Error) -> Self {
    StoreError::Unavailable(e.to_string())
  }
}

#[derive(Debug, Error)]
pub enum OcrError {
  #[error("The function must be called while authenticated.")]
  Unauthenticated,

  #[error("{0}")]
  InvalidArgument(String),

  #[error("{0}")]
  Internal(String),
}

impl OcrError {
  /// Callable-protocol status name.
  pub fn code(&self) -> &'static str {
    match self {
      OcrError::Unauthenticated => "UNAUTHENTICATED",
      OcrError::InvalidArgument(_) => "INVALID_ARGUMENT",
      OcrError::Internal(_) => "INTERNAL",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      OcrError::Unauthenticated => StatusCode::UNAUTHORIZED,
      OcrError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
      OcrError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for OcrError {
  fn into_response(self) -> Response {
    let body = json!({ "error": { "status": self.code(), "message": self.to_string() } });
    (self.status(), Json(body)).into_response()
  }
}

#[derive(Debug, Error)]
pub enum DefinitionError {
  #[error("Unauthorized. User must be authenticated.")]
  Unauthenticated,

  #[error("Method Not Allowed. Please use POST.")]
  MethodNotAllowed,

  #[error("Bad Request. Please provide a 'word' in the JSON body.")]
  BadRequest,

  #[error("Internal server error: AI service not configured.")]
  NotConfigured,

  #[error("Failed to generate AI definition.")]
  Upstream,

  #[error("AI response was empty.")]
  EmptyResponse,

  #[error("Invalid AI response format.")]
  InvalidFormat,
}

impl DefinitionError {
  pub fn status(&self) -> StatusCode {
    match self {
      DefinitionError::Unauthenticated => StatusCode::UNAUTHORIZED,
      DefinitionError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
      DefinitionError::BadRequest => StatusCode::BAD_REQUEST,
      DefinitionError::NotConfigured
      | DefinitionError::Upstream
      | DefinitionError::EmptyResponse
      | DefinitionError::InvalidFormat => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for DefinitionError {
  fn into_response(self) -> Response {
    (self.status(), Json(json!({ "error": { "message": self.to_string() } }))).into_response()
  }
}

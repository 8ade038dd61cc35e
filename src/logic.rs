//! Core behaviors behind the OCR and AI-definition handlers.
//!
//! Handlers stay thin: they authenticate, then hand the raw request body to
//! these functions, which validate input, call the upstream client and shape
//! the domain result. The daily challenge generator lives in `challenge.rs`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{error, info, instrument, warn};

use crate::domain::{AiVocabularyEntry, WordData};
use crate::error::{DefinitionError, OcrError};
use crate::protocol::{CallableIn, DefinitionIn, OcrIn};
use crate::state::AppState;
use crate::util::strip_data_url_prefix;
use crate::vision::Detection;

const IMAGE_DATA_REQUIRED: &str = "The function must be called with a valid 'imageData' string.";

/// Pull `data.imageData` out of a callable request body and decode it to bytes.
pub fn decode_ocr_request(body: &[u8]) -> Result<Vec<u8>, OcrError> {
  let req: CallableIn<OcrIn> = serde_json::from_slice(body)
    .map_err(|_| OcrError::InvalidArgument(IMAGE_DATA_REQUIRED.into()))?;
  let image_data = req
    .data
    .and_then(|d| d.image_data)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| OcrError::InvalidArgument(IMAGE_DATA_REQUIRED.into()))?;

  let payload = strip_data_url_prefix(&image_data).trim();
  let bytes = BASE64
    .decode(payload)
    .map_err(|e| OcrError::InvalidArgument(format!("imageData is not valid base64: {e}")))?;
  if bytes.is_empty() {
    return Err(OcrError::InvalidArgument(IMAGE_DATA_REQUIRED.into()));
  }
  Ok(bytes)
}

#[instrument(level = "info", skip(state, body), fields(%uid, body_len = body.len()))]
pub async fn ocr_words(state: &AppState, uid: &str, body: &[u8]) -> Result<Vec<WordData>, OcrError> {
  let image = decode_ocr_request(body).map_err(|e| {
    warn!(target: "ocr", %uid, error = %e, "Missing or invalid imageData");
    e
  })?;

  let Some(vision) = &state.vision else {
    error!(target: "ocr", "Vision client not configured");
    return Err(OcrError::Internal("Internal server error during image processing.".into()));
  };

  match vision.detect_words(&image).await {
    Ok(Detection::Words(words)) => {
      info!(target: "ocr", %uid, words = words.len(), "Extracted words");
      Ok(words)
    }
    Ok(Detection::ApiError(message)) => {
      error!(target: "ocr", %uid, %message, "Vision API returned an error");
      Err(OcrError::Internal(format!("Vision API Error: {message}")))
    }
    Err(e) => {
      error!(target: "ocr", %uid, error = %e, "Vision call failed");
      Err(OcrError::Internal(e.to_string()))
    }
  }
}

/// `{"word": "..."}` with a non-blank string, trimmed.
pub fn parse_definition_request(body: &[u8]) -> Result<String, DefinitionError> {
  let req: DefinitionIn = serde_json::from_slice(body).map_err(|_| DefinitionError::BadRequest)?;
  req
    .word
    .map(|w| w.trim().to_string())
    .filter(|w| !w.is_empty())
    .ok_or(DefinitionError::BadRequest)
}

#[instrument(level = "info", skip(state, body), fields(%uid, body_len = body.len()))]
pub async fn ai_definition(state: &AppState, uid: &str, body: &[u8]) -> Result<AiVocabularyEntry, DefinitionError> {
  let word = parse_definition_request(body).map_err(|e| {
    warn!(target: "definition", %uid, "Request without a usable 'word'");
    e
  })?;

  let Some(gemini) = &state.gemini else {
    error!(target: "definition", "Gemini client not configured");
    return Err(DefinitionError::NotConfigured);
  };

  let entry = gemini.define_word(&state.prompts, &word).await?;
  info!(target: "definition", %uid, id = %entry.id, level = %entry.level, "AI definition generated");
  Ok(entry)
}

//! Cloud Vision client: TEXT_DETECTION on one image, reduced to word boxes.

use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::VisionCfg;
use crate::domain::{Bounds, WordData};
use crate::error::UpstreamError;
use crate::gemini::extract_google_error;
use crate::util::trunc_for_log;

const SERVICE: &str = "Vision";

#[derive(Clone)]
pub struct Vision {
  client: reqwest::Client,
  api_key: String,
  pub base_url: String,
}

/// Outcome of one annotate call: either words or the API's per-image error.
#[derive(Debug)]
pub enum Detection {
  Words(Vec<WordData>),
  ApiError(String),
}

impl Vision {
  pub fn from_config(cfg: &VisionCfg) -> Option<Self> {
    let api_key = cfg.api_key.clone().filter(|k| !k.is_empty())?;
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(cfg.timeout_secs))
      .build()
      .ok()?;
    Some(Self { client, api_key, base_url: cfg.base_url.trim_end_matches('/').to_string() })
  }

  #[instrument(level = "info", skip(self, image), fields(image_bytes = image.len()))]
  pub async fn detect_words(&self, image: &[u8]) -> Result<Detection, UpstreamError> {
    let url = format!("{}/images:annotate", self.base_url);
    let body = AnnotateRequest {
      requests: vec![ImageRequest {
        image: ImageContent { content: BASE64.encode(image) },
        features: vec![Feature { r#type: "TEXT_DETECTION" }],
      }],
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "vocab-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&body).send().await
      .map_err(|e| UpstreamError::Transport { service: SERVICE, reason: e.to_string() })?;

    if !res.status().is_success() {
      let status = res.status().as_u16();
      let text = res.text().await.unwrap_or_default();
      let msg = extract_google_error(&text).unwrap_or(text);
      return Err(UpstreamError::Http { service: SERVICE, status, body: trunc_for_log(&msg, 300) });
    }

    let parsed: AnnotateResponse = res.json().await
      .map_err(|e| UpstreamError::Body { service: SERVICE, reason: e.to_string() })?;
    info!(target: "ocr", elapsed = ?start.elapsed(), "Vision response received");
    Ok(detection_from_response(parsed))
  }
}

fn detection_from_response(parsed: AnnotateResponse) -> Detection {
  let Some(first) = parsed.responses.into_iter().next() else {
    return Detection::Words(Vec::new());
  };
  if let Some(err) = first.error {
    return Detection::ApiError(err.message);
  }
  Detection::Words(words_from_annotations(&first.text_annotations))
}

/// Annotation 0 is the whole text block; the rest are single words.
fn words_from_annotations(annotations: &[TextAnnotation]) -> Vec<WordData> {
  annotations
    .iter()
    .skip(1)
    .filter_map(|a| {
      let text = a.description.as_deref().filter(|d| !d.is_empty())?;
      let vertices = &a.bounding_poly.as_ref()?.vertices;
      bounds_of(vertices).map(|bounds| WordData { text: text.to_string(), bounds })
    })
    .collect()
}

/// Axis-aligned box around a polygon; missing coordinates count as 0.
fn bounds_of(vertices: &[Vertex]) -> Option<Bounds> {
  if vertices.is_empty() {
    return None;
  }
  let xs = vertices.iter().map(|v| v.x.unwrap_or(0));
  let ys = vertices.iter().map(|v| v.y.unwrap_or(0));
  let (min_x, max_x) = (xs.clone().min()?, xs.max()?);
  let (min_y, max_y) = (ys.clone().min()?, ys.max()?);
  Some(Bounds { x: min_x, y: min_y, width: max_x.saturating_sub(min_x), height: max_y.saturating_sub(min_y) })
}

// --- images:annotate DTOs ---

#[derive(Serialize)]
struct AnnotateRequest { requests: Vec<ImageRequest> }
#[derive(Serialize)]
struct ImageRequest { image: ImageContent, features: Vec<Feature> }
#[derive(Serialize)]
struct ImageContent { content: String }
#[derive(Serialize)]
struct Feature { #[serde(rename = "type")] r#type: &'static str }

#[derive(Deserialize)]
struct AnnotateResponse { #[serde(default)] responses: Vec<ImageResponse> }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
  #[serde(default)] text_annotations: Vec<TextAnnotation>,
  #[serde(default)] error: Option<ApiStatus>,
}
#[derive(Deserialize)]
struct ApiStatus { #[serde(default)] message: String }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextAnnotation {
  #[serde(default)] description: Option<String>,
  #[serde(default)] bounding_poly: Option<BoundingPoly>,
}
#[derive(Deserialize)]
struct BoundingPoly { #[serde(default)] vertices: Vec<Vertex> }
#[derive(Deserialize)]
struct Vertex {
  #[serde(default)] x: Option<i64>,
  #[serde(default)] y: Option<i64>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(json: &str) -> Detection {
    detection_from_response(serde_json::from_str(json).expect("response"))
  }

  #[test]
  fn full_text_block_is_skipped_and_boxes_are_computed() {
    let d = parse(r#"{"responses":[{"textAnnotations":[
      {"description":"Guten Tag","boundingPoly":{"vertices":[{"x":0,"y":0},{"x":100,"y":0},{"x":100,"y":20},{"x":0,"y":20}]}},
      {"description":"Guten","boundingPoly":{"vertices":[{"x":2,"y":3},{"x":40,"y":3},{"x":40,"y":19},{"x":2,"y":19}]}},
      {"description":"Tag","boundingPoly":{"vertices":[{"y":4},{"x":90,"y":4},{"x":90,"y":18},{"x":50}]}}
    ]}]}"#);

    let words = match d {
      Detection::Words(w) => w,
      other => panic!("unexpected {other:?}"),
    };
    assert_eq!(words.len(), 2);
    assert_eq!(words[0].text, "Guten");
    assert_eq!(words[0].bounds, Bounds { x: 2, y: 3, width: 38, height: 16 });
    // missing x/y count as 0
    assert_eq!(words[1].bounds, Bounds { x: 0, y: 0, width: 90, height: 18 });
  }

  #[test]
  fn annotations_without_text_or_polygon_are_dropped() {
    let d = parse(r#"{"responses":[{"textAnnotations":[
      {"description":"all"},
      {"description":"","boundingPoly":{"vertices":[{"x":1,"y":1}]}},
      {"description":"nobox"},
      {"description":"empty","boundingPoly":{"vertices":[]}}
    ]}]}"#);
    assert!(matches!(d, Detection::Words(w) if w.is_empty()));
  }

  #[test]
  fn extreme_coordinates_saturate_instead_of_overflowing() {
    let d = parse(r#"{"responses":[{"textAnnotations":[
      {"description":"all"},
      {"description":"weit","boundingPoly":{"vertices":[
        {"x":-9223372036854775808,"y":-9223372036854775808},
        {"x":9223372036854775807,"y":9223372036854775807}
      ]}}
    ]}]}"#);
    let words = match d {
      Detection::Words(w) => w,
      other => panic!("unexpected {other:?}"),
    };
    assert_eq!(words[0].bounds, Bounds { x: i64::MIN, y: i64::MIN, width: i64::MAX, height: i64::MAX });
  }

  #[test]
  fn no_annotations_means_no_words() {
    assert!(matches!(parse(r#"{"responses":[{}]}"#), Detection::Words(w) if w.is_empty()));
    assert!(matches!(parse(r#"{}"#), Detection::Words(w) if w.is_empty()));
  }

  #[test]
  fn per_image_error_is_surfaced() {
    let d = parse(r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#);
    assert!(matches!(d, Detection::ApiError(m) if m == "Bad image data."));
  }
}

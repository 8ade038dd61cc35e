//! Public request/response bodies for the HTTP endpoints (serde ready).
//! Field names match what the mobile client already sends and parses.

use serde::{Deserialize, Serialize};

use crate::domain::{DailyChallenge, WordData};

//
// Daily challenge
//

#[derive(Debug, Serialize)]
pub struct ChallengeOut {
    pub message: &'static str,
    pub challenge: DailyChallenge,
}

pub const CHALLENGE_EXISTING: &str = "Daily challenge already exists for today.";
pub const CHALLENGE_CREATED: &str = "Daily challenge generated successfully.";

//
// OCR (callable protocol: `{"data": ...}` in, `{"result": ...}` out)
//

#[derive(Debug, Deserialize)]
pub struct CallableIn<T> {
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct CallableOut<T> {
    pub result: T,
}

/// Clients also send `mimeType`; Vision detects the format itself, so it is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrIn {
    pub image_data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OcrOut {
    pub words: Vec<WordData>,
}

//
// AI definition
//

#[derive(Debug, Deserialize)]
pub struct DefinitionIn {
    pub word: Option<String>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

//! Domain models used by the backend: users, catalog entities, daily challenges,
//! OCR words and AI-generated vocabulary entries.
//!
//! Everything that crosses the store or HTTP boundary is an explicit record with
//! camelCase wire names. Missing optional fields default; missing required fields
//! fail deserialization instead of being silently spread in.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Calendar-day key, always rendered `YYYY-MM-DD`.
///
/// "Today" is computed in UTC so every instance agrees on the day boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateKey(String);

impl DateKey {
  pub fn for_date(date: NaiveDate) -> Self {
    DateKey(date.format("%Y-%m-%d").to_string())
  }

  pub fn today_utc() -> Self {
    Self::for_date(Utc::now().date_naive())
  }

  /// Accepts only canonical `YYYY-MM-DD` strings.
  pub fn parse(s: &str) -> Option<Self> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    let key = Self::for_date(date);
    if key.0 == s { Some(key) } else { None }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DateKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// The slice of `users/{uid}` this service cares about.
/// Other profile fields are owned by the app and left untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
  pub id: String,
  /// date key -> challenge id. Other writers share this map, so it stays
  /// untyped and only the entry for the requested day is interpreted.
  #[serde(default)]
  pub daily_challenge_completion: Value,
}

impl UserRecord {
  /// Raw index entry for `day`, if the map has one.
  pub fn index_entry(&self, day: &DateKey) -> Option<&Value> {
    self.daily_challenge_completion.get(day.as_str())
  }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
  pub id: String,
  pub title_en: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyItem {
  pub id: String,
  pub word: String,
  pub topic_id: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
  #[default]
  Open,
  Completed,
  Failed,
}

/// One per (user, day); stored at `users/{uid}/daily_challenges/{YYYY-MM-DD}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyChallenge {
  pub id: String,
  pub user_id: String,
  pub title: String,
  pub description: String,
  pub target_word: String,
  pub target_topic_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_topic_title_en: Option<String>,
  pub target_vocabulary_item_id: String,
  #[serde(default)]
  pub status: ChallengeStatus,
  pub date_created: String,
}

impl DailyChallenge {
  /// Build the open challenge for `today` from the sampled topic and word.
  pub fn open_for(user_id: &str, today: &DateKey, topic: &Topic, item: &VocabularyItem) -> Self {
    DailyChallenge {
      id: today.to_string(),
      user_id: user_id.to_string(),
      title: format!("Daily Challenge: {}", topic.title_en),
      description: format!(
        "Today's task: Find the word \"{}\" related to {}.",
        item.word, topic.title_en
      ),
      target_word: item.word.clone(),
      target_topic_id: topic.id.clone(),
      target_topic_title_en: Some(topic.title_en.clone()),
      target_vocabulary_item_id: item.id.clone(),
      status: ChallengeStatus::Open,
      date_created: today.to_string(),
    }
  }
}

/// Pixel-space rectangle around one detected word.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Bounds {
  pub x: i64,
  pub y: i64,
  pub width: i64,
  pub height: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordData {
  pub text: String,
  pub bounds: Bounds,
}

/// AI-researched vocabulary entry, shaped like the app's own vocabulary items.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiVocabularyEntry {
  pub id: String,
  pub word: String,
  /// language code -> definition
  pub definitions: BTreeMap<String, String>,
  pub synonyms: Vec<String>,
  pub collocations: Vec<String>,
  /// language code -> sentences
  pub example_sentences: BTreeMap<String, Vec<String>>,
  pub level: String,
  pub source_type: String,
  pub topic_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub grammar_hint: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contextual_text: Option<String>,
}

//! Seed data for the memory store.
//!
//! Guarantees the service is usable locally without a catalog file or Firestore.

use serde_json::{json, Map, Value};

use crate::config::CatalogCfg;
use crate::domain::{Topic, VocabularyItem};
use crate::error::StoreError;
use crate::store::{encode, DocPath, TOPICS, USERS, VOCABULARY};

/// Minimal built-in catalog: a few German topics and words, one demo user.
pub fn seed_catalog() -> CatalogCfg {
  let topic = |id: &str, title: &str| Topic { id: id.into(), title_en: title.into() };
  let word = |id: &str, w: &str, t: &str| VocabularyItem { id: id.into(), word: w.into(), topic_id: t.into() };

  CatalogCfg {
    topics: vec![
      topic("food", "Food"),
      topic("travel", "Travel"),
      topic("home", "Home"),
    ],
    vocabulary: vec![
      word("food-brot", "Brot", "food"),
      word("food-kaese", "Käse", "food"),
      word("food-apfel", "Apfel", "food"),
      word("travel-bahnhof", "Bahnhof", "travel"),
      word("travel-koffer", "Koffer", "travel"),
      word("home-kueche", "Küche", "home"),
      word("home-fenster", "Fenster", "home"),
    ],
    users: vec!["demo".into()],
  }
}

/// Turn a catalog into store documents (`topics/*`, `vocabulary/*`, `users/*`).
pub fn catalog_documents(cat: &CatalogCfg) -> Result<Vec<(DocPath, Map<String, Value>)>, StoreError> {
  let mut docs = Vec::with_capacity(cat.topics.len() + cat.vocabulary.len() + cat.users.len());
  for t in &cat.topics {
    docs.push((DocPath::new(TOPICS, &t.id)?, encode(t)?));
  }
  for v in &cat.vocabulary {
    docs.push((DocPath::new(VOCABULARY, &v.id)?, encode(v)?));
  }
  for u in &cat.users {
    let mut fields = Map::new();
    fields.insert("dailyChallengeCompletion".into(), json!({}));
    docs.push((DocPath::new(USERS, u)?, fields));
  }
  Ok(docs)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_seed_word_points_at_a_seed_topic() {
    let cat = seed_catalog();
    for v in &cat.vocabulary {
      assert!(cat.topics.iter().any(|t| t.id == v.topic_id), "orphan word {}", v.id);
    }
    for t in &cat.topics {
      assert!(cat.vocabulary.iter().any(|v| v.topic_id == t.id), "empty topic {}", t.id);
    }
  }

  #[test]
  fn catalog_documents_are_addressed_by_id() {
    let docs = catalog_documents(&seed_catalog()).expect("docs");
    assert!(docs.iter().any(|(p, f)| p.as_str() == "topics/food" && f["titleEn"] == "Food"));
    assert!(docs.iter().any(|(p, f)| p.as_str() == "vocabulary/food-brot" && f["topicId"] == "food"));
    assert!(docs.iter().any(|(p, _)| p.as_str() == "users/demo"));
  }
}

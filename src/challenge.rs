//! Daily challenge generation: at most one challenge per user per UTC day.
//!
//! Flow:
//! 1) Read `users/{uid}`; the `dailyChallengeCompletion` map indexes date key -> challenge id.
//! 2) If today's entry points at an existing document, return it untouched.
//! 3) Otherwise sample a random topic, then a random word of that topic.
//! 4) Commit atomically: create `users/{uid}/daily_challenges/{date}` (only if
//!    absent) + merge the index entry into the user document.
//! 5) If the create loses a race, the batch applied nothing: re-read and return
//!    the winner's challenge.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::domain::{DailyChallenge, DateKey, Topic, UserRecord, VocabularyItem};
use crate::error::{ChallengeError, StoreError};
use crate::store::{encode, DocPath, Document, DocumentStore, Write, DAILY_CHALLENGES, TOPICS, USERS, VOCABULARY};

const INDEX_FIELD: &str = "dailyChallengeCompletion";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChallengeOutcome {
  /// Already there for today (including a lost creation race). No writes by us.
  Existing(DailyChallenge),
  /// Created by this call.
  Created(DailyChallenge),
}

impl ChallengeOutcome {
  pub fn challenge(&self) -> &DailyChallenge {
    match self {
      ChallengeOutcome::Existing(c) | ChallengeOutcome::Created(c) => c,
    }
  }
}

#[instrument(level = "info", skip(store, rng), fields(backend = store.backend(), %today))]
pub async fn generate_daily_challenge<R: Rng + Send>(
  store: &dyn DocumentStore,
  user_id: &str,
  today: &DateKey,
  rng: &mut R,
) -> Result<ChallengeOutcome, ChallengeError> {
  if user_id.trim().is_empty() {
    return Err(ChallengeError::Unauthenticated);
  }

  let user_path = DocPath::new(USERS, user_id)?;
  let today_path = user_path.child(DAILY_CHALLENGES, today.as_str())?;

  let user: UserRecord = match store.get(&user_path).await? {
    Some(doc) => doc.decode(USERS)?,
    None => {
      error!(target: "challenge", %user_id, "User document not found");
      return Err(ChallengeError::UserNotFound(user_id.to_string()));
    }
  };

  let indexed_id = match user.index_entry(today) {
    Some(Value::String(id)) => Some(id.as_str()),
    Some(other) => {
      warn!(target: "challenge", %user_id, entry = %other, anomaly = "malformed_index", "Index entry for today is not a challenge id; regenerating");
      None
    }
    None => None,
  };

  if let Some(existing_id) = indexed_id {
    if let Some(existing) = read_indexed(store, &user_path, existing_id).await? {
      info!(target: "challenge", %user_id, id = %existing.id, "Daily challenge already exists; returning it");
      return Ok(ChallengeOutcome::Existing(existing));
    }
    warn!(
      target: "challenge",
      %user_id, %existing_id, anomaly = "dangling_index",
      "Index names a challenge that does not exist; regenerating"
    );
  }

  let (topic, item) = pick_candidates(store, rng).await?;
  let challenge = DailyChallenge::open_for(user_id, today, &topic, &item);

  let writes = vec![
    Write::Create { path: today_path.clone(), fields: encode(&challenge)? },
    index_write(&user_path, today, &challenge.id),
  ];

  match store.commit(writes).await {
    Ok(()) => {
      info!(target: "challenge", %user_id, id = %challenge.id, topic = %topic.id, word_id = %item.id, "Daily challenge generated");
      Ok(ChallengeOutcome::Created(challenge))
    }
    Err(StoreError::AlreadyExists(_)) => {
      let winner = match store.get(&today_path).await? {
        Some(doc) => doc.decode::<DailyChallenge>(today_path.collection())?,
        None => {
          return Err(StoreError::Unavailable(format!("{today_path} was created concurrently but cannot be read")).into());
        }
      };
      info!(target: "challenge", %user_id, id = %winner.id, "Lost creation race; returning the stored challenge");

      // The winner indexed its own write; only a document created outside this
      // flow can be left unindexed.
      if indexed_id != Some(winner.id.as_str()) {
        store.commit(vec![index_write(&user_path, today, &winner.id)]).await?;
      }
      Ok(ChallengeOutcome::Existing(winner))
    }
    Err(e) => Err(e.into()),
  }
}

/// Read the challenge an index entry points at. Challenge ids are date keys;
/// anything else counts as missing.
async fn read_indexed(
  store: &dyn DocumentStore,
  user_path: &DocPath,
  challenge_id: &str,
) -> Result<Option<DailyChallenge>, StoreError> {
  let Some(key) = DateKey::parse(challenge_id) else {
    return Ok(None);
  };
  let path = user_path.child(DAILY_CHALLENGES, key.as_str())?;
  match store.get(&path).await? {
    Some(doc) => doc.decode(path.collection()).map(Some),
    None => Ok(None),
  }
}

fn index_write(user_path: &DocPath, today: &DateKey, challenge_id: &str) -> Write {
  let mut entry = Map::new();
  entry.insert(today.to_string(), Value::String(challenge_id.to_string()));
  let mut fields = Map::new();
  fields.insert(INDEX_FIELD.into(), Value::Object(entry));
  Write::Set { path: user_path.clone(), fields, merge: true }
}

/// Uniform topic, then a uniform word among that topic's vocabulary.
/// No second topic is tried when the first has no words.
async fn pick_candidates<R: Rng + Send>(
  store: &dyn DocumentStore,
  rng: &mut R,
) -> Result<(Topic, VocabularyItem), ChallengeError> {
  let topics: Vec<Topic> = decode_all(store.list(TOPICS).await?, TOPICS);
  let topic = match topics.choose(rng) {
    Some(t) => t.clone(),
    None => {
      error!(target: "challenge", "No topics found");
      return Err(ChallengeError::NoTopicsAvailable);
    }
  };

  let docs = store.query_eq(VOCABULARY, "topicId", &Value::String(topic.id.clone())).await?;
  let words: Vec<VocabularyItem> = decode_all::<VocabularyItem>(docs, VOCABULARY)
    .into_iter()
    .filter(|v| v.topic_id == topic.id)
    .collect();

  match words.choose(rng) {
    Some(w) => Ok((topic, w.clone())),
    None => {
      error!(target: "challenge", topic = %topic.id, "No vocabulary items for topic");
      Err(ChallengeError::NoVocabularyForTopic { topic_id: topic.id, title: topic.title_en })
    }
  }
}

/// Decode catalog documents, skipping (and logging) malformed ones.
fn decode_all<T: DeserializeOwned>(docs: Vec<Document>, collection: &str) -> Vec<T> {
  docs
    .into_iter()
    .filter_map(|d| match d.decode::<T>(collection) {
      Ok(v) => Some(v),
      Err(e) => {
        warn!(target: "challenge", %collection, id = %d.id, error = %e, "Skipping malformed catalog document");
        None
      }
    })
    .collect()
}

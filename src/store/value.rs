//! Firestore REST value codec: plain JSON <-> Firestore typed values.
//!
//! Firestore wraps every value in a one-key object naming its type, e.g.
//! `{"stringValue": "Brot"}` or `{"mapValue": {"fields": {...}}}`. 64-bit
//! integers travel as decimal strings.

use serde_json::{json, Map, Value};

pub fn encode_value(v: &Value) -> Value {
  match v {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        json!({ "integerValue": i.to_string() })
      } else if let Some(u) = n.as_u64() {
        json!({ "integerValue": u.to_string() })
      } else {
        json!({ "doubleValue": n.as_f64().unwrap_or_default() })
      }
    }
    Value::String(s) => json!({ "stringValue": s }),
    Value::Array(items) => {
      let values: Vec<Value> = items.iter().map(encode_value).collect();
      json!({ "arrayValue": { "values": values } })
    }
    Value::Object(m) => json!({ "mapValue": { "fields": encode_fields(m) } }),
  }
}

pub fn encode_fields(m: &Map<String, Value>) -> Map<String, Value> {
  m.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect()
}

pub fn decode_value(v: &Value) -> Result<Value, String> {
  let obj = v.as_object().ok_or_else(|| format!("expected typed value object, got {v}"))?;
  let (kind, inner) = obj.iter().next().ok_or("empty typed value")?;

  match kind.as_str() {
    "nullValue" => Ok(Value::Null),
    "booleanValue" => inner.as_bool().map(Value::Bool).ok_or_else(|| "booleanValue is not a bool".into()),
    "integerValue" => {
      let i = match inner {
        Value::String(s) => s.parse::<i64>().map_err(|e| format!("integerValue {s:?}: {e}"))?,
        Value::Number(n) => n.as_i64().ok_or("integerValue out of range")?,
        _ => return Err("integerValue is not a string".into()),
      };
      Ok(Value::Number(i.into()))
    }
    "doubleValue" => match inner {
      Value::Number(n) => Ok(Value::Number(n.clone())),
      // NaN / Infinity arrive as strings and have no JSON form.
      Value::String(_) => Ok(Value::Null),
      _ => Err("doubleValue is not a number".into()),
    },
    "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner
      .as_str()
      .map(|s| Value::String(s.to_string()))
      .ok_or_else(|| format!("{kind} is not a string")),
    "geoPointValue" => Ok(inner.clone()),
    "arrayValue" => {
      let values = match inner.get("values") {
        Some(Value::Array(items)) => items.iter().map(decode_value).collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
      };
      Ok(Value::Array(values))
    }
    "mapValue" => {
      let fields = match inner.get("fields") {
        Some(Value::Object(f)) => decode_fields(f)?,
        _ => Map::new(),
      };
      Ok(Value::Object(fields))
    }
    other => Err(format!("unsupported Firestore value type {other}")),
  }
}

pub fn decode_fields(m: &Map<String, Value>) -> Result<Map<String, Value>, String> {
  m.iter().map(|(k, v)| decode_value(v).map(|d| (k.clone(), d))).collect()
}

/// Quote one field-path segment. Simple identifiers pass through; anything
/// else (date keys contain `-`) is wrapped in backticks.
pub fn quote_segment(seg: &str) -> String {
  let mut chars = seg.chars();
  let simple = match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
    _ => false,
  };
  if simple {
    seg.to_string()
  } else {
    format!("`{}`", seg.replace('\\', "\\\\").replace('`', "\\`"))
  }
}

/// Leaf field paths of a merge patch, used as the commit `updateMask`, so a
/// merge only touches the keys present in the patch.
pub fn merge_mask(m: &Map<String, Value>) -> Vec<String> {
  let mut out = Vec::new();
  collect_leaves(m, "", &mut out);
  out
}

fn collect_leaves(m: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
  for (k, v) in m {
    let path = if prefix.is_empty() {
      quote_segment(k)
    } else {
      format!("{prefix}.{}", quote_segment(k))
    };
    match v {
      Value::Object(inner) if !inner.is_empty() => collect_leaves(inner, &path, out),
      _ => out.push(path),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn challenge_like_document_survives_the_codec() {
    let doc = json!({
      "id": "2024-05-01",
      "status": "open",
      "attempts": 3,
      "score": 0.5,
      "tags": ["a", "b"],
      "meta": { "nested": true, "none": null }
    });
    let m = doc.as_object().expect("obj");
    let encoded = encode_fields(m);
    assert_eq!(encoded["attempts"], json!({ "integerValue": "3" }));
    assert_eq!(encoded["status"], json!({ "stringValue": "open" }));

    let decoded = decode_fields(&encoded).expect("decode");
    assert_eq!(Value::Object(decoded), doc);
  }

  #[test]
  fn empty_array_and_map_decode_without_inner_keys() {
    assert_eq!(decode_value(&json!({ "arrayValue": {} })).expect("arr"), json!([]));
    assert_eq!(decode_value(&json!({ "mapValue": {} })).expect("map"), json!({}));
    assert_eq!(decode_value(&json!({ "timestampValue": "2024-05-01T00:00:00Z" })).expect("ts"), json!("2024-05-01T00:00:00Z"));
  }

  #[test]
  fn unknown_type_is_an_error() {
    assert!(decode_value(&json!({ "weirdValue": 1 })).is_err());
  }

  #[test]
  fn merge_mask_quotes_date_keys() {
    let patch = json!({ "dailyChallengeCompletion": { "2024-05-01": "2024-05-01" } });
    let mask = merge_mask(patch.as_object().expect("obj"));
    assert_eq!(mask, vec!["dailyChallengeCompletion.`2024-05-01`".to_string()]);
    assert_eq!(quote_segment("plain_name1"), "plain_name1");
    assert_eq!(quote_segment("we`ird"), "`we\\`ird`");
  }
}

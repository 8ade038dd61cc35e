//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Drop a `data:<mime>;base64,` prefix if the client sent a data URL.
pub fn strip_data_url_prefix(s: &str) -> &str {
  if s.starts_with("data:") {
    match s.find(',') {
      Some(i) => &s[i + 1..],
      None => s,
    }
  } else {
    s
  }
}

/// Pull the first JSON object out of a model completion.
///
/// Models often wrap the object in ```json fences or add a sentence around it,
/// so we take the span from the first `{` to its matching `}` (string-aware).
pub fn extract_json_object(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let mut depth = 0usize;
  let mut in_str = false;
  let mut escaped = false;

  for (i, ch) in text[start..].char_indices() {
    if in_str {
      if escaped { escaped = false; }
      else if ch == '\\' { escaped = true; }
      else if ch == '"' { in_str = false; }
      continue;
    }
    match ch {
      '"' => in_str = true,
      '{' => depth += 1,
      '}' => {
        depth -= 1;
        if depth == 0 {
          return Some(&text[start..start + i + 1]);
        }
      }
      _ => {}
    }
  }
  None
}

/// Slug used in generated ids: lowercase, whitespace runs collapsed to `-`.
pub fn slugify_word(word: &str) -> String {
  word.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_all_keys() {
    let out = fill_template("word={word}; again {word}", &[("word", "Haus")]);
    assert_eq!(out, "word=Haus; again Haus");
  }

  #[test]
  fn data_url_prefix_is_stripped() {
    assert_eq!(strip_data_url_prefix("data:image/png;base64,QUJD"), "QUJD");
    assert_eq!(strip_data_url_prefix("QUJD"), "QUJD");
  }

  #[test]
  fn json_object_found_inside_fences() {
    let text = "Here you go:\n```json\n{\"a\": {\"b\": \"}\"}, \"c\": 1}\n```\nDone.";
    assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": \"}\"}, \"c\": 1}"));
    assert_eq!(extract_json_object("no json here"), None);
    assert_eq!(extract_json_object("{ unterminated"), None);
  }

  #[test]
  fn truncation_respects_char_boundaries() {
    let s = "Größenwahn";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with("Gr"));
    assert!(t.contains("bytes total"));
    assert_eq!(trunc_for_log("kurz", 10), "kurz");
  }

  #[test]
  fn slug_collapses_whitespace() {
    assert_eq!(slugify_word("  Guten   Morgen "), "guten-morgen");
  }
}

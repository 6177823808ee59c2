use serde::{Deserialize, Serialize};

/// A normalized news article as produced by the `parse_articles` steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Article {
  pub title: String,
  pub author: String,
  pub link: String,
  pub excerpt: String,
  pub published_time: String,
}

/// Cap a raw excerpt at 100 characters and mark the cut with an ellipsis.
/// Empty excerpts stay empty.
pub fn truncate_excerpt(excerpt: &str) -> String {
  if excerpt.is_empty() {
    return String::new();
  }
  let truncated: String = excerpt.chars().take(100).collect();
  format!("{truncated}...")
}

/// Read a string field from a raw article record, defaulting to empty.
pub(crate) fn str_field(record: &serde_json::Value, key: &str) -> String {
  record
    .get(key)
    .and_then(|v| v.as_str())
    .unwrap_or("")
    .to_string()
}

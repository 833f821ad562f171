//! Serde types matching the backend's REST and storage responses.
//!
//! Row payloads deserialize straight into the domain types; these cover the
//! envelopes around them.

use serde::{Deserialize, Serialize};

/// Error body returned by the row API and the object store
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub code: Option<serde_json::Value>,
  #[serde(default)]
  pub details: Option<String>,
  #[serde(default)]
  pub hint: Option<String>,
}

impl ApiErrorBody {
  /// Human-readable summary, falling back to the raw body.
  pub fn describe(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
      Ok(parsed) => {
        let mut text = parsed
          .message
          .or(parsed.error)
          .unwrap_or_else(|| body.trim().to_string());
        if let Some(details) = parsed.details.filter(|d| !d.is_empty()) {
          text.push_str(&format!(" ({})", details));
        }
        if let Some(hint) = parsed.hint.filter(|h| !h.is_empty()) {
          text.push_str(&format!(" hint: {}", hint));
        }
        text
      }
      Err(_) => body.trim().to_string(),
    }
  }
}

/// Body of an object-store removal request
#[derive(Debug, Serialize)]
pub struct ApiRemoveObjects<'a> {
  pub prefixes: &'a [String],
}

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenerateRequest {
  pub prompt: Option<String>,
}

impl GenerateRequest {
  /// Reads `prompt` from a loosely typed body. Falsy values (`null`, `false`,
  /// `0`) and non-object bodies count as a missing prompt; other scalars are
  /// used as their JSON text.
  pub fn from_json(body: &Value) -> Self {
    let prompt = match body.get("prompt") {
      None | Some(Value::Null) | Some(Value::Bool(false)) => None,
      Some(Value::Number(n)) if n.as_f64() == Some(0.0) => None,
      Some(Value::String(text)) => Some(text.clone()),
      Some(other) => Some(other.to_string()),
    };
    Self { prompt }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
  pub image_url: String,
  pub prompt: String,
  pub service: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
  pub image_url: Option<String>,
}

/// Non-empty user prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
  pub fn parse(raw: Option<&str>) -> Result<Self, DispatchError> {
    match raw {
      Some(text) if !text.is_empty() => Ok(Self(text.to_string())),
      _ => Err(DispatchError::InvalidInput),
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Length in UTF-16 code units, the unit browsers count prompt length in.
  pub fn utf16_len(&self) -> usize {
    self.0.encode_utf16().count()
  }

  pub fn prefix(&self, limit: usize) -> String {
    self.0.chars().take(limit).collect()
  }
}

impl fmt::Display for Prompt {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageReference {
  Remote(String),
  DataUri(String),
  LocalPath(String),
}

impl ImageReference {
  pub fn classify(raw: impl Into<String>) -> Self {
    let raw = raw.into();
    let lowered = raw.trim_start().to_ascii_lowercase();
    if lowered.starts_with("data:") {
      ImageReference::DataUri(raw)
    } else if lowered.starts_with("http://") || lowered.starts_with("https://") {
      ImageReference::Remote(raw)
    } else {
      ImageReference::LocalPath(raw)
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      ImageReference::Remote(s) | ImageReference::DataUri(s) | ImageReference::LocalPath(s) => s,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      ImageReference::Remote(_) => "url",
      ImageReference::DataUri(_) => "data_uri",
      ImageReference::LocalPath(_) => "local_path",
    }
  }

  pub fn into_string(self) -> String {
    match self {
      ImageReference::Remote(s) | ImageReference::DataUri(s) | ImageReference::LocalPath(s) => s,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchResult {
  pub image: ImageReference,
  pub prompt: String,
  pub strategy: String,
  pub error: Option<String>,
}

impl From<DispatchResult> for GenerateResponse {
  fn from(result: DispatchResult) -> Self {
    GenerateResponse {
      image_url: result.image.into_string(),
      prompt: result.prompt,
      service: result.strategy,
      error: result.error,
    }
  }
}

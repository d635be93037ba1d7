use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};

use crate::config::StrategyConfig;
use crate::error::StrategyError;
use crate::models::{ImageReference, Prompt};
use crate::upstream::Upstream;

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[async_trait]
pub trait ImageStrategy: Send + Sync {
  fn name(&self) -> &str;

  /// Whether the dispatcher must HEAD-check the returned reference.
  fn verifies(&self) -> bool;

  async fn attempt(&self, prompt: &Prompt, upstream: &dyn Upstream) -> Result<ImageReference, StrategyError>;
}

pub fn build_strategies(configs: &[StrategyConfig]) -> Vec<Box<dyn ImageStrategy>> {
  configs
    .iter()
    .map(|config| -> Box<dyn ImageStrategy> {
      match config.clone() {
        StrategyConfig::Generative {
          name,
          label,
          endpoint,
          width,
          height,
          model,
          user_agent,
          accept,
          verify,
        } => Box::new(GenerativeStrategy {
          name,
          label,
          endpoint,
          width,
          height,
          model,
          user_agent,
          accept,
          verify,
        }),
        StrategyConfig::SeededPhoto {
          name,
          endpoint,
          width,
          height,
          query,
          verify,
        } => Box::new(SeededPhotoStrategy {
          name,
          endpoint,
          width,
          height,
          query,
          verify,
        }),
        StrategyConfig::Placeholder {
          name,
          endpoint,
          width,
          height,
          palette,
          text_color,
          text_limit,
          verify,
        } => Box::new(PlaceholderStrategy {
          name,
          endpoint,
          width,
          height,
          palette,
          text_color,
          text_limit,
          verify,
        }),
      }
    })
    .collect()
}

/// 32-bit signed polynomial rolling hash (`h = h * 31 + unit`) over UTF-16 code units.
pub fn prompt_hash(text: &str) -> i32 {
  text
    .encode_utf16()
    .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

pub fn prompt_seed(text: &str) -> u32 {
  (i64::from(prompt_hash(text)).abs() % 1000) as u32
}

/// Percent-encodes a URL component, leaving `!'()*` as browsers'
/// `encodeURIComponent` does. `%` is always escaped, so the restored
/// sequences can only come from those characters.
pub fn encode_component(text: &str) -> String {
  urlencoding::encode(text)
    .replace("%21", "!")
    .replace("%27", "'")
    .replace("%28", "(")
    .replace("%29", ")")
    .replace("%2A", "*")
}

fn random_seed() -> u32 {
  rand::thread_rng().gen_range(0..1_000_000)
}

/// Fetches a freshly generated image and inlines it as a data URI.
pub struct GenerativeStrategy {
  name: String,
  label: String,
  endpoint: String,
  width: u32,
  height: u32,
  model: String,
  user_agent: String,
  accept: String,
  verify: bool,
}

impl GenerativeStrategy {
  fn request_url(&self, prompt: &Prompt, seed: u32) -> String {
    format!(
      "{}/{}?width={}&height={}&seed={}&model={}&nologo=true&enhance=true",
      self.endpoint.trim_end_matches('/'),
      encode_component(prompt.as_str()),
      self.width,
      self.height,
      seed,
      encode_component(&self.model),
    )
  }

  fn headers(&self) -> Result<HeaderMap, StrategyError> {
    let mut headers = HeaderMap::new();
    headers.insert(
      USER_AGENT,
      HeaderValue::from_str(&self.user_agent)
        .map_err(|err| StrategyError::Misconfigured(format!("{}: bad user agent: {err}", self.name)))?,
    );
    headers.insert(
      ACCEPT,
      HeaderValue::from_str(&self.accept)
        .map_err(|err| StrategyError::Misconfigured(format!("{}: bad accept header: {err}", self.name)))?,
    );
    Ok(headers)
  }
}

#[async_trait]
impl ImageStrategy for GenerativeStrategy {
  fn name(&self) -> &str {
    &self.name
  }

  fn verifies(&self) -> bool {
    self.verify
  }

  async fn attempt(&self, prompt: &Prompt, upstream: &dyn Upstream) -> Result<ImageReference, StrategyError> {
    let url = self.request_url(prompt, random_seed());
    let resp = upstream.get(&url, self.headers()?).await?;
    if !resp.status.is_success() {
      return Err(StrategyError::UpstreamStatus {
        service: self.label.clone(),
        status: resp.status.as_u16(),
      });
    }

    let mime = resp
      .content_type
      .as_deref()
      .map(|ct| ct.split(';').next().unwrap_or("").trim())
      .filter(|ct| ct.starts_with("image/"))
      .unwrap_or(DEFAULT_IMAGE_MIME);
    Ok(ImageReference::classify(format!(
      "data:{mime};base64,{}",
      BASE64.encode(&resp.body)
    )))
  }
}

/// Stable photo URL keyed by a hash of the prompt. No network I/O.
pub struct SeededPhotoStrategy {
  name: String,
  endpoint: String,
  width: u32,
  height: u32,
  query: Option<String>,
  verify: bool,
}

impl SeededPhotoStrategy {
  fn url(&self, prompt: &Prompt) -> String {
    let mut url = format!(
      "{}/{}/{}/{}",
      self.endpoint.trim_end_matches('/'),
      prompt_seed(prompt.as_str()),
      self.width,
      self.height
    );
    if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
      url.push('?');
      url.push_str(query);
    }
    url
  }
}

#[async_trait]
impl ImageStrategy for SeededPhotoStrategy {
  fn name(&self) -> &str {
    &self.name
  }

  fn verifies(&self) -> bool {
    self.verify
  }

  async fn attempt(&self, prompt: &Prompt, _upstream: &dyn Upstream) -> Result<ImageReference, StrategyError> {
    Ok(ImageReference::classify(self.url(prompt)))
  }
}

pub struct PlaceholderStrategy {
  name: String,
  endpoint: String,
  width: u32,
  height: u32,
  palette: Vec<String>,
  text_color: String,
  text_limit: usize,
  verify: bool,
}

impl PlaceholderStrategy {
  fn url(&self, prompt: &Prompt) -> Result<String, StrategyError> {
    if self.palette.is_empty() {
      return Err(StrategyError::Misconfigured(format!("{}: empty palette", self.name)));
    }
    let color = &self.palette[prompt.utf16_len() % self.palette.len()];
    Ok(format!(
      "{}/{}x{}/{}/{}?text={}",
      self.endpoint.trim_end_matches('/'),
      self.width,
      self.height,
      color,
      self.text_color,
      encode_component(&prompt.prefix(self.text_limit)),
    ))
  }
}

#[async_trait]
impl ImageStrategy for PlaceholderStrategy {
  fn name(&self) -> &str {
    &self.name
  }

  fn verifies(&self) -> bool {
    self.verify
  }

  async fn attempt(&self, prompt: &Prompt, _upstream: &dyn Upstream) -> Result<ImageReference, StrategyError> {
    self.url(prompt).map(ImageReference::classify)
  }
}

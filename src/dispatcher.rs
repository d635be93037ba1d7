use std::sync::Arc;

use crate::config::FallbackConfig;
use crate::error::{DispatchError, StrategyError};
use crate::logger::Logger;
use crate::models::{DispatchResult, ImageReference, Prompt};
use crate::strategy::{encode_component, ImageStrategy};
use crate::upstream::Upstream;

pub const FALLBACK_SERVICE: &str = "fallback";
const UNKNOWN_ERROR: &str = "Unknown error";

pub struct Dispatcher {
  strategies: Vec<Box<dyn ImageStrategy>>,
  upstream: Arc<dyn Upstream>,
  fallback: FallbackConfig,
  logger: Arc<Logger>,
}

impl Dispatcher {
  pub fn new(
    strategies: Vec<Box<dyn ImageStrategy>>,
    upstream: Arc<dyn Upstream>,
    fallback: FallbackConfig,
    logger: Arc<Logger>,
  ) -> Self {
    Self {
      strategies,
      upstream,
      fallback,
      logger,
    }
  }

  /// Runs the strategy chain. Only input validation can fail; every other
  /// failure ends in the local placeholder result.
  pub async fn dispatch(&self, raw_prompt: Option<&str>) -> Result<DispatchResult, DispatchError> {
    let prompt = Prompt::parse(raw_prompt)?;
    let request_id = uuid::Uuid::new_v4();
    self
      .logger
      .info(&format!("[{request_id}] Generating image with prompt: {prompt}"));

    let mut last_error: Option<StrategyError> = None;
    for strategy in &self.strategies {
      self.logger.info(&format!("[{request_id}] Trying {}...", strategy.name()));
      match self.run_strategy(strategy.as_ref(), &prompt).await {
        Ok(image) => {
          self.logger.info(&format!(
            "[{request_id}] {} succeeded ({}, {} bytes)",
            strategy.name(),
            image.kind(),
            image.as_str().len()
          ));
          return Ok(DispatchResult {
            image,
            prompt: prompt.as_str().to_string(),
            strategy: strategy.name().to_string(),
            error: None,
          });
        }
        Err(err) => {
          self
            .logger
            .warn(&format!("[{request_id}] {} failed: {err}", strategy.name()));
          last_error = Some(err);
        }
      }
    }

    let message = last_error
      .map(|err| err.to_string())
      .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
    self
      .logger
      .error(&format!("[{request_id}] All services failed: {message}"));
    Ok(self.fallback_result(prompt.as_str(), message))
  }

  async fn run_strategy(&self, strategy: &dyn ImageStrategy, prompt: &Prompt) -> Result<ImageReference, StrategyError> {
    let image = strategy.attempt(prompt, self.upstream.as_ref()).await?;
    if strategy.verifies() {
      let status = self.upstream.head(image.as_str()).await?;
      if !status.is_success() {
        return Err(StrategyError::Verification(status.as_u16()));
      }
    }
    Ok(image)
  }

  /// Local placeholder result, used when every strategy failed or the request
  /// could not be read.
  pub fn fallback_result(&self, prompt: &str, error: String) -> DispatchResult {
    let prompt = if prompt.is_empty() {
      self.fallback.default_prompt.as_str()
    } else {
      prompt
    };
    let text: String = prompt.chars().take(self.fallback.text_limit).collect();
    let url = format!(
      "{}?height={}&width={}&text={}",
      self.fallback.placeholder_path,
      self.fallback.height,
      self.fallback.width,
      encode_component(&text)
    );
    DispatchResult {
      image: ImageReference::classify(url),
      prompt: prompt.to_string(),
      strategy: FALLBACK_SERVICE.to_string(),
      error: Some(error),
    }
  }
}

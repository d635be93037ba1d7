use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
  #[error("Prompt is required")]
  InvalidInput,
}

impl DispatchError {
  pub fn status(&self) -> StatusCode {
    match self {
      DispatchError::InvalidInput => StatusCode::BAD_REQUEST,
    }
  }
}

/// Failure of a single strategy. Never leaves the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
  #[error("{service} HTTP {status}")]
  UpstreamStatus { service: String, status: u16 },
  #[error("Service returned {0}")]
  Verification(u16),
  #[error(transparent)]
  Upstream(#[from] UpstreamError),
  #[error("{0}")]
  Misconfigured(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
  #[error("{0}")]
  Transport(String),
}

impl From<reqwest::Error> for UpstreamError {
  fn from(err: reqwest::Error) -> Self {
    UpstreamError::Transport(err.to_string())
  }
}

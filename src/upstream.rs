use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use reqwest::header::{HeaderMap, CONTENT_TYPE};

use crate::error::UpstreamError;

pub struct UpstreamResponse {
  pub status: StatusCode,
  pub content_type: Option<String>,
  pub body: Bytes,
}

/// Outbound HTTP used by strategies and the download proxy.
#[async_trait]
pub trait Upstream: Send + Sync {
  async fn get(&self, url: &str, headers: HeaderMap) -> Result<UpstreamResponse, UpstreamError>;

  async fn head(&self, url: &str) -> Result<StatusCode, UpstreamError>;
}

pub struct ReqwestUpstream {
  client: reqwest::Client,
}

impl ReqwestUpstream {
  pub fn new() -> anyhow::Result<Self> {
    let client = reqwest::Client::builder()
      .redirect(reqwest::redirect::Policy::limited(10))
      .build()?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Upstream for ReqwestUpstream {
  async fn get(&self, url: &str, headers: HeaderMap) -> Result<UpstreamResponse, UpstreamError> {
    let resp = self.client.get(url).headers(headers).send().await?;
    let status = resp.status();
    let content_type = resp
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(|v| v.to_string());
    if !status.is_success() {
      return Ok(UpstreamResponse {
        status,
        content_type,
        body: Bytes::new(),
      });
    }
    let body = resp.bytes().await?;
    Ok(UpstreamResponse {
      status,
      content_type,
      body,
    })
  }

  async fn head(&self, url: &str) -> Result<StatusCode, UpstreamError> {
    let resp = self.client.head(url).send().await?;
    Ok(resp.status())
  }
}

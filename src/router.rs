use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::dispatcher::Dispatcher;
use crate::logger::Logger;
use crate::models::{DownloadRequest, GenerateRequest, GenerateResponse};
use crate::placeholder::{PlaceholderQuery, PlaceholderSpec};
use crate::upstream::Upstream;

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

pub struct RouterState {
  pub started_at: Instant,
  pub config: Arc<AppConfig>,
  pub dispatcher: Arc<Dispatcher>,
  pub upstream: Arc<dyn Upstream>,
  pub logger: Arc<Logger>,
}

pub fn build_router(state: RouterState) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/api/generate-image", post(generate_image))
    .route("/api/download-image", post(download_image))
    .route("/api/placeholder", get(placeholder))
    .route("/placeholder.svg", get(placeholder))
    .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
    .with_state(Arc::new(state))
}

pub async fn run_router(listener: TcpListener, state: RouterState) -> anyhow::Result<()> {
  let app = build_router(state);
  listener.set_nonblocking(true)?;
  let listener = tokio::net::TcpListener::from_std(listener)?;
  axum::serve(listener, app).await?;
  Ok(())
}

async fn health(State(state): State<Arc<RouterState>>) -> Json<serde_json::Value> {
  let uptime = state.started_at.elapsed().as_millis();
  Json(serde_json::json!({
    "status": "ok",
    "version": env!("CARGO_PKG_VERSION"),
    "uptime_ms": uptime
  }))
}

async fn generate_image(State(state): State<Arc<RouterState>>, body: Bytes) -> Response {
  let parsed = serde_json::from_slice::<serde_json::Value>(&body)
    .map_err(|err| err.to_string())
    .and_then(|value| match value {
      serde_json::Value::Null => Err("request body is null".to_string()),
      value => Ok(value),
    });
  let req = match parsed {
    Ok(value) => GenerateRequest::from_json(&value),
    Err(err) => {
      state
        .logger
        .error(&format!("Image generation error: unreadable request: {err}"));
      let result = state.dispatcher.fallback_result("", err);
      return (StatusCode::OK, Json(GenerateResponse::from(result))).into_response();
    }
  };

  match state.dispatcher.dispatch(req.prompt.as_deref()).await {
    Ok(result) => (StatusCode::OK, Json(GenerateResponse::from(result))).into_response(),
    Err(err) => error_response(err.status(), &err.to_string()),
  }
}

async fn download_image(State(state): State<Arc<RouterState>>, body: Bytes) -> Response {
  let req = match serde_json::from_slice::<DownloadRequest>(&body) {
    Ok(req) => req,
    Err(err) => {
      state
        .logger
        .error(&format!("Error downloading image: unreadable request: {err}"));
      return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to download image");
    }
  };

  let image_url = match req.image_url.filter(|url| !url.is_empty()) {
    Some(url) => url,
    None => return error_response(StatusCode::BAD_REQUEST, "Image URL is required"),
  };
  if reqwest::Url::parse(&image_url).is_err() {
    return error_response(StatusCode::BAD_REQUEST, "Invalid image URL");
  }

  let download = &state.config.download;
  let mut headers = HeaderMap::new();
  match HeaderValue::from_str(&download.user_agent) {
    Ok(value) => {
      headers.insert(USER_AGENT, value);
    }
    Err(err) => state
      .logger
      .warn(&format!("Ignoring invalid download user agent: {err}")),
  }

  let fetch = state.upstream.get(&image_url, headers);
  let resp = match tokio::time::timeout(Duration::from_secs(download.timeout_secs), fetch).await {
    Ok(Ok(resp)) => resp,
    Ok(Err(err)) => {
      state
        .logger
        .error(&format!("Error downloading image {image_url}: {err}"));
      return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to download image");
    }
    Err(_) => {
      state.logger.error(&format!(
        "Error downloading image {image_url}: timed out after {}s",
        download.timeout_secs
      ));
      return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to download image");
    }
  };

  if !resp.status.is_success() {
    return error_response(
      StatusCode::BAD_GATEWAY,
      &format!("Failed to fetch image: {}", resp.status.as_u16()),
    );
  }

  let content_type = resp
    .content_type
    .filter(|ct| ct.starts_with("image/"))
    .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
  (
    [
      (CONTENT_TYPE, content_type),
      (CACHE_CONTROL, "public, max-age=86400".to_string()),
    ],
    resp.body,
  )
    .into_response()
}

async fn placeholder(Query(query): Query<PlaceholderQuery>) -> impl IntoResponse {
  let svg = PlaceholderSpec::from_query(&query).render();
  (
    [
      (CONTENT_TYPE, "image/svg+xml"),
      (CACHE_CONTROL, "public, max-age=3600"),
    ],
    svg,
  )
}

fn error_response(status: StatusCode, message: &str) -> Response {
  let body = Json(serde_json::json!({ "error": message }));
  (status, body).into_response()
}

#[cfg(test)]
mod tests {
  use axum::body::Body;
  use axum::http::{Method, Request};
  use http_body_util::BodyExt;
  use tower::ServiceExt;

  use super::*;
  use crate::strategy::build_strategies;
  use crate::upstream::fake::{FakeReply, FakeUpstream};

  fn app(upstream: Arc<FakeUpstream>) -> Router {
    app_with(AppConfig::default(), upstream)
  }

  fn app_with(config: AppConfig, upstream: Arc<FakeUpstream>) -> Router {
    let logger = Arc::new(Logger::silent());
    let dispatcher = Dispatcher::new(
      build_strategies(&config.strategies),
      upstream.clone(),
      config.fallback.clone(),
      logger.clone(),
    );
    build_router(RouterState {
      started_at: Instant::now(),
      config: Arc::new(config),
      dispatcher: Arc::new(dispatcher),
      upstream,
      logger,
    })
  }

  fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
      .method(Method::POST)
      .uri(uri)
      .header("content-type", "application/json")
      .body(Body::from(body.to_string()))
      .expect("request")
  }

  async fn send(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let resp = app.oneshot(req).await.expect("response");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.expect("body").to_bytes();
    (status, headers, body)
  }

  fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).expect("json body")
  }

  #[tokio::test]
  async fn health_reports_ok() {
    let req = Request::builder().uri("/health").body(Body::empty()).expect("request");
    let (status, _, body) = send(app(Arc::new(FakeUpstream::new())), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ok");
  }

  #[tokio::test]
  async fn generate_rejects_missing_prompt() {
    let upstream = Arc::new(FakeUpstream::new());
    let (status, _, body) = send(app(upstream.clone()), post_json("/api/generate-image", "{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body), serde_json::json!({ "error": "Prompt is required" }));
    assert!(upstream.calls().is_empty());
  }

  #[tokio::test]
  async fn generate_returns_first_success() {
    let upstream = Arc::new(
      FakeUpstream::new().route("https://picsum.photos/", FakeReply::Status(200)),
    );
    let (status, _, body) = send(
      app(upstream),
      post_json("/api/generate-image", r#"{"prompt":"a red fox"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
      json(&body),
      serde_json::json!({
        "imageUrl": "https://picsum.photos/seed/873/512/512?blur=0&grayscale=0",
        "prompt": "a red fox",
        "service": "replicate-demo"
      })
    );
  }

  #[tokio::test]
  async fn generate_falls_back_with_success_status() {
    let (status, _, body) = send(
      app(Arc::new(FakeUpstream::new())),
      post_json("/api/generate-image", r#"{"prompt":"a red fox"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let value = json(&body);
    assert_eq!(
      value["imageUrl"],
      "/placeholder.svg?height=512&width=512&text=a%20red%20fox"
    );
    assert_eq!(value["prompt"], "a red fox");
    assert_eq!(value["service"], "fallback");
    assert!(value["error"].is_string());
  }

  #[tokio::test]
  async fn generate_with_unreadable_body_uses_default_prompt() {
    let upstream = Arc::new(FakeUpstream::new());
    let (status, _, body) = send(app(upstream.clone()), post_json("/api/generate-image", "not json")).await;
    assert_eq!(status, StatusCode::OK);
    let value = json(&body);
    assert_eq!(value["prompt"], "AI Art");
    assert_eq!(value["service"], "fallback");
    assert_eq!(
      value["imageUrl"],
      "/placeholder.svg?height=512&width=512&text=AI%20Art"
    );
    assert!(upstream.calls().is_empty());
  }

  #[tokio::test]
  async fn generate_rejects_falsy_prompt_values() {
    for body in [r#"{"prompt":0}"#, r#"{"prompt":false}"#, r#"{"prompt":null}"#, "[]"] {
      let upstream = Arc::new(FakeUpstream::new());
      let (status, _, resp) = send(app(upstream.clone()), post_json("/api/generate-image", body)).await;
      assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
      assert_eq!(json(&resp), serde_json::json!({ "error": "Prompt is required" }));
      assert!(upstream.calls().is_empty());
    }
  }

  #[tokio::test]
  async fn generate_with_null_body_falls_back() {
    let (status, _, body) = send(
      app(Arc::new(FakeUpstream::new())),
      post_json("/api/generate-image", "null"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["prompt"], "AI Art");
    assert_eq!(json(&body)["service"], "fallback");
  }

  #[tokio::test]
  async fn download_with_unreadable_body_is_server_error() {
    let upstream = Arc::new(FakeUpstream::new());
    let (status, _, body) = send(app(upstream.clone()), post_json("/api/download-image", "not json")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "Failed to download image");
    assert!(upstream.calls().is_empty());
  }

  #[tokio::test]
  async fn download_times_out_as_server_error() {
    let mut config = AppConfig::default();
    config.download.timeout_secs = 1;
    let upstream = Arc::new(FakeUpstream::new().route("https://slow.example/", FakeReply::Hang));
    let started = Instant::now();
    let (status, _, body) = send(
      app_with(config, upstream),
      post_json("/api/download-image", r#"{"imageUrl":"https://slow.example/fox.png"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "Failed to download image");
    assert!(started.elapsed() >= Duration::from_secs(1));
  }

  #[tokio::test]
  async fn download_requires_url() {
    let (status, _, body) = send(
      app(Arc::new(FakeUpstream::new())),
      post_json("/api/download-image", r#"{"imageUrl":""}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Image URL is required");
  }

  #[tokio::test]
  async fn download_rejects_relative_url() {
    let (status, _, body) = send(
      app(Arc::new(FakeUpstream::new())),
      post_json("/api/download-image", r#"{"imageUrl":"/placeholder.svg"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Invalid image URL");
  }

  #[tokio::test]
  async fn download_maps_upstream_status_to_bad_gateway() {
    let upstream = Arc::new(FakeUpstream::new().route("https://img.example/", FakeReply::Status(404)));
    let (status, _, body) = send(
      app(upstream),
      post_json("/api/download-image", r#"{"imageUrl":"https://img.example/fox.png"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json(&body)["error"], "Failed to fetch image: 404");
  }

  #[tokio::test]
  async fn download_unreachable_is_server_error() {
    let (status, _, body) = send(
      app(Arc::new(FakeUpstream::new())),
      post_json("/api/download-image", r#"{"imageUrl":"https://img.example/fox.png"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "Failed to download image");
  }

  #[tokio::test]
  async fn download_streams_bytes_with_image_type() {
    let upstream = Arc::new(FakeUpstream::new().route(
      "https://img.example/",
      FakeReply::Image {
        content_type: Some("image/png".to_string()),
        body: vec![0x89, b'P', b'N', b'G'],
      },
    ));
    let (status, headers, body) = send(
      app(upstream),
      post_json("/api/download-image", r#"{"imageUrl":"https://img.example/fox.png"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "image/png");
    assert_eq!(headers[CACHE_CONTROL], "public, max-age=86400");
    assert_eq!(&body[..], &[0x89, b'P', b'N', b'G']);
  }

  #[tokio::test]
  async fn download_defaults_non_image_type_to_jpeg() {
    let upstream = Arc::new(FakeUpstream::new().route(
      "https://img.example/",
      FakeReply::Image {
        content_type: Some("text/html".to_string()),
        body: b"<html>".to_vec(),
      },
    ));
    let (status, headers, _) = send(
      app(upstream),
      post_json("/api/download-image", r#"{"imageUrl":"https://img.example/page"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "image/jpeg");
  }

  #[tokio::test]
  async fn placeholder_serves_svg() {
    let req = Request::builder()
      .uri("/placeholder.svg?height=512&width=512&text=a%20red%20fox")
      .body(Body::empty())
      .expect("request");
    let (status, headers, body) = send(app(Arc::new(FakeUpstream::new())), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "image/svg+xml");
    assert_eq!(headers[CACHE_CONTROL], "public, max-age=3600");
    let svg = String::from_utf8(body.to_vec()).expect("utf8");
    assert!(svg.contains(">a red fox</text>"));
  }
}

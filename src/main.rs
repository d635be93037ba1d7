mod config;
mod dispatcher;
mod error;
mod logger;
mod models;
mod placeholder;
mod router;
mod strategy;
mod upstream;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use config::load_or_init;
use dispatcher::Dispatcher;
use logger::Logger;
use router::{run_router, RouterState};
use strategy::build_strategies;
use upstream::{ReqwestUpstream, Upstream};

const CONFIG_ENV: &str = "IMAGEGEN_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config_path = std::env::var_os(CONFIG_ENV)
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("imagegen.json"));
  let config = load_or_init(&config_path)
    .with_context(|| format!("failed to load config from {}", config_path.display()))?;

  let logger = if config.log_path.as_os_str().is_empty() {
    Arc::new(Logger::console())
  } else {
    Arc::new(Logger::new(&config.log_path)?)
  };
  logger.info("ImageGen Router starting up");

  let upstream: Arc<dyn Upstream> = Arc::new(ReqwestUpstream::new()?);
  let dispatcher = Dispatcher::new(
    build_strategies(&config.strategies),
    upstream.clone(),
    config.fallback.clone(),
    logger.clone(),
  );

  let listener = std::net::TcpListener::bind(&config.bind_addr)
    .with_context(|| format!("failed to bind {}", config.bind_addr))?;
  logger.info(&format!("Listening on http://{}", listener.local_addr()?));

  let state = RouterState {
    started_at: Instant::now(),
    config: Arc::new(config),
    dispatcher: Arc::new(dispatcher),
    upstream,
    logger: logger.clone(),
  };

  if let Err(err) = run_router(listener, state).await {
    logger.error(&format!("router error: {err}"));
    return Err(err);
  }
  Ok(())
}

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::dispatcher::FALLBACK_SERVICE;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
  pub bind_addr: String,
  pub log_path: PathBuf,
  pub strategies: Vec<StrategyConfig>,
  pub fallback: FallbackConfig,
  pub download: DownloadConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
  Generative {
    name: String,
    /// Label used in upstream status errors, e.g. "Pollinations HTTP 500".
    label: String,
    endpoint: String,
    width: u32,
    height: u32,
    model: String,
    user_agent: String,
    accept: String,
    #[serde(default)]
    verify: bool,
  },
  SeededPhoto {
    name: String,
    endpoint: String,
    width: u32,
    height: u32,
    #[serde(default)]
    query: Option<String>,
    #[serde(default = "default_true")]
    verify: bool,
  },
  Placeholder {
    name: String,
    endpoint: String,
    width: u32,
    height: u32,
    palette: Vec<String>,
    text_color: String,
    text_limit: usize,
    #[serde(default = "default_true")]
    verify: bool,
  },
}

impl StrategyConfig {
  pub fn name(&self) -> &str {
    match self {
      StrategyConfig::Generative { name, .. }
      | StrategyConfig::SeededPhoto { name, .. }
      | StrategyConfig::Placeholder { name, .. } => name,
    }
  }

  fn dimensions(&self) -> (u32, u32) {
    match self {
      StrategyConfig::Generative { width, height, .. }
      | StrategyConfig::SeededPhoto { width, height, .. }
      | StrategyConfig::Placeholder { width, height, .. } => (*width, *height),
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FallbackConfig {
  pub placeholder_path: String,
  pub width: u32,
  pub height: u32,
  pub text_limit: usize,
  pub default_prompt: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DownloadConfig {
  pub user_agent: String,
  pub timeout_secs: u64,
}

fn default_true() -> bool {
  true
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      bind_addr: "127.0.0.1:3000".to_string(),
      log_path: PathBuf::from("imagegen-router.log"),
      strategies: vec![
        StrategyConfig::Generative {
          name: "pollinations-v2".to_string(),
          label: "Pollinations".to_string(),
          endpoint: "https://image.pollinations.ai/prompt".to_string(),
          width: 512,
          height: 512,
          model: "flux".to_string(),
          user_agent: "Mozilla/5.0 (compatible; AI-Image-Generator/1.0)".to_string(),
          accept: "image/*".to_string(),
          verify: false,
        },
        StrategyConfig::SeededPhoto {
          name: "replicate-demo".to_string(),
          endpoint: "https://picsum.photos/seed".to_string(),
          width: 512,
          height: 512,
          query: Some("blur=0&grayscale=0".to_string()),
          verify: true,
        },
        StrategyConfig::SeededPhoto {
          name: "lorem-picsum".to_string(),
          endpoint: "https://picsum.photos/seed".to_string(),
          width: 512,
          height: 512,
          query: None,
          verify: true,
        },
        StrategyConfig::Placeholder {
          name: "placeholder-ai".to_string(),
          endpoint: "https://via.placeholder.com".to_string(),
          width: 512,
          height: 512,
          palette: ["4F46E5", "7C3AED", "EC4899", "EF4444", "F59E0B", "10B981"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
          text_color: "FFFFFF".to_string(),
          text_limit: 20,
          verify: true,
        },
      ],
      fallback: FallbackConfig {
        placeholder_path: "/placeholder.svg".to_string(),
        width: 512,
        height: 512,
        text_limit: 30,
        default_prompt: "AI Art".to_string(),
      },
      download: DownloadConfig {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
        timeout_secs: 10,
      },
    }
  }
}

impl AppConfig {
  pub fn validate(&self) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for strategy in &self.strategies {
      let name = strategy.name();
      if name.trim().is_empty() {
        bail!("strategy name must not be empty");
      }
      if name == FALLBACK_SERVICE {
        bail!("strategy name '{FALLBACK_SERVICE}' is reserved");
      }
      if !seen.insert(name) {
        bail!("duplicate strategy name '{name}'");
      }
      let (width, height) = strategy.dimensions();
      if width == 0 || height == 0 {
        bail!("strategy '{name}' has a zero dimension");
      }
      if let StrategyConfig::Placeholder { palette, .. } = strategy {
        if palette.is_empty() {
          bail!("strategy '{name}' has an empty palette");
        }
      }
    }
    if self.fallback.width == 0 || self.fallback.height == 0 {
      bail!("fallback placeholder has a zero dimension");
    }
    if self.download.timeout_secs == 0 {
      bail!("download timeout must be positive");
    }
    Ok(())
  }
}

pub fn load_or_init(path: &Path) -> anyhow::Result<AppConfig> {
  let config = if path.exists() {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str::<AppConfig>(&data)?
  } else {
    let config = AppConfig::default();
    save_config(path, &config)?;
    config
  };
  config.validate()?;
  Ok(config)
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(config)?;
  std::fs::write(path, json)?;
  Ok(())
}

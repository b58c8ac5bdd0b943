use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub figures: FigureConfig,
    #[serde(default)]
    pub extractors: ExtractorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FigureConfig {
    /// Upper bound on the summed size of cached figures.
    #[serde(default = "default_figure_max_bytes")]
    pub max_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorsConfig {
    #[serde(default = "enabled")]
    pub text: bool,
    #[serde(default = "enabled")]
    pub images: bool,
    #[serde(default)]
    pub commands: Vec<CommandExtractorConfig>,
}

/// An external program that turns a document on stdin into metadata and text
/// on stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandExtractorConfig {
    pub name: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub mime_types: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_upload_bytes: default_max_upload_bytes(),
            },
            working_dir: default_working_dir(),
            workspace: None,
            figures: FigureConfig::default(),
            extractors: ExtractorsConfig::default(),
        }
    }
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_figure_max_bytes(),
        }
    }
}

impl Default for ExtractorsConfig {
    fn default() -> Self {
        Self {
            text: true,
            images: true,
            commands: Vec::new(),
        }
    }
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_figure_max_bytes() -> u64 {
    256 * 1024 * 1024
}

fn enabled() -> bool {
    true
}

pub async fn load_config() -> Result<AppConfig> {
    let path = config_path();
    let contents = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let mut config: AppConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

    if let Some(workspace) = env::var("WORKSPACE")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        config.workspace = Some(workspace);
    }

    info!(path = %path.display(), "Configuration loaded from disk");
    Ok(config)
}

fn config_path() -> PathBuf {
    env::var("APP_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::Result;

const DEFAULT_CONFIG_PATH: &str = "config/tally.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted PostgREST backend.
    Rest,
    /// In-process backend seeded with demo data.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub api_key: String,
    pub access_token: Option<String>,
    pub backend: BackendKind,
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:54321".to_string(),
            api_key: String::new(),
            access_token: None,
            backend: BackendKind::Memory,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tally", disable_version_flag = true)]
struct Args {
    /// Optional config file path (TOML).
    #[arg(long)]
    config: Option<String>,
    /// Override backend URL (e.g. https://project.supabase.co).
    #[arg(long)]
    base_url: Option<String>,
    /// Override which backend to edit.
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,
    /// Override log level (error, warn, info, debug, trace).
    #[arg(long)]
    level: Option<String>,
}

/// Layers the config file, `TALLY_*` environment variables and flags, in
/// increasing priority. Keys are never read from flags.
pub fn load() -> Result<AppConfig> {
    let args = Args::parse();

    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let mut builder = config::Config::builder();
    builder = builder.add_source(config::File::with_name(config_path).required(false));
    builder = builder.add_source(config::Environment::with_prefix("TALLY"));
    let mut settings: AppConfig = builder.build()?.try_deserialize()?;

    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    if let Some(level) = args.level {
        settings.level = level;
    }

    Ok(settings)
}

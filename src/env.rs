use anyhow::Context;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://students.db";
pub const DEFAULT_UPLOAD_DIR: &str = "./static/uploads";
pub const DEFAULT_DOWNLOAD_DIR: &str = "./static/downloads";

/// Settings the application is built with. Read once at startup and handed to
/// Rocket as managed state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub download_dir: PathBuf,
    pub secret_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
            download_dir: PathBuf::from(env_or("DOWNLOAD_DIR", DEFAULT_DOWNLOAD_DIR)),
            secret_key: dotenvy::var("SECRET_KEY").ok().filter(|key| !key.is_empty()),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    dotenvy::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// What happened to one environment file during startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFileLoad {
    Loaded(PathBuf),
    Missing(PathBuf),
}

/// Layers the environment files for the current profile. Runs before the
/// subscriber exists, so the outcome is returned for `log_env_files` instead
/// of being logged here.
pub fn load_environment() -> anyhow::Result<Vec<EnvFileLoad>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        ["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        ["config/common.env", "config/dev.env", ".secrets.env"]
    };

    load_env_files(env_files.iter().map(Path::new))
}

pub fn load_env_files<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
) -> anyhow::Result<Vec<EnvFileLoad>> {
    paths.into_iter().map(load_env_file).collect()
}

fn load_env_file(path: &Path) -> anyhow::Result<EnvFileLoad> {
    if !path.exists() {
        return Ok(EnvFileLoad::Missing(path.to_path_buf()));
    }

    dotenvy::from_path_override(path)
        .with_context(|| format!("Failed to load environment file {}", path.display()))?;
    Ok(EnvFileLoad::Loaded(path.to_path_buf()))
}

pub fn log_env_files(loads: &[EnvFileLoad]) {
    for load in loads {
        match load {
            EnvFileLoad::Loaded(path) => info!("Loaded environment from: {}", path.display()),
            EnvFileLoad::Missing(path) => {
                warn!("Environment file {} not found, skipping", path.display())
            }
        }
    }
}

//! Configuration loader and data directory resolution.
//!
//! Reads `config.toml` from the data directory (`~/.trainflow/` by default)
//! and deserializes it into [`TrainflowConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use trainflow_types::config::TrainflowConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TRAINFLOW_DATA_DIR";

/// Resolve the data directory from the environment or the home directory.
///
/// Priority:
/// 1. `TRAINFLOW_DATA_DIR`
/// 2. `~/.trainflow`
/// 3. `.trainflow` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".trainflow"),
        None => PathBuf::from(".trainflow"),
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// A missing file yields the defaults; an unreadable or unparsable file logs
/// a warning and yields the defaults.
pub async fn load_config(data_dir: &Path) -> TrainflowConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %config_path.display(), "no config.toml found, using defaults");
            return TrainflowConfig::default();
        }
        Err(err) => {
            tracing::warn!(path = %config_path.display(), "failed to read config: {err}, using defaults");
            return TrainflowConfig::default();
        }
    };

    match toml::from_str::<TrainflowConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!(path = %config_path.display(), "failed to parse config: {err}, using defaults");
            TrainflowConfig::default()
        }
    }
}

/// Clamp values that would stall the engine.
fn sanitize(mut config: TrainflowConfig) -> TrainflowConfig {
    if config.max_parallel_jobs == 0 {
        tracing::warn!("max_parallel_jobs = 0 would never start a job, using 1");
        config.max_parallel_jobs = 1;
    }
    if config.job_timeout_secs == Some(0) {
        tracing::warn!("job_timeout_secs = 0 disables the timeout");
        config.job_timeout_secs = None;
    }
    config
}

/// Read the webhook HMAC secret from the environment variable the config names.
/// An unset or empty variable means webhooks are accepted unsigned.
pub fn webhook_secret(config: &TrainflowConfig) -> Option<Vec<u8>> {
    std::env::var(&config.webhook_secret_env)
        .ok()
        .filter(|s| !s.is_empty())
        .map(String::into_bytes)
}

//! Deployment configuration loader for build-a-bot.
//!
//! Reads `buildabot.toml` from the project directory and deserializes it into
//! [`DeployConfig`]. Falls back to defaults when the file is missing or
//! malformed, then applies `BUILDABOT_*` environment overrides.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use buildabot_types::config::{DeployConfig, FailurePolicy};

pub const CONFIG_FILE: &str = "buildabot.toml";
pub const API_KEY_ENV: &str = "CHATBOTKIT_API_KEY";

const NAMESPACE_ENV: &str = "BUILDABOT_NAMESPACE";
const DEFINITIONS_DIR_ENV: &str = "BUILDABOT_DEFINITIONS_DIR";
const API_BASE_URL_ENV: &str = "BUILDABOT_API_BASE_URL";
const FAILURE_POLICY_ENV: &str = "BUILDABOT_FAILURE_POLICY";

/// Errors resolving settings that have no usable default.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{API_KEY_ENV} is not set")]
    MissingApiKey,
}

/// Load `{project_dir}/buildabot.toml` with environment overrides applied.
///
/// A relative `definitions_dir` is resolved against `project_dir`.
pub async fn load_config(project_dir: &Path) -> DeployConfig {
    let mut config = read_config_file(&project_dir.join(CONFIG_FILE)).await;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    if config.definitions_dir.is_relative() {
        config.definitions_dir = project_dir.join(&config.definitions_dir);
    }
    config
}

async fn read_config_file(path: &Path) -> DeployConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {CONFIG_FILE} found at {}, using defaults", path.display());
            return DeployConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return DeployConfig::default();
        }
    };

    match toml::from_str::<DeployConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            DeployConfig::default()
        }
    }
}

/// Apply `BUILDABOT_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut DeployConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let set = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(ns) = set(NAMESPACE_ENV) {
        config.namespace = Some(ns);
    }
    if let Some(dir) = set(DEFINITIONS_DIR_ENV) {
        config.definitions_dir = PathBuf::from(dir);
    }
    if let Some(url) = set(API_BASE_URL_ENV) {
        config.api_base_url = url;
    }
    if let Some(policy) = set(FAILURE_POLICY_ENV) {
        match policy.trim().to_ascii_lowercase().as_str() {
            "continue" => config.failure_policy = FailurePolicy::Continue,
            "abort" => config.failure_policy = FailurePolicy::Abort,
            other => tracing::warn!("Ignoring {FAILURE_POLICY_ENV}={other}: expected continue or abort"),
        }
    }
}

/// Read the hosting-service API key from the environment.
pub fn api_key_from_env() -> Result<SecretString, ConfigError> {
    api_key_from(|name| std::env::var(name).ok())
}

fn api_key_from<F>(lookup: F) -> Result<SecretString, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(API_KEY_ENV)
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .map(SecretString::from)
        .ok_or(ConfigError::MissingApiKey)
}

//! Deployment configuration types.
//!
//! `DeployConfig` represents the optional `buildabot.toml` in the project
//! root. Every field has a sensible default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a run does after one entity fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep going with the remaining entities.
    #[default]
    Continue,
    /// Stop starting new entities; in-flight ones still finish.
    Abort,
}

/// Top-level configuration for a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Namespace prepended to every remote name (`{namespace}-{entity}`).
    #[serde(default)]
    pub namespace: Option<String>,

    /// Root directory holding one subdirectory per bot.
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,

    /// Hosting service API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Model assigned to newly created bots.
    #[serde(default = "default_model")]
    pub model: String,

    /// Storage backend for new datasets.
    #[serde(default = "default_dataset_store")]
    pub dataset_store: String,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Entities reconciled at the same time.
    #[serde(default = "default_max_concurrent_entities")]
    pub max_concurrent_entities: usize,
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("bots")
}

fn default_api_base_url() -> String {
    "https://api.chatbotkit.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4-next".to_string()
}

fn default_dataset_store() -> String {
    "ada-sprout".to_string()
}

fn default_max_concurrent_entities() -> usize {
    4
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            definitions_dir: default_definitions_dir(),
            api_base_url: default_api_base_url(),
            model: default_model(),
            dataset_store: default_dataset_store(),
            failure_policy: FailurePolicy::default(),
            max_concurrent_entities: default_max_concurrent_entities(),
        }
    }
}

impl DeployConfig {
    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.namespace.as_deref())
    }
}

/// Maps local entity names to qualified remote names and back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    pub fn new(namespace: Option<&str>) -> Self {
        let prefix = match namespace.map(str::trim) {
            Some(ns) if !ns.is_empty() => format!("{ns}-"),
            _ => String::new(),
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Qualified remote name. Idempotent: an already-prefixed name is returned as is.
    pub fn qualify(&self, name: &str) -> String {
        if name.starts_with(&self.prefix) {
            name.to_string()
        } else {
            format!("{}{name}", self.prefix)
        }
    }

    /// Local entity name for a qualified remote name.
    pub fn strip<'a>(&self, name: &'a str) -> &'a str {
        name.strip_prefix(self.prefix.as_str()).unwrap_or(name)
    }

    /// Whether a remote name lives in this namespace.
    pub fn owns(&self, name: &str) -> bool {
        !self.prefix.is_empty() && name.starts_with(&self.prefix)
    }
}

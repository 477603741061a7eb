//! `variables.toml` variable builders.
//!
//! An entity directory may contain a flat TOML table:
//!
//! ```toml
//! company = "Acme"
//! support_email = "env:ACME_SUPPORT_EMAIL"
//! ```
//!
//! Values prefixed with `env:` are read from the process environment when
//! the builder runs, so sensitive prompt text stays out of the repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use buildabot_core::compiler::inject::VARIABLES_FILE_STEM;
use buildabot_core::compiler::plugins::{PluginRegistry, VariableBuilder};
use buildabot_types::tree::VirtualTree;

const ENV_PREFIX: &str = "env:";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds one entity's variables from the text of its `variables.toml`.
#[derive(Clone)]
pub struct TomlVariableBuilder {
    path: String,
    source: String,
    env: EnvLookup,
}

impl TomlVariableBuilder {
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment lookup used for `env:` values.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    fn resolve(&self, key: &str, value: &toml::Value) -> Result<String, String> {
        let raw = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => {
                return Err(format!(
                    "{}: '{key}' must be a string, number or boolean, found {}",
                    self.path,
                    other.type_str()
                ));
            }
        };

        match raw.strip_prefix(ENV_PREFIX) {
            Some(name) => (self.env)(name.trim()).ok_or_else(|| {
                format!(
                    "{}: environment variable {} for '{key}' is not set",
                    self.path,
                    name.trim()
                )
            }),
            None => Ok(raw),
        }
    }
}

impl std::fmt::Debug for TomlVariableBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TomlVariableBuilder")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl VariableBuilder for TomlVariableBuilder {
    fn variables(&self) -> Result<BTreeMap<String, String>, String> {
        let table: toml::Table = toml::from_str(&self.source)
            .map_err(|e| format!("{}: {}", self.path, e.message()))?;

        table
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.resolve(key, value)?)))
            .collect()
    }
}

/// Build the plugin registry for a loaded tree: a [`TomlVariableBuilder`]
/// for every entity with a `variables.toml`, and a
/// [`JsonOverlay`](crate::overlay::JsonOverlay) for every `overlay.json`.
pub fn registry_from_tree(tree: &VirtualTree) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for entity in tree.entity_names() {
        let path = tree.entity_path(&entity, &format!("{VARIABLES_FILE_STEM}.toml"));
        if let Some(source) = tree.get(&path) {
            tracing::debug!(entity = %entity, path = %path, "Registered variable builder");
            registry.register_variables(entity.clone(), TomlVariableBuilder::new(path.clone(), source));
        }
    }
    crate::overlay::register_overlays(tree, &mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_values() {
        let builder = TomlVariableBuilder::new(
            "/defs/support/variables.toml",
            "company = \"Acme\"\nyear = 2024\nbeta = true\n",
        );
        let vars = builder.variables().unwrap();
        assert_eq!(vars["company"], "Acme");
        assert_eq!(vars["year"], "2024");
        assert_eq!(vars["beta"], "true");
    }

    #[test]
    fn test_env_values() {
        let builder = TomlVariableBuilder::new("/v.toml", "email = \"env:SUPPORT_EMAIL\"")
            .with_env(|name| (name == "SUPPORT_EMAIL").then(|| "help@acme.test".to_string()));
        assert_eq!(builder.variables().unwrap()["email"], "help@acme.test");
    }

    #[test]
    fn test_missing_env_value_fails() {
        let builder =
            TomlVariableBuilder::new("/v.toml", "email = \"env:NOPE\"").with_env(|_| None);
        let err = builder.variables().unwrap_err();
        assert!(err.contains("NOPE"));
        assert!(err.contains("/v.toml"));
    }

    #[test]
    fn test_nested_table_rejected() {
        let builder = TomlVariableBuilder::new("/v.toml", "[nested]\nkey = \"v\"");
        let err = builder.variables().unwrap_err();
        assert!(err.contains("'nested'"));
    }

    #[test]
    fn test_invalid_toml() {
        let builder = TomlVariableBuilder::new("/v.toml", "this is not toml");
        assert!(builder.variables().unwrap_err().starts_with("/v.toml"));
    }

    #[test]
    fn test_registry_from_tree() {
        let tree = VirtualTree::from_relative(
            "/defs",
            [
                ("support/variables.toml", "company = \"Acme\""),
                ("support/identity/backstory.txt", "Hi ${company}"),
                ("sales/identity/backstory.txt", "Hi"),
            ],
        );
        let registry = registry_from_tree(&tree);
        let vars = registry.variables_for("support").unwrap().variables().unwrap();
        assert_eq!(vars["company"], "Acme");
        assert!(registry.variables_for("sales").is_none());
    }
}

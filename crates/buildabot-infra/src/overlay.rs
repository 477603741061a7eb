//! `overlay.json` definition overlays.
//!
//! An entity directory may carry a JSON document in the shape of a partial
//! definition. Every top-level key it sets replaces the slice built from
//! the entity's files:
//!
//! ```json
//! { "identity": { "backstory": "...", "matched": "{search}", "mismatched": "{search}" } }
//! ```
//!
//! The file is taken verbatim; template variables are not substituted.

use buildabot_core::compiler::plugins::{DefinitionOverlay, OVERLAY_FILE_NAME, PluginRegistry};
use buildabot_types::definition::PartialDefinition;
use buildabot_types::tree::VirtualTree;

/// Overlay backed by the text of one `overlay.json`.
#[derive(Debug, Clone)]
pub struct JsonOverlay {
    path: String,
    source: String,
}

impl JsonOverlay {
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }
}

impl DefinitionOverlay for JsonOverlay {
    fn apply(&self, _partial: &PartialDefinition) -> Result<PartialDefinition, String> {
        serde_json::from_str(&self.source).map_err(|e| format!("{}: {e}", self.path))
    }
}

/// Register a [`JsonOverlay`] for every entity with an `overlay.json`.
pub fn register_overlays(tree: &VirtualTree, registry: &mut PluginRegistry) {
    for entity in tree.entity_names() {
        let path = tree.entity_path(&entity, OVERLAY_FILE_NAME);
        if let Some(source) = tree.get(&path) {
            tracing::debug!(entity = %entity, path = %path, "Registered definition overlay");
            registry.register_overlay(entity.clone(), JsonOverlay::new(path.clone(), source));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildabot_core::compiler::compile;
    use buildabot_types::error::CompileError;

    use crate::variables::registry_from_tree;

    fn tree(overlay: &str) -> VirtualTree {
        VirtualTree::from_relative(
            "/defs",
            [
                ("support/identity/backstory.txt", "You help ${company}."),
                ("support/identity/matched.txt", "Use: {search}"),
                ("support/identity/mismatched.txt", "None: {search}"),
                ("support/variables.toml", "company = \"Acme\""),
                ("support/overlay.json", overlay),
            ],
        )
    }

    #[test]
    fn test_overlay_replaces_abilities_from_cli_registry() {
        let tree = tree(
            r#"{"abilities": [{"name": "escalate", "description": "Hands off", "instruction": "Page ${oncall}"}]}"#,
        );
        let registry = registry_from_tree(&tree);
        assert!(registry.overlay_for("support").is_some());

        let output = compile(tree, &registry).unwrap();
        let def = &output.definitions["support"];
        assert_eq!(def.identity.backstory, "You help Acme.");
        assert_eq!(def.abilities.len(), 1);
        assert_eq!(def.abilities[0].name, "escalate");
        // taken verbatim, and an unknown placeholder does not fail injection
        assert_eq!(def.abilities[0].instruction, "Page ${oncall}");
    }

    #[test]
    fn test_malformed_overlay_fails_entity() {
        let tree = tree("{ not json");
        let registry = registry_from_tree(&tree);

        let output = compile(tree, &registry).unwrap();
        assert!(matches!(
            &output.failures["support"],
            CompileError::Plugin { reason, .. } if reason.starts_with("/defs/support/overlay.json")
        ));
    }
}

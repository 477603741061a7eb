//! Host-registered build plugins.
//!
//! The host application resolves, per entity, an optional variable builder
//! (flat string map used by the injector) and an optional definition overlay
//! (fields merged over the file-built definition before validation). The
//! compiler never loads code on its own.

use std::collections::BTreeMap;

use buildabot_types::definition::PartialDefinition;

/// Per-entity overlay file read by the CLI host. Never templated.
pub const OVERLAY_FILE_NAME: &str = "overlay.json";

/// Produces the template variables for one entity.
pub trait VariableBuilder: Send + Sync {
    fn variables(&self) -> Result<BTreeMap<String, String>, String>;
}

/// Rewrites the file-built slices of one entity.
///
/// `Some` fields of the returned partial replace the file-built ones.
pub trait DefinitionOverlay: Send + Sync {
    fn apply(&self, partial: &PartialDefinition) -> Result<PartialDefinition, String>;
}

/// A fixed variable map.
#[derive(Debug, Clone, Default)]
pub struct StaticVariables(pub BTreeMap<String, String>);

impl VariableBuilder for StaticVariables {
    fn variables(&self) -> Result<BTreeMap<String, String>, String> {
        Ok(self.0.clone())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Adapts a closure into a [`DefinitionOverlay`].
pub struct FnOverlay<F>(pub F);

impl<F> DefinitionOverlay for FnOverlay<F>
where
    F: Fn(&PartialDefinition) -> Result<PartialDefinition, String> + Send + Sync,
{
    fn apply(&self, partial: &PartialDefinition) -> Result<PartialDefinition, String> {
        (self.0)(partial)
    }
}

/// Entity name -> plugin mapping, built by the host before compiling.
#[derive(Default)]
pub struct PluginRegistry {
    variables: BTreeMap<String, Box<dyn VariableBuilder>>,
    overlays: BTreeMap<String, Box<dyn DefinitionOverlay>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_variables(
        &mut self,
        entity: impl Into<String>,
        builder: impl VariableBuilder + 'static,
    ) -> &mut Self {
        self.variables.insert(entity.into(), Box::new(builder));
        self
    }

    pub fn register_overlay(
        &mut self,
        entity: impl Into<String>,
        overlay: impl DefinitionOverlay + 'static,
    ) -> &mut Self {
        self.overlays.insert(entity.into(), Box::new(overlay));
        self
    }

    pub fn variables_for(&self, entity: &str) -> Option<&dyn VariableBuilder> {
        self.variables.get(entity).map(|b| b.as_ref())
    }

    pub fn overlay_for(&self, entity: &str) -> Option<&dyn DefinitionOverlay> {
        self.overlays.get(entity).map(|o| o.as_ref())
    }

    /// Entities that have an overlay, whether or not they have files.
    pub fn overlay_entities(&self) -> impl Iterator<Item = &str> {
        self.overlays.keys().map(String::as_str)
    }

    pub fn variable_entities(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_variables_from_pairs() {
        let vars: StaticVariables = [("company", "Acme")].into_iter().collect();
        assert_eq!(vars.variables().unwrap()["company"], "Acme");
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = PluginRegistry::new();
        registry
            .register_variables("support", StaticVariables::default())
            .register_overlay(
                "support",
                FnOverlay(|_: &PartialDefinition| Ok::<_, String>(PartialDefinition::default())),
            );

        assert!(registry.variables_for("support").is_some());
        assert!(registry.variables_for("sales").is_none());
        assert!(registry.overlay_for("support").is_some());
        assert_eq!(registry.overlay_entities().collect::<Vec<_>>(), vec!["support"]);
    }
}

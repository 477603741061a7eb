//! Definition compiler.
//!
//! Turns a [`VirtualTree`] into validated [`Definition`]s:
//! variable injection, then extraction, overlays and validation per entity.
//! Every stage is a pure function over the tree; nothing here touches disk.

pub mod extract;
pub mod inject;
pub mod plugins;
pub mod validate;

use std::collections::{BTreeMap, BTreeSet};

use buildabot_types::definition::Definition;
use buildabot_types::error::CompileError;
use buildabot_types::tree::VirtualTree;

use self::plugins::PluginRegistry;

/// Result of compiling one tree.
///
/// Entity failures are isolated: a broken entity lands in `failures` and
/// never blocks its siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutput {
    pub definitions: BTreeMap<String, Definition>,
    pub failures: BTreeMap<String, CompileError>,
}

impl CompileOutput {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of entities seen, compiled or not.
    pub fn entity_count(&self) -> usize {
        self.definitions.len() + self.failures.len()
    }
}

/// Compile every entity in `tree`.
///
/// Fails as a whole only when there is nothing to compile.
pub fn compile(
    mut tree: VirtualTree,
    plugins: &PluginRegistry,
) -> Result<CompileOutput, CompileError> {
    let mut entities: BTreeSet<String> = tree.entity_names();
    entities.extend(plugins.overlay_entities().map(str::to_string));

    if entities.is_empty() {
        return Err(CompileError::EmptyTree {
            root: tree.root().to_string(),
        });
    }

    let mut output = CompileOutput {
        failures: unreadable_failures(&tree),
        ..Default::default()
    };
    for (entity, err) in inject::inject_variables(&mut tree, plugins) {
        output.failures.entry(entity).or_insert(err);
    }

    for entity in entities {
        if output.failures.contains_key(&entity) {
            continue;
        }
        match compile_entity(&tree, &entity, plugins) {
            Ok(definition) => {
                tracing::debug!(
                    entity = %entity,
                    abilities = definition.abilities.len(),
                    dataset_files = definition.dataset_files.len(),
                    deployed = definition.deployment.is_some(),
                    "Compiled definition"
                );
                output.definitions.insert(entity, definition);
            }
            Err(err) => {
                tracing::warn!(entity = %entity, kind = %err.kind(), error = %err, "Definition rejected");
                output.failures.insert(entity, err);
            }
        }
    }

    Ok(output)
}

/// One failure per entity that has a file the loader could not read.
fn unreadable_failures(tree: &VirtualTree) -> BTreeMap<String, CompileError> {
    let mut failures = BTreeMap::new();
    for (path, reason) in tree.unreadable() {
        let Some(entity) = tree.entity_of(path) else {
            continue;
        };
        tracing::warn!(entity = %entity, path = %path, reason = %reason, "Definition file unreadable");
        failures
            .entry(entity.to_string())
            .or_insert_with(|| CompileError::UnreadableFile {
                entity: entity.to_string(),
                path: path.clone(),
                reason: reason.clone(),
            });
    }
    failures
}

fn compile_entity(
    tree: &VirtualTree,
    entity: &str,
    plugins: &PluginRegistry,
) -> Result<Definition, CompileError> {
    let mut partial = extract::extract_entity(tree, entity)?;

    if let Some(overlay) = plugins.overlay_for(entity) {
        let patch = overlay.apply(&partial).map_err(|reason| CompileError::Plugin {
            entity: entity.to_string(),
            reason,
        })?;
        partial = partial.merge(patch);
    }

    validate::validate(tree, entity, partial)
}

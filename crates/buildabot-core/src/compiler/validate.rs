//! Definition validation.
//!
//! Turns the merged slices of one entity plus its cached deployment record
//! into a closed [`Definition`], or reports the offending field.

use std::collections::BTreeSet;

use buildabot_types::definition::{
    Definition, DeploymentRecord, Identity, PartialDefinition, SEARCH_TOKEN,
};
use buildabot_types::error::CompileError;
use buildabot_types::tree::{VirtualTree, file_stem};

use super::extract::IDENTITY_DIR;

/// Validate one entity.
pub fn validate(
    tree: &VirtualTree,
    entity: &str,
    partial: PartialDefinition,
) -> Result<Definition, CompileError> {
    let identity = partial.identity.ok_or_else(|| invalid(
        entity,
        "identity",
        format!(
            "is required ({} must contain backstory, matched and mismatched)",
            tree.entity_path(entity, IDENTITY_DIR)
        ),
    ))?;
    validate_identity(tree, entity, &identity)?;

    let abilities = partial.abilities.unwrap_or_default();
    let mut seen = BTreeSet::new();
    for ability in &abilities {
        if ability.name.trim().is_empty() {
            return Err(invalid(entity, "abilities", "contains an ability without a name"));
        }
        if !seen.insert(ability.name.as_str()) {
            return Err(invalid(
                entity,
                "abilities",
                format!("contains '{}' more than once", ability.name),
            ));
        }
        for (field, value) in [
            ("description", &ability.description),
            ("instruction", &ability.instruction),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(
                    entity,
                    &format!("abilities.{}.{field}", ability.name),
                    "must not be empty",
                ));
            }
        }
    }

    let dataset_files = partial.dataset_files.unwrap_or_default();
    let mut names = BTreeSet::new();
    for file in &dataset_files {
        if !names.insert(file.file_name()) {
            return Err(invalid(
                entity,
                "datasetFiles",
                format!("contains '{}' more than once ({})", file.file_name(), file.file_path),
            ));
        }
    }

    Ok(Definition {
        name: entity.to_string(),
        abilities,
        dataset_files,
        identity,
        deployment: read_record(tree, entity)?,
    })
}

fn validate_identity(
    tree: &VirtualTree,
    entity: &str,
    identity: &Identity,
) -> Result<(), CompileError> {
    for (field, value) in [
        ("matched", &identity.matched),
        ("mismatched", &identity.mismatched),
    ] {
        if !value.contains(SEARCH_TOKEN) {
            let reason = match identity_file(tree, entity, field) {
                Some(path) => format!("must contain {SEARCH_TOKEN} ({path})"),
                None => format!("must contain {SEARCH_TOKEN}"),
            };
            return Err(invalid(entity, &format!("identity.{field}"), reason));
        }
    }

    Ok(())
}

/// Path of the identity file backing `stem`, when it came from disk.
fn identity_file(tree: &VirtualTree, entity: &str, stem: &str) -> Option<String> {
    let dir = tree.entity_path(entity, IDENTITY_DIR);
    tree.files_under(&dir)
        .map(|(path, _)| path)
        .find(|path| file_stem(path) == stem)
        .cloned()
}

/// Parse `<entity>/deployment.json`. An absent, blank, `{}` or `null`
/// record means the entity was never deployed.
pub fn read_record(tree: &VirtualTree, entity: &str) -> Result<Option<DeploymentRecord>, CompileError> {
    let path = tree.entity_path(entity, DeploymentRecord::FILE_NAME);
    let Some(raw) = tree.get(&path) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| CompileError::InvalidRecord {
            entity: entity.to_string(),
            path: path.clone(),
            reason: e.to_string(),
        })?;
    if value.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| CompileError::InvalidRecord {
            entity: entity.to_string(),
            path,
            reason: e.to_string(),
        })
}

fn invalid(entity: &str, field: &str, reason: impl Into<String>) -> CompileError {
    CompileError::Validation {
        entity: entity.to_string(),
        field: field.to_string(),
        reason: reason.into(),
    }
}

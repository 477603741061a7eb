//! Bot definitions compiled from a definitions directory.
//!
//! A [`Definition`] is the validated, closed-shape representation of one
//! entity directory. A [`DeploymentRecord`] is the locally cached view of
//! the last successful deployment of that entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tree::file_name;

/// Token the hosting service substitutes with the user's search text.
///
/// Both dataset instructions must contain it.
pub const SEARCH_TOKEN: &str = "{search}";

/// A single skill ability: `<entity>/abilities/<name>/{instruction,description}.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Ability {
    pub name: String,
    pub description: String,
    pub instruction: String,
}

/// One file from `<entity>/dataset/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DatasetFile {
    /// Full virtual path. Only the base filename is sent to the hosting service.
    pub file_path: String,
    pub contents: String,
}

impl DatasetFile {
    /// Base filename presented to the hosting service (`faq.txt`).
    pub fn file_name(&self) -> &str {
        file_name(&self.file_path)
    }
}

/// Identity prompts from `<entity>/identity/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Identity {
    /// Bot backstory (system prompt).
    pub backstory: String,
    /// Dataset instruction used when a search matched records. Must contain `{search}`.
    pub matched: String,
    /// Dataset instruction used when nothing matched. Must contain `{search}`.
    pub mismatched: String,
}

/// A validated bot definition.
///
/// `name` is the entity's top-level directory name, never authored inside
/// the tree. The shape is closed: deserializing unknown fields fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Definition {
    pub name: String,
    pub abilities: Vec<Ability>,
    pub dataset_files: Vec<DatasetFile>,
    pub identity: Identity,
    pub deployment: Option<DeploymentRecord>,
}

impl Definition {
    /// Bot id from the cached deployment record, if any.
    pub fn recorded_bot_id(&self) -> Option<&str> {
        self.deployment.as_ref().map(|d| d.bot_id.as_str())
    }
}

/// The slices an entity contributes before validation.
///
/// Every field is optional: an entity may lack a subtree, and overlays
/// return only the fields they want to replace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abilities: Option<Vec<Ability>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_files: Option<Vec<DatasetFile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl PartialDefinition {
    /// Overlay `other` on top of `self`: every `Some` field in `other` wins.
    pub fn merge(mut self, other: PartialDefinition) -> PartialDefinition {
        if other.abilities.is_some() {
            self.abilities = other.abilities;
        }
        if other.dataset_files.is_some() {
            self.dataset_files = other.dataset_files;
        }
        if other.identity.is_some() {
            self.identity = other.identity;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.abilities.is_none() && self.dataset_files.is_none() && self.identity.is_none()
    }
}

/// Name and timestamp of a deployed ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeployedAbility {
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

/// Name and timestamp of a deployed dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeployedDatasetFile {
    pub file_name: String,
    pub updated_at: DateTime<Utc>,
}

/// Last known successful remote state, persisted as `deployment.json`.
///
/// Advisory cache only: the planner always re-verifies remote existence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeploymentRecord {
    pub bot_id: String,
    /// Qualified (namespaced) name at the time of deployment.
    pub name: String,
    pub updated_at: DateTime<Utc>,
    #[serde(alias = "skills")]
    pub abilities: Vec<DeployedAbility>,
    pub dataset_files: Vec<DeployedDatasetFile>,
}

impl DeploymentRecord {
    /// File name of the record inside an entity directory.
    pub const FILE_NAME: &'static str = "deployment.json";

    /// Build a fresh record for a definition that was just reconciled.
    pub fn for_definition(
        definition: &Definition,
        bot_id: impl Into<String>,
        qualified_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            name: qualified_name.into(),
            updated_at: now,
            abilities: definition
                .abilities
                .iter()
                .map(|a| DeployedAbility {
                    name: a.name.clone(),
                    updated_at: now,
                })
                .collect(),
            dataset_files: definition
                .dataset_files
                .iter()
                .map(|f| DeployedDatasetFile {
                    file_name: f.file_name().to_string(),
                    updated_at: now,
                })
                .collect(),
        }
    }
}

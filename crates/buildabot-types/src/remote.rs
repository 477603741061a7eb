//! Records and request payloads exchanged with the hosting service.
//!
//! Field names follow the hosting service's camelCase JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource kinds managed on the hosting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Bot,
    Dataset,
    Skillset,
    File,
    Ability,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Bot => write!(f, "bot"),
            ResourceKind::Dataset => write!(f, "dataset"),
            ResourceKind::Skillset => write!(f, "skillset"),
            ResourceKind::File => write!(f, "file"),
            ResourceKind::Ability => write!(f, "ability"),
        }
    }
}

/// Metadata tag attached to every resource this tool creates.
///
/// `origin` marks the resource as ours; `bot_id` names the owning bot so
/// secondary resources can be found without local state. Other keys the
/// service returns are ignored, and so are values of the wrong type: only
/// a literal `true` marks a resource as ours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    #[serde(
        rename = "buildABot",
        default,
        deserialize_with = "lenient::flag",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub origin: bool,
    #[serde(
        rename = "botId",
        default,
        deserialize_with = "lenient::string",
        skip_serializing_if = "Option::is_none"
    )]
    pub bot_id: Option<String>,
}

impl ResourceMeta {
    /// Tag for a bot itself (no owner yet).
    pub fn origin() -> Self {
        Self {
            origin: true,
            bot_id: None,
        }
    }

    /// Tag for a resource owned by `bot_id`.
    pub fn owned_by(bot_id: &str) -> Self {
        Self {
            origin: true,
            bot_id: Some(bot_id.to_string()),
        }
    }

    pub fn belongs_to(&self, bot_id: &str) -> bool {
        self.bot_id.as_deref() == Some(bot_id)
    }
}

/// A bot as returned by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBot {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::name")]
    pub name: String,
    #[serde(default)]
    pub backstory: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub skillset_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::meta")]
    pub meta: ResourceMeta,
}

/// Any other resource (dataset, skillset, file, ability) as listed remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResource {
    pub id: String,
    #[serde(default, deserialize_with = "lenient::name")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::meta")]
    pub meta: ResourceMeta,
}

/// Decoders for listed records that may belong to other tools.
///
/// A foreign resource with `null` or oddly typed fields must not fail the
/// whole list page, so these fall back to the empty value instead.
mod lenient {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    use super::ResourceMeta;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose<T> {
        Value(T),
        Other(IgnoredAny),
    }

    impl<T> Loose<T> {
        fn ok(self) -> Option<T> {
            match self {
                Loose::Value(value) => Some(value),
                Loose::Other(_) => None,
            }
        }
    }

    fn loose<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Loose::<T>::deserialize(deserializer)?.ok())
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(loose::<_, bool>(deserializer)?.unwrap_or_default())
    }

    pub fn string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        loose(deserializer)
    }

    pub fn name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(loose::<_, String>(deserializer)?.unwrap_or_default())
    }

    pub fn meta<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ResourceMeta, D::Error> {
        Ok(loose::<_, ResourceMeta>(deserializer)?.unwrap_or_default())
    }
}

/// The ids tying a bot to its dataset and skillset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRefs {
    pub bot_id: String,
    pub dataset_id: String,
    pub skillset_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSpec {
    pub name: String,
    pub description: String,
    pub backstory: String,
    pub model: String,
    pub meta: ResourceMeta,
}

/// Partial bot update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backstory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skillset_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSpec {
    pub name: String,
    pub description: String,
    pub store: String,
    pub match_instruction: String,
    pub mismatch_instruction: String,
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_instruction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch_instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsetSpec {
    pub name: String,
    pub description: String,
    pub meta: ResourceMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Metadata for a file record, created before its bytes are uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    pub name: String,
    pub description: String,
    pub meta: ResourceMeta,
}

/// How a file is attached to a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachKind {
    #[default]
    Source,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilitySpec {
    pub name: String,
    pub description: String,
    pub instruction: String,
    pub meta: ResourceMeta,
}

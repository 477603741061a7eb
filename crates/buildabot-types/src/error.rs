use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::{ReconcileState, ReportedError};
use crate::remote::ResourceKind;

/// Error categories shown in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Structural,
    Validation,
    Template,
    Planning,
    Remote,
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Structural => write!(f, "structural"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Template => write!(f, "template"),
            ErrorKind::Planning => write!(f, "planning"),
            ErrorKind::Remote => write!(f, "remote"),
            ErrorKind::Store => write!(f, "store"),
        }
    }
}

/// Errors raised while turning a definitions directory into definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("no definition files found under {root}")]
    EmptyTree { root: String },

    #[error("ability directory {dir} must contain exactly instruction.txt and description.txt (found: {found})")]
    MalformedAbility {
        entity: String,
        dir: String,
        found: String,
    },

    #[error("identity directory {dir} must contain exactly backstory.txt, matched.txt and mismatched.txt (found: {found})")]
    MalformedIdentity {
        entity: String,
        dir: String,
        found: String,
    },

    #[error("cannot read {path}: {reason}")]
    UnreadableFile {
        entity: String,
        path: String,
        reason: String,
    },

    #[error("undefined template variable '{key}' in {path}")]
    UndefinedVariable {
        entity: String,
        path: String,
        key: String,
    },

    #[error("build plugin for '{entity}' failed: {reason}")]
    Plugin { entity: String, reason: String },

    #[error("invalid definition '{entity}': {field} {reason}")]
    Validation {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("invalid deployment record {path}: {reason}")]
    InvalidRecord {
        entity: String,
        path: String,
        reason: String,
    },
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::EmptyTree { .. }
            | CompileError::MalformedAbility { .. }
            | CompileError::MalformedIdentity { .. }
            | CompileError::UnreadableFile { .. } => ErrorKind::Structural,
            CompileError::UndefinedVariable { .. } | CompileError::Plugin { .. } => {
                ErrorKind::Template
            }
            CompileError::Validation { .. } | CompileError::InvalidRecord { .. } => {
                ErrorKind::Validation
            }
        }
    }

    /// The entity this error belongs to, if any.
    pub fn entity(&self) -> Option<&str> {
        match self {
            CompileError::EmptyTree { .. } => None,
            CompileError::MalformedAbility { entity, .. }
            | CompileError::MalformedIdentity { entity, .. }
            | CompileError::UnreadableFile { entity, .. }
            | CompileError::UndefinedVariable { entity, .. }
            | CompileError::Plugin { entity, .. }
            | CompileError::Validation { entity, .. }
            | CompileError::InvalidRecord { entity, .. } => Some(entity),
        }
    }
}

/// Errors from hosting-service calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("bot '{bot_id}' has no {kind} attached")]
    MissingLink { bot_id: String, kind: ResourceKind },

    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        match self {
            RemoteError::NotFound { .. } => true,
            RemoteError::Status { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Errors that stop an entity before any mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("bot name '{name}' does not exist remotely; the deployment record of '{entity}' is stale and the update would fail")]
    StaleDeployment { entity: String, name: String },

    #[error("bot name '{name}' is already in use remotely; rename '{entity}' locally or remove the remote resource")]
    NameConflict { entity: String, name: String },

    #[error("'{entity}' and '{other}' both deploy as bot '{name}'; rename one of them")]
    DuplicateName {
        entity: String,
        other: String,
        name: String,
    },

    #[error("remote lookup failed: {0}")]
    Remote(#[from] RemoteError),
}

/// A remote failure during CREATE or UPDATE, with the step it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{state} failed: {source}")]
pub struct ReconcileError {
    pub state: ReconcileState,
    pub source: RemoteError,
    /// Whether compensating cleanup ran (CREATE only).
    pub compensated: bool,
}

/// Errors persisting a deployment record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("failed to serialize deployment record: {0}")]
    Serialize(String),

    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
}

/// Why one entity failed, across every stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("skipped after an earlier entity failed")]
    Aborted,
}

impl EntityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EntityError::Compile(e) => e.kind(),
            EntityError::Planning(PlanningError::Remote(_)) => ErrorKind::Remote,
            EntityError::Planning(_) | EntityError::Aborted => ErrorKind::Planning,
            EntityError::Reconcile(_) => ErrorKind::Remote,
            EntityError::Store(_) => ErrorKind::Store,
        }
    }

    pub fn to_reported(&self) -> ReportedError {
        ReportedError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_ability_names_directory() {
        let err = CompileError::MalformedAbility {
            entity: "support".to_string(),
            dir: "/defs/support/abilities/greet".to_string(),
            found: "instruction.txt".to_string(),
        };
        assert!(err.to_string().contains("/defs/support/abilities/greet"));
        assert_eq!(err.kind(), ErrorKind::Structural);
        assert_eq!(err.entity(), Some("support"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = CompileError::Validation {
            entity: "support".to_string(),
            field: "identity.matched".to_string(),
            reason: "must contain {search}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid definition 'support': identity.matched must contain {search}"
        );
    }

    #[test]
    fn test_entity_error_kinds() {
        let template: EntityError = CompileError::UndefinedVariable {
            entity: "a".to_string(),
            path: "/p".to_string(),
            key: "k".to_string(),
        }
        .into();
        assert_eq!(template.kind(), ErrorKind::Template);

        let conflict: EntityError = PlanningError::NameConflict {
            entity: "a".to_string(),
            name: "ns-a".to_string(),
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::Planning);

        let remote: EntityError = ReconcileError {
            state: ReconcileState::UploadingFiles,
            source: RemoteError::Rejected {
                operation: "file.upload".to_string(),
                message: "boom".to_string(),
            },
            compensated: true,
        }
        .into();
        assert_eq!(remote.kind(), ErrorKind::Remote);
        assert!(remote.to_string().contains("uploading dataset files"));
    }

    #[test]
    fn test_not_found_detection() {
        let status = RemoteError::Status {
            endpoint: "/bot/x/fetch".to_string(),
            status: 404,
            body: String::new(),
        };
        assert!(status.is_not_found());
        assert!(
            !RemoteError::Transport {
                endpoint: "e".to_string(),
                message: "m".to_string()
            }
            .is_not_found()
        );
    }
}

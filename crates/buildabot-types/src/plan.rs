//! Deployment plans, reconciliation states, and run reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::remote::{RemoteBot, RemoteResource};

/// Whether an entity is created from scratch or updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Update,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanAction::Create => write!(f, "create"),
            PlanAction::Update => write!(f, "update"),
        }
    }
}

/// The planner's decision for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPlan {
    pub entity: String,
    pub qualified_name: String,
    pub action: PlanAction,
    /// Remote bot id for updates.
    pub bot_id: Option<String>,
}

/// Steps of the per-entity reconciliation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    Pending,
    CreatingBot,
    CreatingDatasetAndSkillset,
    Attaching,
    UploadingFiles,
    CreatingAbilities,
    Renaming,
    UpdatingIdentity,
    DetachingFiles,
    RemovingAbilities,
    ReuploadingFiles,
    RecreatingAbilities,
    SyncingFiles,
    CompensatingCleanup,
    Done,
    Failed,
}

impl ReconcileState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReconcileState::Done | ReconcileState::Failed)
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReconcileState::Pending => "pending",
            ReconcileState::CreatingBot => "creating bot",
            ReconcileState::CreatingDatasetAndSkillset => "creating dataset and skillset",
            ReconcileState::Attaching => "attaching dataset and skillset",
            ReconcileState::UploadingFiles => "uploading dataset files",
            ReconcileState::CreatingAbilities => "creating abilities",
            ReconcileState::Renaming => "renaming",
            ReconcileState::UpdatingIdentity => "updating identity",
            ReconcileState::DetachingFiles => "detaching dataset files",
            ReconcileState::RemovingAbilities => "removing abilities",
            ReconcileState::ReuploadingFiles => "re-uploading dataset files",
            ReconcileState::RecreatingAbilities => "recreating abilities",
            ReconcileState::SyncingFiles => "syncing dataset files",
            ReconcileState::CompensatingCleanup => "compensating cleanup",
            ReconcileState::Done => "done",
            ReconcileState::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Final outcome of one entity in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityOutcome {
    Created,
    Updated,
    Failed,
    /// Not attempted because an earlier entity failed under the abort policy.
    Aborted,
}

impl fmt::Display for EntityOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityOutcome::Created => write!(f, "created"),
            EntityOutcome::Updated => write!(f, "updated"),
            EntityOutcome::Failed => write!(f, "failed"),
            EntityOutcome::Aborted => write!(f, "aborted"),
        }
    }
}

/// An error as shown in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Per-entity line of the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReport {
    pub entity: String,
    pub qualified_name: String,
    pub outcome: EntityOutcome,
    pub bot_id: Option<String>,
    pub error: Option<ReportedError>,
}

/// Everything one `deploy` invocation did.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reports: Vec<EntityReport>,
}

impl RunSummary {
    pub fn count(&self, outcome: EntityOutcome) -> usize {
        self.reports.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn has_failures(&self) -> bool {
        self.reports
            .iter()
            .any(|r| matches!(r.outcome, EntityOutcome::Failed | EntityOutcome::Aborted))
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// An ability listed under a skillset, kept with its parent for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedAbility {
    pub skillset_id: String,
    pub ability: RemoteResource,
}

/// Every origin-tagged resource found remotely, grouped by deletion tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownPlan {
    pub files: Vec<RemoteResource>,
    pub abilities: Vec<OwnedAbility>,
    pub datasets: Vec<RemoteResource>,
    pub skillsets: Vec<RemoteResource>,
    pub bots: Vec<RemoteBot>,
}

impl TeardownPlan {
    pub fn total(&self) -> usize {
        self.files.len()
            + self.abilities.len()
            + self.datasets.len()
            + self.skillsets.len()
            + self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Result of executing a [`TeardownPlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    pub deleted: usize,
    pub failures: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(entity: &str, outcome: EntityOutcome) -> EntityReport {
        EntityReport {
            entity: entity.to_string(),
            qualified_name: entity.to_string(),
            outcome,
            bot_id: None,
            error: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let now = Utc::now();
        let summary = RunSummary {
            run_id: Uuid::now_v7(),
            started_at: now,
            finished_at: now + chrono::Duration::milliseconds(1500),
            reports: vec![
                report("a", EntityOutcome::Created),
                report("b", EntityOutcome::Updated),
                report("c", EntityOutcome::Created),
            ],
        };
        assert_eq!(summary.count(EntityOutcome::Created), 2);
        assert!(!summary.has_failures());
        assert!((summary.duration_secs() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aborted_counts_as_failure() {
        let now = Utc::now();
        let summary = RunSummary {
            run_id: Uuid::now_v7(),
            started_at: now,
            finished_at: now,
            reports: vec![report("a", EntityOutcome::Aborted)],
        };
        assert!(summary.has_failures());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ReconcileState::Done.is_terminal());
        assert!(ReconcileState::Failed.is_terminal());
        assert!(!ReconcileState::UploadingFiles.is_terminal());
    }

    #[test]
    fn test_plan_action_display() {
        assert_eq!(PlanAction::Create.to_string(), "create");
        assert_eq!(EntityOutcome::Updated.to_string(), "updated");
    }
}

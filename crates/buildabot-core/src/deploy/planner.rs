//! Deployment planner.
//!
//! Decides CREATE or UPDATE for one definition by asking the hosting
//! service, never by trusting the local deployment record alone, and
//! refuses to proceed when the intended name collides with live state.

use std::collections::HashSet;

use futures_util::future::try_join3;

use buildabot_types::definition::Definition;
use buildabot_types::error::{PlanningError, RemoteError};
use buildabot_types::plan::{DeploymentPlan, PlanAction};

use super::context::ReconcileContext;
use crate::remote::RemoteService;

/// Plan one definition. Makes no mutating calls.
pub async fn plan<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
) -> Result<DeploymentPlan, PlanningError> {
    let entity = definition.name.as_str();
    let qualified = ctx.namespace().qualify(entity);

    let existing = match definition.recorded_bot_id() {
        Some(id) => ctx.lookup(id).await?,
        None => None,
    };

    let live = live_names(ctx.remote()).await?;

    let stale = |name: &str| PlanningError::StaleDeployment {
        entity: entity.to_string(),
        name: name.to_string(),
    };
    let conflict = |name: &str| PlanningError::NameConflict {
        entity: entity.to_string(),
        name: name.to_string(),
    };

    let plan = match (existing, &definition.deployment) {
        (Some(bot), Some(record)) => {
            if record.name == qualified {
                if !live.contains(&qualified) {
                    return Err(stale(&qualified));
                }
            } else {
                // renamed locally since the last deploy
                if !live.contains(&record.name) {
                    return Err(stale(&record.name));
                }
                if live.contains(&qualified) {
                    return Err(conflict(&qualified));
                }
            }
            DeploymentPlan {
                entity: entity.to_string(),
                qualified_name: qualified,
                action: PlanAction::Update,
                bot_id: Some(bot.id),
            }
        }
        (_, record) => {
            if live.contains(&qualified) {
                return Err(if record.is_some() {
                    stale(&qualified)
                } else {
                    conflict(&qualified)
                });
            }
            DeploymentPlan {
                entity: entity.to_string(),
                qualified_name: qualified,
                action: PlanAction::Create,
                bot_id: None,
            }
        }
    };

    tracing::debug!(
        entity,
        action = %plan.action,
        name = %plan.qualified_name,
        "Planned deployment"
    );
    Ok(plan)
}

/// Names of every live bot, dataset and skillset.
///
/// Lists everything on each call; there is no server-side name lookup.
pub async fn live_names<R: RemoteService>(remote: &R) -> Result<HashSet<String>, RemoteError> {
    let (bots, datasets, skillsets) =
        try_join3(remote.list_bots(), remote.list_datasets(), remote.list_skillsets()).await?;

    Ok(bots
        .into_iter()
        .map(|b| b.name)
        .chain(datasets.into_iter().map(|d| d.name))
        .chain(skillsets.into_iter().map(|s| s.name))
        .collect())
}

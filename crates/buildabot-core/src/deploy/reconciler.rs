//! Resource reconciler.
//!
//! Runs the CREATE or UPDATE protocol for one planned definition. Each
//! entity's steps are strictly ordered; only the dataset and skillset
//! creation run concurrently. Secondary resources (files, abilities) are
//! always removed before primary ones (dataset, skillset), and primary ones
//! before the bot.

use std::future::Future;

use futures_util::future::join;

use buildabot_types::definition::Definition;
use buildabot_types::error::{ReconcileError, RemoteError};
use buildabot_types::plan::{DeploymentPlan, PlanAction, ReconcileState};
use buildabot_types::remote::{
    AbilitySpec, AttachKind, BotSpec, BotUpdate, DatasetSpec, DatasetUpdate, FileSpec,
    RemoteResource, ResourceKind, ResourceMeta, SkillsetSpec, SkillsetUpdate,
};

use super::context::ReconcileContext;
use crate::remote::RemoteService;

const BOT_DESCRIPTION: &str = "A bot managed by build-a-bot";
const DATASET_DESCRIPTION: &str = "A dataset managed by build-a-bot";
const SKILLSET_DESCRIPTION: &str = "A skillset managed by build-a-bot";
const FILE_DESCRIPTION: &str = "A file managed by build-a-bot";

/// A failed remote call and the step it belonged to.
struct StepError {
    state: ReconcileState,
    source: RemoteError,
}

fn at(state: ReconcileState) -> impl FnOnce(RemoteError) -> StepError {
    move |source| StepError { state, source }
}

fn enter(entity: &str, state: ReconcileState) {
    tracing::debug!(entity, state = %state, "Reconcile step");
}

/// Execute a plan. Returns the bot id on success.
pub async fn reconcile<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
    plan: &DeploymentPlan,
) -> Result<String, ReconcileError> {
    let result = match (plan.action, plan.bot_id.as_deref()) {
        (PlanAction::Create, _) => create(ctx, definition, &plan.qualified_name).await,
        (PlanAction::Update, Some(bot_id)) => update(ctx, definition, &plan.qualified_name, bot_id)
            .await
            .map(|()| bot_id.to_string()),
        (PlanAction::Update, None) => Err(ReconcileError {
            state: ReconcileState::Pending,
            source: RemoteError::Rejected {
                operation: "update".to_string(),
                message: "plan has no bot id".to_string(),
            },
            compensated: false,
        }),
    };

    match &result {
        Ok(bot_id) => {
            enter(&definition.name, ReconcileState::Done);
            tracing::info!(entity = %definition.name, bot_id = %bot_id, action = %plan.action, "Reconciled");
        }
        Err(e) => {
            enter(&definition.name, ReconcileState::Failed);
            tracing::warn!(entity = %definition.name, error = %e, "Reconcile failed");
        }
    }
    result
}

// ---------------------------------------------------------------------------
// CREATE
// ---------------------------------------------------------------------------

/// Everything the CREATE protocol has created so far.
#[derive(Debug, Default)]
struct Created {
    bot_id: Option<String>,
    dataset_id: Option<String>,
    skillset_id: Option<String>,
    files: Vec<String>,
}

async fn create<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
    name: &str,
) -> Result<String, ReconcileError> {
    let mut created = Created::default();
    match create_steps(ctx, definition, name, &mut created).await {
        Ok(bot_id) => Ok(bot_id),
        Err(StepError { state, source }) => {
            let compensated = created.bot_id.is_some();
            if let Some(bot_id) = &created.bot_id {
                compensate(ctx, &definition.name, bot_id, &created).await;
            }
            Err(ReconcileError {
                state,
                source,
                compensated,
            })
        }
    }
}

async fn create_steps<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
    name: &str,
    created: &mut Created,
) -> Result<String, StepError> {
    let entity = definition.name.as_str();
    let remote = ctx.remote();
    let identity = &definition.identity;

    enter(entity, ReconcileState::CreatingBot);
    let bot_id = remote
        .create_bot(&BotSpec {
            name: name.to_string(),
            description: BOT_DESCRIPTION.to_string(),
            backstory: identity.backstory.clone(),
            model: ctx.model().to_string(),
            meta: ResourceMeta::origin(),
        })
        .await
        .map_err(at(ReconcileState::CreatingBot))?;
    created.bot_id = Some(bot_id.clone());
    tracing::info!(entity, bot_id = %bot_id, name, "Created bot");

    enter(entity, ReconcileState::CreatingDatasetAndSkillset);
    let dataset_spec = DatasetSpec {
        name: name.to_string(),
        description: DATASET_DESCRIPTION.to_string(),
        store: ctx.dataset_store().to_string(),
        match_instruction: identity.matched.clone(),
        mismatch_instruction: identity.mismatched.clone(),
        meta: ResourceMeta::owned_by(&bot_id),
    };
    let skillset_spec = SkillsetSpec {
        name: name.to_string(),
        description: SKILLSET_DESCRIPTION.to_string(),
        meta: ResourceMeta::owned_by(&bot_id),
    };
    let (dataset, skillset) = join(
        remote.create_dataset(&dataset_spec),
        remote.create_skillset(&skillset_spec),
    )
    .await;
    created.dataset_id = dataset.as_ref().ok().cloned();
    created.skillset_id = skillset.as_ref().ok().cloned();
    let dataset_id = dataset.map_err(at(ReconcileState::CreatingDatasetAndSkillset))?;
    let skillset_id = skillset.map_err(at(ReconcileState::CreatingDatasetAndSkillset))?;

    enter(entity, ReconcileState::Attaching);
    remote
        .update_bot(
            &bot_id,
            &BotUpdate {
                dataset_id: Some(dataset_id.clone()),
                skillset_id: Some(skillset_id.clone()),
                ..Default::default()
            },
        )
        .await
        .map_err(at(ReconcileState::Attaching))?;
    ctx.invalidate(&bot_id);

    upload_files(
        ctx,
        definition,
        &bot_id,
        &dataset_id,
        ReconcileState::UploadingFiles,
        &mut created.files,
    )
    .await?;
    create_abilities(
        ctx,
        definition,
        &bot_id,
        &skillset_id,
        ReconcileState::CreatingAbilities,
    )
    .await?;
    sync_files(ctx, entity, &dataset_id).await?;

    Ok(bot_id)
}

/// Best-effort removal of everything a failed CREATE left behind.
///
/// Resources are located by owner tag as well as by the ids we saw, so a
/// create whose response was lost is still cleaned up. Failures are logged
/// and never stop the next step.
async fn compensate<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    entity: &str,
    bot_id: &str,
    created: &Created,
) {
    enter(entity, ReconcileState::CompensatingCleanup);
    tracing::warn!(entity, bot_id, "Cleaning up incomplete bot");
    let remote = ctx.remote();
    ctx.invalidate(bot_id);

    let files = tagged(entity, bot_id, ResourceKind::File, created.files.clone(), remote.list_files()).await;
    for id in &files {
        cleanup_step(entity, bot_id, ResourceKind::File, id, remote.delete_file(id)).await;
    }

    let skillsets = tagged(
        entity,
        bot_id,
        ResourceKind::Skillset,
        created.skillset_id.clone(),
        remote.list_skillsets(),
    )
    .await;
    for id in &skillsets {
        cleanup_step(entity, bot_id, ResourceKind::Skillset, id, remote.delete_skillset(id)).await;
    }

    let datasets = tagged(
        entity,
        bot_id,
        ResourceKind::Dataset,
        created.dataset_id.clone(),
        remote.list_datasets(),
    )
    .await;
    for id in &datasets {
        cleanup_step(entity, bot_id, ResourceKind::Dataset, id, remote.delete_dataset(id)).await;
    }

    cleanup_step(entity, bot_id, ResourceKind::Bot, bot_id, remote.delete_bot(bot_id)).await;
}

/// Known ids plus every listed resource tagged with `bot_id`.
async fn tagged<F>(
    entity: &str,
    bot_id: &str,
    kind: ResourceKind,
    known: impl IntoIterator<Item = String>,
    listing: F,
) -> Vec<String>
where
    F: Future<Output = Result<Vec<RemoteResource>, RemoteError>>,
{
    let mut ids: Vec<String> = known.into_iter().collect();
    match listing.await {
        Ok(items) => {
            for item in items {
                if item.meta.belongs_to(bot_id) && !ids.contains(&item.id) {
                    ids.push(item.id);
                }
            }
        }
        Err(e) => {
            tracing::error!(entity, bot_id, kind = %kind, error = %e, "Failed to list resources for cleanup");
        }
    }
    ids
}

async fn cleanup_step<F>(entity: &str, bot_id: &str, kind: ResourceKind, id: &str, delete: F)
where
    F: Future<Output = Result<(), RemoteError>>,
{
    match delete.await {
        Ok(()) => tracing::warn!(entity, bot_id, kind = %kind, id, "Force removed"),
        Err(e) => {
            tracing::error!(entity, bot_id, kind = %kind, id, error = %e, "Failed to remove during cleanup")
        }
    }
}

// ---------------------------------------------------------------------------
// UPDATE
// ---------------------------------------------------------------------------

async fn update<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
    name: &str,
    bot_id: &str,
) -> Result<(), ReconcileError> {
    update_steps(ctx, definition, name, bot_id)
        .await
        .map_err(|StepError { state, source }| ReconcileError {
            state,
            source,
            compensated: false,
        })
}

async fn update_steps<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
    name: &str,
    bot_id: &str,
) -> Result<(), StepError> {
    let entity = definition.name.as_str();
    let remote = ctx.remote();
    let identity = &definition.identity;

    ctx.invalidate(bot_id);
    let bot = ctx.get(bot_id).await.map_err(at(ReconcileState::Pending))?;
    let refs = ctx.refs(bot_id).await.map_err(at(ReconcileState::Pending))?;

    if bot.name != name {
        enter(entity, ReconcileState::Renaming);
        tracing::info!(entity, bot_id, from = %bot.name, to = name, "Renaming bot");
        let rename = Some(name.to_string());
        remote
            .update_bot(
                bot_id,
                &BotUpdate {
                    name: rename.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(at(ReconcileState::Renaming))?;
        ctx.invalidate(bot_id);
        remote
            .update_dataset(
                &refs.dataset_id,
                &DatasetUpdate {
                    name: rename.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(at(ReconcileState::Renaming))?;
        remote
            .update_skillset(&refs.skillset_id, &SkillsetUpdate { name: rename })
            .await
            .map_err(at(ReconcileState::Renaming))?;
    }

    enter(entity, ReconcileState::UpdatingIdentity);
    remote
        .update_dataset(
            &refs.dataset_id,
            &DatasetUpdate {
                match_instruction: Some(identity.matched.clone()),
                mismatch_instruction: Some(identity.mismatched.clone()),
                ..Default::default()
            },
        )
        .await
        .map_err(at(ReconcileState::UpdatingIdentity))?;
    remote
        .update_bot(
            bot_id,
            &BotUpdate {
                backstory: Some(identity.backstory.clone()),
                ..Default::default()
            },
        )
        .await
        .map_err(at(ReconcileState::UpdatingIdentity))?;
    ctx.invalidate(bot_id);

    enter(entity, ReconcileState::DetachingFiles);
    let owned: Vec<RemoteResource> = remote
        .list_files()
        .await
        .map_err(at(ReconcileState::DetachingFiles))?
        .into_iter()
        .filter(|f| f.meta.belongs_to(bot_id))
        .collect();
    tracing::debug!(entity, bot_id, count = owned.len(), "Detaching dataset files");
    for file in &owned {
        remote
            .delete_file(&file.id)
            .await
            .map_err(at(ReconcileState::DetachingFiles))?;
    }

    enter(entity, ReconcileState::RemovingAbilities);
    let abilities = remote
        .list_abilities(&refs.skillset_id)
        .await
        .map_err(at(ReconcileState::RemovingAbilities))?;
    for ability in &abilities {
        tracing::debug!(entity, ability = %ability.name, "Removing ability");
        remote
            .delete_ability(&refs.skillset_id, &ability.id)
            .await
            .map_err(at(ReconcileState::RemovingAbilities))?;
    }

    let mut uploaded = Vec::new();
    upload_files(
        ctx,
        definition,
        bot_id,
        &refs.dataset_id,
        ReconcileState::ReuploadingFiles,
        &mut uploaded,
    )
    .await?;
    create_abilities(
        ctx,
        definition,
        bot_id,
        &refs.skillset_id,
        ReconcileState::RecreatingAbilities,
    )
    .await?;
    sync_files(ctx, entity, &refs.dataset_id).await
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

/// Create, upload and attach each dataset file, one at a time.
async fn upload_files<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
    bot_id: &str,
    dataset_id: &str,
    state: ReconcileState,
    created: &mut Vec<String>,
) -> Result<(), StepError> {
    enter(&definition.name, state);
    let remote = ctx.remote();

    for file in &definition.dataset_files {
        let file_name = file.file_name();
        tracing::debug!(entity = %definition.name, file = file_name, "Uploading dataset file");

        let file_id = remote
            .create_file(&FileSpec {
                name: file_name.to_string(),
                description: FILE_DESCRIPTION.to_string(),
                meta: ResourceMeta::owned_by(bot_id),
            })
            .await
            .map_err(at(state))?;
        created.push(file_id.clone());

        remote
            .upload_file(&file_id, file_name, file.contents.as_bytes())
            .await
            .map_err(at(state))?;
        remote
            .attach_file(dataset_id, &file_id, AttachKind::Source)
            .await
            .map_err(at(state))?;
    }
    Ok(())
}

/// Create each ability under the skillset, one at a time.
async fn create_abilities<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
    bot_id: &str,
    skillset_id: &str,
    state: ReconcileState,
) -> Result<(), StepError> {
    enter(&definition.name, state);
    for ability in &definition.abilities {
        tracing::debug!(entity = %definition.name, ability = %ability.name, "Creating ability");
        ctx.remote()
            .create_ability(
                skillset_id,
                &AbilitySpec {
                    name: ability.name.clone(),
                    description: ability.description.clone(),
                    instruction: ability.instruction.clone(),
                    meta: ResourceMeta::owned_by(bot_id),
                },
            )
            .await
            .map_err(at(state))?;
    }
    Ok(())
}

/// Ask the service to index every file attached to the dataset.
async fn sync_files<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    entity: &str,
    dataset_id: &str,
) -> Result<(), StepError> {
    enter(entity, ReconcileState::SyncingFiles);
    let remote = ctx.remote();
    let files = remote
        .list_dataset_files(dataset_id)
        .await
        .map_err(at(ReconcileState::SyncingFiles))?;
    for file in &files {
        remote
            .sync_dataset_file(dataset_id, &file.id)
            .await
            .map_err(at(ReconcileState::SyncingFiles))?;
    }
    Ok(())
}

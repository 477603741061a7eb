//! Per-run deployment pipeline.
//!
//! Plans, reconciles and records every compiled definition. Entities run
//! concurrently (bounded by `max_concurrent_entities`) and are isolated:
//! one entity's failure never changes another's outcome, except that under
//! [`FailurePolicy::Abort`] entities that have not started yet are skipped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use tracing::Instrument;
use uuid::Uuid;

use buildabot_types::config::{DeployConfig, FailurePolicy};
use buildabot_types::definition::{Definition, DeploymentRecord};
use buildabot_types::config::Namespace;
use buildabot_types::error::{EntityError, PlanningError};
use buildabot_types::plan::{EntityOutcome, EntityReport, PlanAction, RunSummary};

use super::context::ReconcileContext;
use super::record::DeploymentStore;
use super::{planner, reconciler};
use crate::compiler::CompileOutput;
use crate::remote::RemoteService;

/// Deploy every definition in `compiled` and report per entity.
pub async fn deploy<R, S>(
    remote: &R,
    store: &S,
    config: &DeployConfig,
    compiled: &CompileOutput,
) -> RunSummary
where
    R: RemoteService,
    S: DeploymentStore,
{
    let started_at = Utc::now();
    let run_id = Uuid::now_v7();
    let ctx = ReconcileContext::new(remote, config);
    let abort = config.failure_policy == FailurePolicy::Abort;

    tracing::info!(
        run_id = %run_id,
        entities = compiled.definitions.len(),
        rejected = compiled.failures.len(),
        namespace = ctx.namespace().prefix(),
        "Starting deployment run"
    );

    let mut reports: Vec<EntityReport> = compiled
        .failures
        .iter()
        .map(|(entity, err)| EntityReport {
            entity: entity.clone(),
            qualified_name: ctx.namespace().qualify(entity),
            outcome: EntityOutcome::Failed,
            bot_id: None,
            error: Some(EntityError::from(err.clone()).to_reported()),
        })
        .collect();

    let duplicates = duplicate_names(ctx.namespace(), compiled);
    for (entity, err) in &duplicates {
        tracing::warn!(entity = %entity, error = %err, "Qualified name collision");
        if let Some(definition) = compiled.definitions.get(*entity) {
            reports.push(report(&ctx, definition, Err(err.clone().into())));
        }
    }

    let stop = AtomicBool::new(abort && !(compiled.failures.is_empty() && duplicates.is_empty()));
    let ctx = &ctx;
    let stop = &stop;

    let deployed: Vec<EntityReport> = stream::iter(compiled.definitions.values())
        .filter(|definition| std::future::ready(!duplicates.contains_key(definition.name.as_str())))
        .map(move |definition| {
            let span = tracing::info_span!("entity", entity = %definition.name);
            async move {
                if stop.load(Ordering::SeqCst) {
                    tracing::warn!("Skipped after an earlier failure");
                    return report(ctx, definition, Err(EntityError::Aborted));
                }
                let result = deploy_entity(ctx, store, definition).await;
                if result.is_err() && abort {
                    stop.store(true, Ordering::SeqCst);
                }
                report(ctx, definition, result)
            }
            .instrument(span)
        })
        .buffer_unordered(config.max_concurrent_entities.max(1))
        .collect()
        .await;

    reports.extend(deployed);
    reports.sort_by(|a, b| a.entity.cmp(&b.entity));

    let summary = RunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        reports,
    };
    tracing::info!(
        run_id = %run_id,
        created = summary.count(EntityOutcome::Created),
        updated = summary.count(EntityOutcome::Updated),
        failed = summary.count(EntityOutcome::Failed),
        aborted = summary.count(EntityOutcome::Aborted),
        "Deployment run finished"
    );
    summary
}

/// Entities whose names qualify to the same bot name as another entity.
///
/// `qualify` is idempotent, so `acme-support` and `support` collide under
/// namespace `acme`. Every party to a collision is rejected.
fn duplicate_names<'a>(
    namespace: &Namespace,
    compiled: &'a CompileOutput,
) -> BTreeMap<&'a str, PlanningError> {
    let mut by_name: BTreeMap<String, Vec<&'a str>> = BTreeMap::new();
    for entity in compiled.definitions.keys() {
        by_name
            .entry(namespace.qualify(entity))
            .or_default()
            .push(entity.as_str());
    }

    let mut duplicates = BTreeMap::new();
    for (name, entities) in by_name.into_iter().filter(|(_, e)| e.len() > 1) {
        for &entity in &entities {
            let other = entities.iter().find(|&&e| e != entity).copied().unwrap_or(entity);
            duplicates.insert(
                entity,
                PlanningError::DuplicateName {
                    entity: entity.to_string(),
                    other: other.to_string(),
                    name: name.clone(),
                },
            );
        }
    }
    duplicates
}

/// Plan, reconcile and record one entity.
async fn deploy_entity<R, S>(
    ctx: &ReconcileContext<'_, R>,
    store: &S,
    definition: &Definition,
) -> Result<(PlanAction, String), EntityError>
where
    R: RemoteService,
    S: DeploymentStore,
{
    let plan = planner::plan(ctx, definition).await?;
    let bot_id = reconciler::reconcile(ctx, definition, &plan).await?;

    let record =
        DeploymentRecord::for_definition(definition, &bot_id, &plan.qualified_name, Utc::now());
    store.save(&definition.name, &record).await?;
    tracing::debug!(entity = %definition.name, "Wrote deployment record");

    Ok((plan.action, bot_id))
}

fn report<R: RemoteService>(
    ctx: &ReconcileContext<'_, R>,
    definition: &Definition,
    result: Result<(PlanAction, String), EntityError>,
) -> EntityReport {
    let qualified_name = ctx.namespace().qualify(&definition.name);
    match result {
        Ok((action, bot_id)) => EntityReport {
            entity: definition.name.clone(),
            qualified_name,
            outcome: match action {
                PlanAction::Create => EntityOutcome::Created,
                PlanAction::Update => EntityOutcome::Updated,
            },
            bot_id: Some(bot_id),
            error: None,
        },
        Err(err) => EntityReport {
            entity: definition.name.clone(),
            qualified_name,
            outcome: match err {
                EntityError::Aborted => EntityOutcome::Aborted,
                _ => EntityOutcome::Failed,
            },
            bot_id: definition.recorded_bot_id().map(str::to_string),
            error: Some(err.to_reported()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildabot_types::error::ErrorKind;
    use buildabot_types::remote::ResourceMeta;
    use buildabot_types::tree::VirtualTree;

    use crate::compiler::compile;
    use crate::compiler::plugins::PluginRegistry;
    use crate::deploy::record::InMemoryDeploymentStore;
    use crate::remote::memory::InMemoryRemote;

    const SUPPORT: [(&str, &str); 6] = [
        ("support/dataset/faq.txt", "Answer: {search}"),
        ("support/abilities/greet/instruction.txt", "Say hi"),
        ("support/abilities/greet/description.txt", "Greets"),
        ("support/identity/backstory.txt", "You help."),
        ("support/identity/matched.txt", "Use: {search}"),
        ("support/identity/mismatched.txt", "None: {search}"),
    ];

    fn support_tree() -> VirtualTree {
        VirtualTree::from_relative("/defs", SUPPORT)
    }

    fn with_entity(mut tree: VirtualTree, entity: &str) -> VirtualTree {
        for (path, content) in SUPPORT {
            let rest = path.trim_start_matches("support/");
            tree.insert(format!("/defs/{entity}/{rest}"), content);
        }
        tree
    }

    fn compiled(tree: VirtualTree) -> CompileOutput {
        compile(tree, &PluginRegistry::new()).unwrap()
    }

    fn with_record(mut tree: VirtualTree, store: &InMemoryDeploymentStore) -> VirtualTree {
        let record = store.get("support").unwrap();
        tree.insert(
            "/defs/support/deployment.json",
            serde_json::to_string_pretty(&record).unwrap(),
        );
        tree
    }

    #[tokio::test]
    async fn test_first_run_creates_and_records() {
        let remote = InMemoryRemote::new();
        let store = InMemoryDeploymentStore::new();
        let config = DeployConfig::default();

        let summary = deploy(&remote, &store, &config, &compiled(support_tree())).await;

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].outcome, EntityOutcome::Created);
        assert!(!summary.has_failures());

        assert_eq!(remote.bots().len(), 1);
        assert_eq!(remote.datasets().len(), 1);
        assert_eq!(remote.datasets()[0].attached.len(), 1);
        assert_eq!(remote.skillsets().len(), 1);
        assert_eq!(remote.abilities(&remote.skillsets()[0].id).len(), 1);

        let record = store.get("support").unwrap();
        assert_eq!(record.bot_id, remote.bots()[0].id);
        assert_eq!(record.abilities.len(), 1);
        assert_eq!(record.abilities[0].name, "greet");
        assert_eq!(record.dataset_files.len(), 1);
        assert_eq!(record.dataset_files[0].file_name, "faq.txt");
    }

    #[tokio::test]
    async fn test_second_run_updates_without_duplicates() {
        let remote = InMemoryRemote::new();
        let store = InMemoryDeploymentStore::new();
        let config = DeployConfig::default();
        deploy(&remote, &store, &config, &compiled(support_tree())).await;
        let first_bot = store.get("support").unwrap().bot_id;

        remote.reset_calls();
        let tree = with_record(support_tree(), &store);
        let summary = deploy(&remote, &store, &config, &compiled(tree)).await;

        assert_eq!(summary.reports[0].outcome, EntityOutcome::Updated);
        assert_eq!(summary.reports[0].bot_id.as_deref(), Some(first_bot.as_str()));
        assert_eq!(remote.call_count("bot.create"), 0);
        assert_eq!(remote.call_count("file.delete"), 1);
        assert_eq!(remote.call_count("dataset.file.attach"), 1);

        assert_eq!(remote.bots().len(), 1);
        assert_eq!(remote.files().len(), 1);
        assert_eq!(remote.datasets()[0].attached.len(), 1);
        let abilities = remote.abilities(&remote.skillsets()[0].id);
        assert_eq!(abilities.len(), 1);
        assert_eq!(abilities[0].name, "greet");
        assert_eq!(store.get("support").unwrap().bot_id, first_bot);
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_nothing_behind() {
        let remote = InMemoryRemote::new();
        remote.fail_on("file.upload", 1);
        let store = InMemoryDeploymentStore::new();
        let config = DeployConfig::default();

        let summary = deploy(&remote, &store, &config, &compiled(support_tree())).await;

        let report = &summary.reports[0];
        assert_eq!(report.outcome, EntityOutcome::Failed);
        assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::Remote);
        assert!(remote.bots().is_empty());
        assert!(remote.datasets().is_empty());
        assert!(remote.skillsets().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_compile_failures_are_reported() {
        let mut tree = support_tree();
        tree.insert("/defs/broken/abilities/greet/instruction.txt", "only one file");
        let remote = InMemoryRemote::new();
        let store = InMemoryDeploymentStore::new();

        let summary = deploy(&remote, &store, &DeployConfig::default(), &compiled(tree)).await;

        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.reports[0].entity, "broken");
        assert_eq!(summary.reports[0].outcome, EntityOutcome::Failed);
        assert_eq!(
            summary.reports[0].error.as_ref().unwrap().kind,
            ErrorKind::Structural
        );
        assert_eq!(summary.reports[1].outcome, EntityOutcome::Created);
    }

    #[tokio::test]
    async fn test_continue_policy_keeps_going() {
        let remote = InMemoryRemote::new();
        remote.seed_bot("alpha", ResourceMeta::default());
        let store = InMemoryDeploymentStore::new();
        let config = DeployConfig {
            max_concurrent_entities: 1,
            ..Default::default()
        };
        let tree = with_entity(with_entity(VirtualTree::new("/defs"), "alpha"), "beta");

        let summary = deploy(&remote, &store, &config, &compiled(tree)).await;

        assert_eq!(summary.reports[0].outcome, EntityOutcome::Failed);
        assert_eq!(
            summary.reports[0].error.as_ref().unwrap().kind,
            ErrorKind::Planning
        );
        assert_eq!(summary.reports[1].outcome, EntityOutcome::Created);
    }

    #[tokio::test]
    async fn test_abort_policy_skips_remaining_entities() {
        let remote = InMemoryRemote::new();
        remote.seed_bot("alpha", ResourceMeta::default());
        let store = InMemoryDeploymentStore::new();
        let config = DeployConfig {
            max_concurrent_entities: 1,
            failure_policy: FailurePolicy::Abort,
            ..Default::default()
        };
        let tree = with_entity(with_entity(VirtualTree::new("/defs"), "alpha"), "beta");

        let summary = deploy(&remote, &store, &config, &compiled(tree)).await;

        assert_eq!(summary.reports[0].outcome, EntityOutcome::Failed);
        assert_eq!(summary.reports[1].outcome, EntityOutcome::Aborted);
        assert_eq!(remote.call_count("bot.create"), 0);
        assert!(summary.has_failures());
    }

    #[tokio::test]
    async fn test_namespace_is_applied_to_remote_names() {
        let remote = InMemoryRemote::new();
        let store = InMemoryDeploymentStore::new();
        let config = DeployConfig {
            namespace: Some("acme".to_string()),
            ..Default::default()
        };

        let summary = deploy(&remote, &store, &config, &compiled(support_tree())).await;

        assert_eq!(summary.reports[0].qualified_name, "acme-support");
        assert_eq!(remote.bots()[0].name, "acme-support");
        assert_eq!(store.get("support").unwrap().name, "acme-support");
    }

    #[tokio::test]
    async fn test_colliding_qualified_names_are_rejected() {
        let remote = InMemoryRemote::new();
        let store = InMemoryDeploymentStore::new();
        let config = DeployConfig {
            namespace: Some("acme".to_string()),
            ..Default::default()
        };
        let tree = with_entity(with_entity(support_tree(), "acme-support"), "sales");

        let summary = deploy(&remote, &store, &config, &compiled(tree)).await;

        assert_eq!(summary.reports.len(), 3);
        for entity in ["acme-support", "support"] {
            let report = summary.reports.iter().find(|r| r.entity == entity).unwrap();
            assert_eq!(report.outcome, EntityOutcome::Failed);
            assert_eq!(report.qualified_name, "acme-support");
            assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::Planning);
        }
        let sales = summary.reports.iter().find(|r| r.entity == "sales").unwrap();
        assert_eq!(sales.outcome, EntityOutcome::Created);

        assert_eq!(remote.bots().len(), 1);
        assert_eq!(remote.bots()[0].name, "acme-sales");
        assert!(store.get("support").is_none());
    }
}

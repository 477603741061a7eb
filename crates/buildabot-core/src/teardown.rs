//! Teardown of everything this tool created remotely.
//!
//! Resources are found by origin tag, never by local records, and deleted
//! in tiers: files and abilities, then datasets and skillsets, then bots.
//! A tier starts only after the previous one has finished.

use std::collections::HashSet;
use std::future::Future;

use futures_util::future::{join, join_all, try_join_all, try_join4};

use buildabot_types::config::Namespace;
use buildabot_types::error::RemoteError;
use buildabot_types::plan::{OwnedAbility, TeardownPlan, TeardownReport};
use buildabot_types::remote::{RemoteResource, ResourceKind};

use crate::remote::RemoteService;

/// Collect every origin-tagged resource.
///
/// With `namespace`, only bots whose name carries the namespace prefix are
/// selected, together with the resources they own.
pub async fn plan_teardown<R: RemoteService>(
    remote: &R,
    namespace: Option<&Namespace>,
) -> Result<TeardownPlan, RemoteError> {
    let (bots, datasets, skillsets, files) = try_join4(
        remote.list_bots(),
        remote.list_datasets(),
        remote.list_skillsets(),
        remote.list_files(),
    )
    .await?;

    let in_scope = |name: &str| namespace.is_none_or(|ns| ns.owns(name));

    let bots: Vec<_> = bots
        .into_iter()
        .filter(|b| b.meta.origin && in_scope(&b.name))
        .collect();
    let bot_ids: HashSet<&str> = bots.iter().map(|b| b.id.as_str()).collect();

    let owned = |r: &RemoteResource| {
        if !r.meta.origin {
            return false;
        }
        match namespace {
            None => true,
            Some(ns) => {
                ns.owns(&r.name)
                    || r.meta.bot_id.as_deref().is_some_and(|id| bot_ids.contains(id))
            }
        }
    };

    let datasets: Vec<_> = datasets.into_iter().filter(|r| owned(r)).collect();
    let skillsets: Vec<_> = skillsets.into_iter().filter(|r| owned(r)).collect();
    let files: Vec<_> = files.into_iter().filter(|r| owned(r)).collect();

    let abilities = try_join_all(skillsets.iter().map(|skillset| async move {
        let items = remote.list_abilities(&skillset.id).await?;
        Ok::<_, RemoteError>(
            items
                .into_iter()
                .map(|ability| OwnedAbility {
                    skillset_id: skillset.id.clone(),
                    ability,
                })
                .collect::<Vec<_>>(),
        )
    }))
    .await?
    .into_iter()
    .flatten()
    .collect();

    let plan = TeardownPlan {
        files,
        abilities,
        datasets,
        skillsets,
        bots,
    };
    tracing::info!(
        files = plan.files.len(),
        abilities = plan.abilities.len(),
        datasets = plan.datasets.len(),
        skillsets = plan.skillsets.len(),
        bots = plan.bots.len(),
        "Planned teardown"
    );
    Ok(plan)
}

/// Delete everything in `plan`. Failures are collected, never fatal.
pub async fn execute_teardown<R: RemoteService>(remote: &R, plan: &TeardownPlan) -> TeardownReport {
    let mut report = TeardownReport::default();

    let (files, abilities) = join(
        join_all(
            plan.files
                .iter()
                .map(|f| delete(ResourceKind::File, &f.id, remote.delete_file(&f.id))),
        ),
        join_all(plan.abilities.iter().map(|a| {
            delete(
                ResourceKind::Ability,
                &a.ability.id,
                remote.delete_ability(&a.skillset_id, &a.ability.id),
            )
        })),
    )
    .await;
    absorb(&mut report, files);
    absorb(&mut report, abilities);

    let (datasets, skillsets) = join(
        join_all(
            plan.datasets
                .iter()
                .map(|d| delete(ResourceKind::Dataset, &d.id, remote.delete_dataset(&d.id))),
        ),
        join_all(
            plan.skillsets
                .iter()
                .map(|s| delete(ResourceKind::Skillset, &s.id, remote.delete_skillset(&s.id))),
        ),
    )
    .await;
    absorb(&mut report, datasets);
    absorb(&mut report, skillsets);

    let bots = join_all(
        plan.bots
            .iter()
            .map(|b| delete(ResourceKind::Bot, &b.id, remote.delete_bot(&b.id))),
    )
    .await;
    absorb(&mut report, bots);

    tracing::info!(
        deleted = report.deleted,
        failed = report.failures.len(),
        "Teardown finished"
    );
    report
}

async fn delete<F>(kind: ResourceKind, id: &str, call: F) -> Result<(), String>
where
    F: Future<Output = Result<(), RemoteError>>,
{
    match call.await {
        Ok(()) => {
            tracing::debug!(kind = %kind, id, "Deleted");
            Ok(())
        }
        // already gone
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => {
            tracing::error!(kind = %kind, id, error = %e, "Failed to delete");
            Err(format!("{kind} {id}: {e}"))
        }
    }
}

fn absorb(report: &mut TeardownReport, results: Vec<Result<(), String>>) {
    for result in results {
        match result {
            Ok(()) => report.deleted += 1,
            Err(failure) => report.failures.push(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildabot_types::config::DeployConfig;
    use buildabot_types::definition::{Ability, DatasetFile, Definition, Identity};
    use buildabot_types::plan::{DeploymentPlan, PlanAction};
    use buildabot_types::remote::ResourceMeta;

    use crate::deploy::context::ReconcileContext;
    use crate::deploy::reconciler::reconcile;
    use crate::remote::memory::InMemoryRemote;

    fn definition(name: &str) -> Definition {
        Definition {
            name: name.to_string(),
            abilities: vec![Ability {
                name: "greet".to_string(),
                description: "Greets".to_string(),
                instruction: "Say hi".to_string(),
            }],
            dataset_files: vec![DatasetFile {
                file_path: format!("/defs/{name}/dataset/faq.txt"),
                contents: "Answer: {search}".to_string(),
            }],
            identity: Identity {
                backstory: "You help.".to_string(),
                matched: "Use: {search}".to_string(),
                mismatched: "None: {search}".to_string(),
            },
            deployment: None,
        }
    }

    async fn deployed(remote: &InMemoryRemote, qualified: &str) -> String {
        let config = DeployConfig::default();
        let ctx = ReconcileContext::new(remote, &config);
        let plan = DeploymentPlan {
            entity: qualified.to_string(),
            qualified_name: qualified.to_string(),
            action: PlanAction::Create,
            bot_id: None,
        };
        reconcile(&ctx, &definition(qualified), &plan).await.unwrap()
    }

    #[tokio::test]
    async fn test_plan_only_selects_origin_tagged_resources() {
        let remote = InMemoryRemote::new();
        deployed(&remote, "support").await;
        remote.seed_bot("hand-made", ResourceMeta::default());
        remote.seed_dataset("hand-made", ResourceMeta::default());

        let plan = plan_teardown(&remote, None).await.unwrap();
        assert_eq!(plan.bots.len(), 1);
        assert_eq!(plan.bots[0].name, "support");
        assert_eq!(plan.datasets.len(), 1);
        assert_eq!(plan.skillsets.len(), 1);
        assert_eq!(plan.files.len(), 1);
        assert_eq!(plan.abilities.len(), 1);
        assert_eq!(plan.total(), 5);
    }

    #[tokio::test]
    async fn test_namespace_filter() {
        let remote = InMemoryRemote::new();
        deployed(&remote, "acme-support").await;
        deployed(&remote, "other-sales").await;

        let ns = Namespace::new(Some("acme"));
        let plan = plan_teardown(&remote, Some(&ns)).await.unwrap();
        assert_eq!(plan.bots.len(), 1);
        assert_eq!(plan.bots[0].name, "acme-support");
        assert_eq!(plan.files.len(), 1);
        assert!(plan.files[0].meta.belongs_to(&plan.bots[0].id));
        assert_eq!(plan.datasets.len(), 1);
        assert_eq!(plan.abilities.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_deletes_in_tiers() {
        let remote = InMemoryRemote::new();
        deployed(&remote, "support").await;
        let plan = plan_teardown(&remote, None).await.unwrap();
        remote.reset_calls();

        let report = execute_teardown(&remote, &plan).await;
        assert_eq!(report.deleted, 5);
        assert!(report.failures.is_empty());
        assert!(remote.bots().is_empty());
        assert!(remote.files().is_empty());

        let calls = remote.calls();
        let last_secondary = calls
            .iter()
            .rposition(|c| *c == "file.delete" || *c == "skillset.ability.delete")
            .unwrap();
        let first_primary = calls
            .iter()
            .position(|c| *c == "dataset.delete" || *c == "skillset.delete")
            .unwrap();
        let bot = calls.iter().position(|c| *c == "bot.delete").unwrap();
        assert!(last_secondary < first_primary);
        assert!(first_primary < bot);
    }

    #[tokio::test]
    async fn test_execute_continues_after_failure() {
        let remote = InMemoryRemote::new();
        deployed(&remote, "support").await;
        let plan = plan_teardown(&remote, None).await.unwrap();
        remote.fail_always("dataset.delete");

        let report = execute_teardown(&remote, &plan).await;
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].starts_with("dataset"));
        assert_eq!(report.deleted, 4);
        assert!(remote.bots().is_empty());
    }
}

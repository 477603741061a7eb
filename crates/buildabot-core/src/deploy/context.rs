//! Per-run reconciliation context.
//!
//! Holds the remote client, naming and creation defaults, and the
//! bot-by-id cache shared by every entity in one run. The cache has no
//! freshness check: any step that mutates a bot must call
//! [`ReconcileContext::invalidate`] before the next read.

use dashmap::DashMap;

use buildabot_types::config::{DeployConfig, Namespace};
use buildabot_types::error::RemoteError;
use buildabot_types::remote::{RemoteBot, RemoteRefs, ResourceKind};

use crate::remote::RemoteService;

pub struct ReconcileContext<'a, R: RemoteService> {
    remote: &'a R,
    namespace: Namespace,
    model: String,
    dataset_store: String,
    bots: DashMap<String, RemoteBot>,
}

impl<'a, R: RemoteService> ReconcileContext<'a, R> {
    pub fn new(remote: &'a R, config: &DeployConfig) -> Self {
        Self {
            remote,
            namespace: config.namespace(),
            model: config.model.clone(),
            dataset_store: config.dataset_store.clone(),
            bots: DashMap::new(),
        }
    }

    pub fn remote(&self) -> &'a R {
        self.remote
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Model assigned to newly created bots.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Storage backend for newly created datasets.
    pub fn dataset_store(&self) -> &str {
        &self.dataset_store
    }

    /// Fetch a bot through the cache. `Ok(None)` if it does not exist.
    pub async fn lookup(&self, id: &str) -> Result<Option<RemoteBot>, RemoteError> {
        if let Some(bot) = self.bots.get(id).map(|entry| entry.value().clone()) {
            return Ok(Some(bot));
        }

        let fetched = match self.remote.fetch_bot(id).await {
            Ok(bot) => bot,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        if let Some(bot) = &fetched {
            self.bots.insert(id.to_string(), bot.clone());
        }
        Ok(fetched)
    }

    /// Fetch a bot through the cache, failing if it does not exist.
    pub async fn get(&self, id: &str) -> Result<RemoteBot, RemoteError> {
        self.lookup(id).await?.ok_or_else(|| RemoteError::NotFound {
            kind: ResourceKind::Bot,
            id: id.to_string(),
        })
    }

    pub fn invalidate(&self, id: &str) {
        self.bots.remove(id);
    }

    /// Dataset and skillset ids linked to a bot.
    pub async fn refs(&self, bot_id: &str) -> Result<RemoteRefs, RemoteError> {
        let bot = self.get(bot_id).await?;
        let missing = |kind| RemoteError::MissingLink {
            bot_id: bot_id.to_string(),
            kind,
        };
        Ok(RemoteRefs {
            bot_id: bot.id.clone(),
            dataset_id: bot.dataset_id.ok_or_else(|| missing(ResourceKind::Dataset))?,
            skillset_id: bot.skillset_id.ok_or_else(|| missing(ResourceKind::Skillset))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::InMemoryRemote;
    use buildabot_types::remote::{BotUpdate, ResourceMeta};

    #[tokio::test]
    async fn test_lookup_is_cached_until_invalidated() {
        let remote = InMemoryRemote::new();
        let id = remote.seed_bot("support", ResourceMeta::origin());
        let ctx = ReconcileContext::new(&remote, &DeployConfig::default());

        ctx.lookup(&id).await.unwrap();
        ctx.lookup(&id).await.unwrap();
        assert_eq!(remote.call_count("bot.fetch"), 1);

        ctx.invalidate(&id);
        ctx.lookup(&id).await.unwrap();
        assert_eq!(remote.call_count("bot.fetch"), 2);
    }

    #[tokio::test]
    async fn test_missing_bot_is_not_cached() {
        let remote = InMemoryRemote::new();
        let ctx = ReconcileContext::new(&remote, &DeployConfig::default());
        assert!(ctx.lookup("bot_x").await.unwrap().is_none());
        assert!(ctx.get("bot_x").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_refs_require_links() {
        let remote = InMemoryRemote::new();
        let id = remote.seed_bot("support", ResourceMeta::origin());
        let ctx = ReconcileContext::new(&remote, &DeployConfig::default());

        assert!(matches!(
            ctx.refs(&id).await,
            Err(RemoteError::MissingLink { kind: ResourceKind::Dataset, .. })
        ));

        remote
            .update_bot(
                &id,
                &BotUpdate {
                    dataset_id: Some("ds".to_string()),
                    skillset_id: Some("sk".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        ctx.invalidate(&id);

        let refs = ctx.refs(&id).await.unwrap();
        assert_eq!(refs.dataset_id, "ds");
        assert_eq!(refs.skillset_id, "sk");
    }
}

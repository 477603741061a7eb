//! Recording decorator for any [`RemoteService`].
//!
//! Wraps a real client, forwards every call unchanged, and appends one
//! [`CallEvent`] per call to a shared [`CallLog`]. The CLI prints the tally
//! at the end of a run.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use buildabot_types::error::RemoteError;
use buildabot_types::remote::{
    AbilitySpec, AttachKind, BotSpec, BotUpdate, DatasetSpec, DatasetUpdate, FileSpec, RemoteBot,
    RemoteResource, SkillsetSpec, SkillsetUpdate,
};

use super::RemoteService;

/// One remote call as observed by [`RecordingRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    /// Operation name, e.g. `bot.create`.
    pub operation: &'static str,
    /// Resource id or name the call targeted.
    pub target: String,
    /// `None` on success, the error text otherwise.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl CallEvent {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Append-only sink of [`CallEvent`]s shared across concurrent entities.
///
/// Cloning produces a shared view.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    events: Arc<Mutex<Vec<CallEvent>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: CallEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Snapshot of every event so far, in call-completion order.
    pub fn events(&self) -> Vec<CallEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failed(&self) -> Vec<CallEvent> {
        self.events().into_iter().filter(|e| !e.succeeded()).collect()
    }

    /// `(succeeded, failed)` counts.
    pub fn tally(&self) -> (usize, usize) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let ok = events.iter().filter(|e| e.succeeded()).count();
        (ok, events.len() - ok)
    }
}

/// Decorates a [`RemoteService`] with call recording.
pub struct RecordingRemote<R> {
    inner: R,
    log: CallLog,
}

impl<R: RemoteService> RecordingRemote<R> {
    pub fn new(inner: R, log: CallLog) -> Self {
        Self { inner, log }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn record<T>(
        &self,
        operation: &'static str,
        target: &str,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        let start = Instant::now();
        let result = call.await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::debug!(operation, resource = %target, duration_ms, "Remote call succeeded"),
            Err(e) => {
                tracing::debug!(operation, resource = %target, duration_ms, error = %e, "Remote call failed")
            }
        }

        self.log.record(CallEvent {
            operation,
            target: target.to_string(),
            error: result.as_ref().err().map(ToString::to_string),
            duration_ms,
        });
        result
    }
}

impl<R: RemoteService> RemoteService for RecordingRemote<R> {
    async fn create_bot(&self, spec: &BotSpec) -> Result<String, RemoteError> {
        self.record("bot.create", &spec.name, self.inner.create_bot(spec)).await
    }

    async fn update_bot(&self, id: &str, update: &BotUpdate) -> Result<(), RemoteError> {
        self.record("bot.update", id, self.inner.update_bot(id, update)).await
    }

    async fn delete_bot(&self, id: &str) -> Result<(), RemoteError> {
        self.record("bot.delete", id, self.inner.delete_bot(id)).await
    }

    async fn fetch_bot(&self, id: &str) -> Result<Option<RemoteBot>, RemoteError> {
        self.record("bot.fetch", id, self.inner.fetch_bot(id)).await
    }

    async fn list_bots(&self) -> Result<Vec<RemoteBot>, RemoteError> {
        self.record("bot.list", "*", self.inner.list_bots()).await
    }

    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<String, RemoteError> {
        self.record("dataset.create", &spec.name, self.inner.create_dataset(spec))
            .await
    }

    async fn update_dataset(&self, id: &str, update: &DatasetUpdate) -> Result<(), RemoteError> {
        self.record("dataset.update", id, self.inner.update_dataset(id, update))
            .await
    }

    async fn delete_dataset(&self, id: &str) -> Result<(), RemoteError> {
        self.record("dataset.delete", id, self.inner.delete_dataset(id)).await
    }

    async fn list_datasets(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        self.record("dataset.list", "*", self.inner.list_datasets()).await
    }

    async fn create_file(&self, spec: &FileSpec) -> Result<String, RemoteError> {
        self.record("file.create", &spec.name, self.inner.create_file(spec)).await
    }

    async fn upload_file(&self, id: &str, name: &str, contents: &[u8]) -> Result<(), RemoteError> {
        self.record("file.upload", id, self.inner.upload_file(id, name, contents))
            .await
    }

    async fn attach_file(
        &self,
        dataset_id: &str,
        file_id: &str,
        kind: AttachKind,
    ) -> Result<(), RemoteError> {
        self.record(
            "dataset.file.attach",
            file_id,
            self.inner.attach_file(dataset_id, file_id, kind),
        )
        .await
    }

    async fn list_dataset_files(&self, dataset_id: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        self.record(
            "dataset.file.list",
            dataset_id,
            self.inner.list_dataset_files(dataset_id),
        )
        .await
    }

    async fn list_files(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        self.record("file.list", "*", self.inner.list_files()).await
    }

    async fn sync_dataset_file(&self, dataset_id: &str, file_id: &str) -> Result<(), RemoteError> {
        self.record(
            "dataset.file.sync",
            file_id,
            self.inner.sync_dataset_file(dataset_id, file_id),
        )
        .await
    }

    async fn delete_file(&self, id: &str) -> Result<(), RemoteError> {
        self.record("file.delete", id, self.inner.delete_file(id)).await
    }

    async fn create_skillset(&self, spec: &SkillsetSpec) -> Result<String, RemoteError> {
        self.record("skillset.create", &spec.name, self.inner.create_skillset(spec))
            .await
    }

    async fn update_skillset(&self, id: &str, update: &SkillsetUpdate) -> Result<(), RemoteError> {
        self.record("skillset.update", id, self.inner.update_skillset(id, update))
            .await
    }

    async fn delete_skillset(&self, id: &str) -> Result<(), RemoteError> {
        self.record("skillset.delete", id, self.inner.delete_skillset(id)).await
    }

    async fn list_skillsets(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        self.record("skillset.list", "*", self.inner.list_skillsets()).await
    }

    async fn create_ability(&self, skillset_id: &str, spec: &AbilitySpec) -> Result<String, RemoteError> {
        self.record(
            "skillset.ability.create",
            &spec.name,
            self.inner.create_ability(skillset_id, spec),
        )
        .await
    }

    async fn delete_ability(&self, skillset_id: &str, id: &str) -> Result<(), RemoteError> {
        self.record(
            "skillset.ability.delete",
            id,
            self.inner.delete_ability(skillset_id, id),
        )
        .await
    }

    async fn list_abilities(&self, skillset_id: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        self.record(
            "skillset.ability.list",
            skillset_id,
            self.inner.list_abilities(skillset_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::InMemoryRemote;
    use buildabot_types::remote::ResourceMeta;

    fn bot_spec(name: &str) -> BotSpec {
        BotSpec {
            name: name.to_string(),
            description: String::new(),
            backstory: "b".to_string(),
            model: "m".to_string(),
            meta: ResourceMeta::origin(),
        }
    }

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let memory = InMemoryRemote::new();
        memory.fail_on("bot.delete", 1);
        let log = CallLog::new();
        let remote = RecordingRemote::new(memory, log.clone());

        let id = remote.create_bot(&bot_spec("support")).await.unwrap();
        assert!(remote.delete_bot(&id).await.is_err());

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].operation, "bot.create");
        assert_eq!(events[0].target, "support");
        assert!(events[0].succeeded());
        assert_eq!(events[1].operation, "bot.delete");
        assert!(!events[1].succeeded());
        assert_eq!(log.tally(), (1, 1));
        assert_eq!(log.failed().len(), 1);
    }

    #[tokio::test]
    async fn test_passes_results_through() {
        let remote = RecordingRemote::new(InMemoryRemote::new(), CallLog::new());
        let id = remote.create_bot(&bot_spec("support")).await.unwrap();
        let fetched = remote.fetch_bot(&id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "support");
        assert!(remote.fetch_bot("missing").await.unwrap().is_none());
    }
}

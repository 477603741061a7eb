//! In-memory [`RemoteService`] with failure injection.
//!
//! Used by the planner, reconciler, pipeline and teardown tests, and by hosts
//! that want a dry run without network access. Operation names match the
//! ones recorded by [`super::recorder::RecordingRemote`] (`bot.create`,
//! `file.upload`, ...).

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use buildabot_types::error::RemoteError;
use buildabot_types::remote::{
    AbilitySpec, AttachKind, BotSpec, BotUpdate, DatasetSpec, DatasetUpdate, FileSpec, RemoteBot,
    RemoteResource, ResourceKind, ResourceMeta, SkillsetSpec, SkillsetUpdate,
};

use super::RemoteService;

/// A stored dataset with its instructions and attached file ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDataset {
    pub resource: RemoteResource,
    pub match_instruction: String,
    pub mismatch_instruction: String,
    pub attached: Vec<String>,
}

/// A stored file record and its uploaded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub resource: RemoteResource,
    pub contents: Option<Vec<u8>>,
    pub syncs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredSkillset {
    resource: RemoteResource,
    abilities: BTreeMap<String, RemoteResource>,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    /// Fail the nth call (1-based) only.
    Nth(usize),
    Always,
}

#[derive(Default)]
struct State {
    next_id: u64,
    bots: BTreeMap<String, RemoteBot>,
    datasets: BTreeMap<String, StoredDataset>,
    skillsets: BTreeMap<String, StoredSkillset>,
    files: BTreeMap<String, StoredFile>,
    calls: Vec<&'static str>,
    counts: BTreeMap<&'static str, usize>,
    failures: BTreeMap<String, Failure>,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    /// Count the call and apply any injected failure.
    fn enter(&mut self, operation: &'static str) -> Result<(), RemoteError> {
        self.calls.push(operation);
        let count = self.counts.entry(operation).or_insert(0);
        *count += 1;

        let fail = match self.failures.get(operation) {
            Some(Failure::Always) => true,
            Some(Failure::Nth(n)) => *n == *count,
            None => false,
        };
        if fail {
            return Err(RemoteError::Rejected {
                operation: operation.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn not_found(kind: ResourceKind, id: &str) -> RemoteError {
    RemoteError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn resource(id: &str, name: &str, meta: &ResourceMeta) -> RemoteResource {
    RemoteResource {
        id: id.to_string(),
        name: name.to_string(),
        meta: meta.clone(),
    }
}

/// Thread-safe in-memory hosting service.
#[derive(Default)]
pub struct InMemoryRemote {
    state: Mutex<State>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the `nth` call (1-based) of `operation` fail.
    pub fn fail_on(&self, operation: &str, nth: usize) -> &Self {
        self.lock()
            .failures
            .insert(operation.to_string(), Failure::Nth(nth));
        self
    }

    /// Make every call of `operation` fail.
    pub fn fail_always(&self, operation: &str) -> &Self {
        self.lock()
            .failures
            .insert(operation.to_string(), Failure::Always);
        self
    }

    /// Operations in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().counts.get(operation).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        let mut state = self.lock();
        state.calls.clear();
        state.counts.clear();
    }

    pub fn bots(&self) -> Vec<RemoteBot> {
        self.lock().bots.values().cloned().collect()
    }

    pub fn bot(&self, id: &str) -> Option<RemoteBot> {
        self.lock().bots.get(id).cloned()
    }

    pub fn datasets(&self) -> Vec<StoredDataset> {
        self.lock().datasets.values().cloned().collect()
    }

    pub fn dataset(&self, id: &str) -> Option<StoredDataset> {
        self.lock().datasets.get(id).cloned()
    }

    pub fn skillsets(&self) -> Vec<RemoteResource> {
        self.lock()
            .skillsets
            .values()
            .map(|s| s.resource.clone())
            .collect()
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.lock().files.values().cloned().collect()
    }

    /// Abilities of one skillset, empty if the skillset does not exist.
    pub fn abilities(&self, skillset_id: &str) -> Vec<RemoteResource> {
        self.lock()
            .skillsets
            .get(skillset_id)
            .map(|s| s.abilities.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Insert a bot without counting a call, e.g. an unrelated resource
    /// that already holds a name.
    pub fn seed_bot(&self, name: &str, meta: ResourceMeta) -> String {
        let mut state = self.lock();
        let id = state.id("bot");
        state.bots.insert(
            id.clone(),
            RemoteBot {
                id: id.clone(),
                name: name.to_string(),
                backstory: None,
                dataset_id: None,
                skillset_id: None,
                meta,
            },
        );
        id
    }

    pub fn seed_dataset(&self, name: &str, meta: ResourceMeta) -> String {
        let mut state = self.lock();
        let id = state.id("dataset");
        state.datasets.insert(
            id.clone(),
            StoredDataset {
                resource: resource(&id, name, &meta),
                match_instruction: String::new(),
                mismatch_instruction: String::new(),
                attached: Vec::new(),
            },
        );
        id
    }
}

impl RemoteService for InMemoryRemote {
    async fn create_bot(&self, spec: &BotSpec) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.enter("bot.create")?;
        let id = state.id("bot");
        state.bots.insert(
            id.clone(),
            RemoteBot {
                id: id.clone(),
                name: spec.name.clone(),
                backstory: Some(spec.backstory.clone()),
                dataset_id: None,
                skillset_id: None,
                meta: spec.meta.clone(),
            },
        );
        Ok(id)
    }

    async fn update_bot(&self, id: &str, update: &BotUpdate) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("bot.update")?;
        let bot = state
            .bots
            .get_mut(id)
            .ok_or_else(|| not_found(ResourceKind::Bot, id))?;
        if let Some(name) = &update.name {
            bot.name = name.clone();
        }
        if let Some(backstory) = &update.backstory {
            bot.backstory = Some(backstory.clone());
        }
        if let Some(dataset_id) = &update.dataset_id {
            bot.dataset_id = Some(dataset_id.clone());
        }
        if let Some(skillset_id) = &update.skillset_id {
            bot.skillset_id = Some(skillset_id.clone());
        }
        Ok(())
    }

    async fn delete_bot(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("bot.delete")?;
        state
            .bots
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Bot, id))
    }

    async fn fetch_bot(&self, id: &str) -> Result<Option<RemoteBot>, RemoteError> {
        let mut state = self.lock();
        state.enter("bot.fetch")?;
        Ok(state.bots.get(id).cloned())
    }

    async fn list_bots(&self) -> Result<Vec<RemoteBot>, RemoteError> {
        let mut state = self.lock();
        state.enter("bot.list")?;
        Ok(state.bots.values().cloned().collect())
    }

    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.enter("dataset.create")?;
        let id = state.id("dataset");
        state.datasets.insert(
            id.clone(),
            StoredDataset {
                resource: resource(&id, &spec.name, &spec.meta),
                match_instruction: spec.match_instruction.clone(),
                mismatch_instruction: spec.mismatch_instruction.clone(),
                attached: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn update_dataset(&self, id: &str, update: &DatasetUpdate) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("dataset.update")?;
        let dataset = state
            .datasets
            .get_mut(id)
            .ok_or_else(|| not_found(ResourceKind::Dataset, id))?;
        if let Some(name) = &update.name {
            dataset.resource.name = name.clone();
        }
        if let Some(matched) = &update.match_instruction {
            dataset.match_instruction = matched.clone();
        }
        if let Some(mismatched) = &update.mismatch_instruction {
            dataset.mismatch_instruction = mismatched.clone();
        }
        Ok(())
    }

    async fn delete_dataset(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("dataset.delete")?;
        state
            .datasets
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Dataset, id))
    }

    async fn list_datasets(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        let mut state = self.lock();
        state.enter("dataset.list")?;
        Ok(state.datasets.values().map(|d| d.resource.clone()).collect())
    }

    async fn create_file(&self, spec: &FileSpec) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.enter("file.create")?;
        let id = state.id("file");
        state.files.insert(
            id.clone(),
            StoredFile {
                resource: resource(&id, &spec.name, &spec.meta),
                contents: None,
                syncs: 0,
            },
        );
        Ok(id)
    }

    async fn upload_file(&self, id: &str, _name: &str, contents: &[u8]) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("file.upload")?;
        let file = state
            .files
            .get_mut(id)
            .ok_or_else(|| not_found(ResourceKind::File, id))?;
        file.contents = Some(contents.to_vec());
        Ok(())
    }

    async fn attach_file(
        &self,
        dataset_id: &str,
        file_id: &str,
        _kind: AttachKind,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("dataset.file.attach")?;
        if !state.files.contains_key(file_id) {
            return Err(not_found(ResourceKind::File, file_id));
        }
        let dataset = state
            .datasets
            .get_mut(dataset_id)
            .ok_or_else(|| not_found(ResourceKind::Dataset, dataset_id))?;
        if !dataset.attached.iter().any(|f| f == file_id) {
            dataset.attached.push(file_id.to_string());
        }
        Ok(())
    }

    async fn list_dataset_files(&self, dataset_id: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        let mut state = self.lock();
        state.enter("dataset.file.list")?;
        let dataset = state
            .datasets
            .get(dataset_id)
            .ok_or_else(|| not_found(ResourceKind::Dataset, dataset_id))?;
        Ok(dataset
            .attached
            .iter()
            .filter_map(|id| state.files.get(id))
            .map(|f| f.resource.clone())
            .collect())
    }

    async fn list_files(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        let mut state = self.lock();
        state.enter("file.list")?;
        Ok(state.files.values().map(|f| f.resource.clone()).collect())
    }

    async fn sync_dataset_file(&self, dataset_id: &str, file_id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("dataset.file.sync")?;
        if !state.datasets.contains_key(dataset_id) {
            return Err(not_found(ResourceKind::Dataset, dataset_id));
        }
        let file = state
            .files
            .get_mut(file_id)
            .ok_or_else(|| not_found(ResourceKind::File, file_id))?;
        file.syncs += 1;
        Ok(())
    }

    async fn delete_file(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("file.delete")?;
        state
            .files
            .remove(id)
            .ok_or_else(|| not_found(ResourceKind::File, id))?;
        for dataset in state.datasets.values_mut() {
            dataset.attached.retain(|f| f != id);
        }
        Ok(())
    }

    async fn create_skillset(&self, spec: &SkillsetSpec) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.enter("skillset.create")?;
        let id = state.id("skillset");
        state.skillsets.insert(
            id.clone(),
            StoredSkillset {
                resource: resource(&id, &spec.name, &spec.meta),
                abilities: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn update_skillset(&self, id: &str, update: &SkillsetUpdate) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("skillset.update")?;
        let skillset = state
            .skillsets
            .get_mut(id)
            .ok_or_else(|| not_found(ResourceKind::Skillset, id))?;
        if let Some(name) = &update.name {
            skillset.resource.name = name.clone();
        }
        Ok(())
    }

    async fn delete_skillset(&self, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("skillset.delete")?;
        state
            .skillsets
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Skillset, id))
    }

    async fn list_skillsets(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        let mut state = self.lock();
        state.enter("skillset.list")?;
        Ok(state.skillsets.values().map(|s| s.resource.clone()).collect())
    }

    async fn create_ability(&self, skillset_id: &str, spec: &AbilitySpec) -> Result<String, RemoteError> {
        let mut state = self.lock();
        state.enter("skillset.ability.create")?;
        let id = state.id("ability");
        let skillset = state
            .skillsets
            .get_mut(skillset_id)
            .ok_or_else(|| not_found(ResourceKind::Skillset, skillset_id))?;
        skillset
            .abilities
            .insert(id.clone(), resource(&id, &spec.name, &spec.meta));
        Ok(id)
    }

    async fn delete_ability(&self, skillset_id: &str, id: &str) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.enter("skillset.ability.delete")?;
        let skillset = state
            .skillsets
            .get_mut(skillset_id)
            .ok_or_else(|| not_found(ResourceKind::Skillset, skillset_id))?;
        skillset
            .abilities
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(ResourceKind::Ability, id))
    }

    async fn list_abilities(&self, skillset_id: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        let mut state = self.lock();
        state.enter("skillset.ability.list")?;
        let skillset = state
            .skillsets
            .get(skillset_id)
            .ok_or_else(|| not_found(ResourceKind::Skillset, skillset_id))?;
        Ok(skillset.abilities.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_spec(name: &str) -> FileSpec {
        FileSpec {
            name: name.to_string(),
            description: String::new(),
            meta: ResourceMeta::owned_by("bot_1"),
        }
    }

    #[tokio::test]
    async fn test_nth_failure_only_hits_that_call() {
        let remote = InMemoryRemote::new();
        remote.fail_on("file.create", 2);

        assert!(remote.create_file(&file_spec("a.txt")).await.is_ok());
        assert!(remote.create_file(&file_spec("b.txt")).await.is_err());
        assert!(remote.create_file(&file_spec("c.txt")).await.is_ok());
        assert_eq!(remote.call_count("file.create"), 3);
        assert_eq!(remote.files().len(), 2);
    }

    #[tokio::test]
    async fn test_deleting_file_detaches_it() {
        let remote = InMemoryRemote::new();
        let dataset = remote.seed_dataset("ds", ResourceMeta::owned_by("bot_1"));
        let file = remote.create_file(&file_spec("faq.txt")).await.unwrap();
        remote
            .attach_file(&dataset, &file, AttachKind::Source)
            .await
            .unwrap();
        assert_eq!(remote.list_dataset_files(&dataset).await.unwrap().len(), 1);

        remote.delete_file(&file).await.unwrap();
        assert!(remote.list_dataset_files(&dataset).await.unwrap().is_empty());
        assert!(remote.dataset(&dataset).unwrap().attached.is_empty());
    }

    #[tokio::test]
    async fn test_missing_resources_are_not_found() {
        let remote = InMemoryRemote::new();
        let err = remote.delete_bot("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(remote.fetch_bot("nope").await.unwrap().is_none());
    }
}

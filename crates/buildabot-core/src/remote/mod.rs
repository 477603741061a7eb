//! Hosting-service port.
//!
//! [`RemoteService`] lists the operations the planner, reconciler and
//! teardown need from the service that stores bots, datasets, files and
//! skill abilities. Implementations live in buildabot-infra (HTTP) and in
//! [`memory`] (tests).

pub mod memory;
pub mod recorder;

use buildabot_types::error::RemoteError;
use buildabot_types::remote::{
    AbilitySpec, AttachKind, BotSpec, BotUpdate, DatasetSpec, DatasetUpdate, FileSpec, RemoteBot,
    RemoteResource, SkillsetSpec, SkillsetUpdate,
};

/// Operations on the hosting service.
///
/// Every `create_*` returns the new resource id. Uses native async fn in
/// traits (Rust 2024 edition, no async_trait macro).
pub trait RemoteService: Send + Sync {
    // -- bots --

    fn create_bot(
        &self,
        spec: &BotSpec,
    ) -> impl std::future::Future<Output = Result<String, RemoteError>> + Send;

    fn update_bot(
        &self,
        id: &str,
        update: &BotUpdate,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    fn delete_bot(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Fetch one bot. `Ok(None)` when the service reports it missing.
    fn fetch_bot(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<RemoteBot>, RemoteError>> + Send;

    fn list_bots(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteBot>, RemoteError>> + Send;

    // -- datasets --

    fn create_dataset(
        &self,
        spec: &DatasetSpec,
    ) -> impl std::future::Future<Output = Result<String, RemoteError>> + Send;

    fn update_dataset(
        &self,
        id: &str,
        update: &DatasetUpdate,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    fn delete_dataset(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    fn list_datasets(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteResource>, RemoteError>> + Send;

    // -- files --

    /// Create the file record. Its bytes are sent separately by [`Self::upload_file`].
    fn create_file(
        &self,
        spec: &FileSpec,
    ) -> impl std::future::Future<Output = Result<String, RemoteError>> + Send;

    fn upload_file(
        &self,
        id: &str,
        name: &str,
        contents: &[u8],
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    fn attach_file(
        &self,
        dataset_id: &str,
        file_id: &str,
        kind: AttachKind,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Files attached to one dataset.
    fn list_dataset_files(
        &self,
        dataset_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteResource>, RemoteError>> + Send;

    /// Every file record visible to the account.
    fn list_files(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteResource>, RemoteError>> + Send;

    /// Ask the service to (re)index an attached file.
    fn sync_dataset_file(
        &self,
        dataset_id: &str,
        file_id: &str,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    fn delete_file(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    // -- skillsets and abilities --

    fn create_skillset(
        &self,
        spec: &SkillsetSpec,
    ) -> impl std::future::Future<Output = Result<String, RemoteError>> + Send;

    fn update_skillset(
        &self,
        id: &str,
        update: &SkillsetUpdate,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    fn delete_skillset(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    fn list_skillsets(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteResource>, RemoteError>> + Send;

    fn create_ability(
        &self,
        skillset_id: &str,
        spec: &AbilitySpec,
    ) -> impl std::future::Future<Output = Result<String, RemoteError>> + Send;

    fn delete_ability(
        &self,
        skillset_id: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    fn list_abilities(
        &self,
        skillset_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<RemoteResource>, RemoteError>> + Send;
}

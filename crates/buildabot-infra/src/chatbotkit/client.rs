//! ChatBotKitClient -- concrete [`RemoteService`] over the ChatBotKit REST API.
//!
//! Every operation is a JSON request against `{base_url}/{resource}/...`
//! authenticated with a bearer token. List endpoints are cursor-paginated
//! and drained completely.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

use buildabot_core::remote::RemoteService;
use buildabot_types::error::RemoteError;
use buildabot_types::remote::{
    AbilitySpec, AttachKind, BotSpec, BotUpdate, DatasetSpec, DatasetUpdate, FileSpec, RemoteBot,
    RemoteResource, SkillsetSpec, SkillsetUpdate,
};

use super::types::{AttachRequest, Empty, IdResponse, ListResponse, UploadRequest};

/// Items requested per page from list endpoints.
const PAGE_SIZE: usize = 100;

/// Content type sent with dataset file uploads.
const UPLOAD_CONTENT_TYPE: &str = "text/csv";

/// ChatBotKit API client.
///
/// Does not derive Debug; the key is only exposed when building headers.
pub struct ChatBotKitClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl ChatBotKitClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.chatbotkit.com/v1";

    pub fn new(api_key: SecretString, base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RemoteError::Transport {
                endpoint: base_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = request
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| RemoteError::Transport {
                endpoint: path.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(path, status = status.as_u16(), "Request rejected");
            return Err(RemoteError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn post<B>(&self, path: &str, body: &B) -> Result<reqwest::Response, RemoteError>
    where
        B: Serialize + Sync + ?Sized,
    {
        tracing::trace!(path, "POST");
        self.send(path, self.client.post(self.url(path)).json(body)).await
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, RemoteError> {
        tracing::trace!(path, "GET");
        self.send(path, self.client.get(self.url(path)).query(query))
            .await
    }

    async fn decode<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        response.json::<T>().await.map_err(|e| RemoteError::Decode {
            endpoint: path.to_string(),
            message: e.to_string(),
        })
    }

    async fn create<B>(&self, path: &str, body: &B) -> Result<String, RemoteError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let response = self.post(path, body).await?;
        let created: IdResponse = Self::decode(path, response).await?;
        Ok(created.id)
    }

    /// POST whose response body carries nothing we need.
    async fn command<B>(&self, path: &str, body: &B) -> Result<(), RemoteError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.post(path, body).await?;
        Ok(())
    }

    async fn list<T>(&self, path: &str) -> Result<Vec<T>, RemoteError>
    where
        T: DeserializeOwned + Send + HasId,
    {
        let mut items: Vec<T> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("take", PAGE_SIZE.to_string())];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }

            let response = self.get(path, &query).await?;
            let page: ListResponse<T> = Self::decode(path, response).await?;
            let len = page.items.len();
            cursor = page.items.last().map(|item| item.id().to_string());
            items.extend(page.items);

            if len < PAGE_SIZE || cursor.is_none() {
                break;
            }
        }
        Ok(items)
    }
}

/// Records that can serve as a pagination cursor.
trait HasId {
    fn id(&self) -> &str;
}

impl HasId for RemoteBot {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for RemoteResource {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Inline upload payload for one dataset file.
fn upload_request<'a>(name: &'a str, contents: &[u8]) -> UploadRequest<'a> {
    UploadRequest {
        file: format!(
            "data:{UPLOAD_CONTENT_TYPE};base64,{}",
            STANDARD.encode(contents)
        ),
        name,
        content_type: UPLOAD_CONTENT_TYPE,
    }
}

impl RemoteService for ChatBotKitClient {
    async fn create_bot(&self, spec: &BotSpec) -> Result<String, RemoteError> {
        self.create("bot/create", spec).await
    }

    async fn update_bot(&self, id: &str, update: &BotUpdate) -> Result<(), RemoteError> {
        self.command(&format!("bot/{id}/update"), update).await
    }

    async fn delete_bot(&self, id: &str) -> Result<(), RemoteError> {
        self.command(&format!("bot/{id}/delete"), &Empty::default()).await
    }

    async fn fetch_bot(&self, id: &str) -> Result<Option<RemoteBot>, RemoteError> {
        let path = format!("bot/{id}/fetch");
        match self.get(&path, &[]).await {
            Ok(response) => Ok(Some(Self::decode(&path, response).await?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_bots(&self) -> Result<Vec<RemoteBot>, RemoteError> {
        self.list("bot/list").await
    }

    async fn create_dataset(&self, spec: &DatasetSpec) -> Result<String, RemoteError> {
        self.create("dataset/create", spec).await
    }

    async fn update_dataset(&self, id: &str, update: &DatasetUpdate) -> Result<(), RemoteError> {
        self.command(&format!("dataset/{id}/update"), update).await
    }

    async fn delete_dataset(&self, id: &str) -> Result<(), RemoteError> {
        self.command(&format!("dataset/{id}/delete"), &Empty::default())
            .await
    }

    async fn list_datasets(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        self.list("dataset/list").await
    }

    async fn create_file(&self, spec: &FileSpec) -> Result<String, RemoteError> {
        self.create("file/create", spec).await
    }

    async fn upload_file(&self, id: &str, name: &str, contents: &[u8]) -> Result<(), RemoteError> {
        self.command(&format!("file/{id}/upload"), &upload_request(name, contents))
            .await
    }

    async fn attach_file(
        &self,
        dataset_id: &str,
        file_id: &str,
        kind: AttachKind,
    ) -> Result<(), RemoteError> {
        self.command(
            &format!("dataset/{dataset_id}/file/{file_id}/attach"),
            &AttachRequest { kind },
        )
        .await
    }

    async fn list_dataset_files(&self, dataset_id: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        self.list(&format!("dataset/{dataset_id}/file/list")).await
    }

    async fn list_files(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        self.list("file/list").await
    }

    async fn sync_dataset_file(&self, dataset_id: &str, file_id: &str) -> Result<(), RemoteError> {
        self.command(
            &format!("dataset/{dataset_id}/file/{file_id}/sync"),
            &Empty::default(),
        )
        .await
    }

    async fn delete_file(&self, id: &str) -> Result<(), RemoteError> {
        self.command(&format!("file/{id}/delete"), &Empty::default()).await
    }

    async fn create_skillset(&self, spec: &SkillsetSpec) -> Result<String, RemoteError> {
        self.create("skillset/create", spec).await
    }

    async fn update_skillset(&self, id: &str, update: &SkillsetUpdate) -> Result<(), RemoteError> {
        self.command(&format!("skillset/{id}/update"), update).await
    }

    async fn delete_skillset(&self, id: &str) -> Result<(), RemoteError> {
        self.command(&format!("skillset/{id}/delete"), &Empty::default())
            .await
    }

    async fn list_skillsets(&self) -> Result<Vec<RemoteResource>, RemoteError> {
        self.list("skillset/list").await
    }

    async fn create_ability(&self, skillset_id: &str, spec: &AbilitySpec) -> Result<String, RemoteError> {
        self.create(&format!("skillset/{skillset_id}/ability/create"), spec)
            .await
    }

    async fn delete_ability(&self, skillset_id: &str, id: &str) -> Result<(), RemoteError> {
        self.command(
            &format!("skillset/{skillset_id}/ability/{id}/delete"),
            &Empty::default(),
        )
        .await
    }

    async fn list_abilities(&self, skillset_id: &str) -> Result<Vec<RemoteResource>, RemoteError> {
        self.list(&format!("skillset/{skillset_id}/ability/list")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ChatBotKitClient {
        ChatBotKitClient::new(SecretString::from("test-key"), base).unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let c = client("https://api.example.test/v1/");
        assert_eq!(c.base_url(), "https://api.example.test/v1");
        assert_eq!(c.url("bot/list"), "https://api.example.test/v1/bot/list");
        assert_eq!(c.url("/bot/list"), "https://api.example.test/v1/bot/list");
    }

    #[test]
    fn test_upload_request_is_data_uri() {
        let req = upload_request("faq.txt", b"Answer: {search}");
        assert!(req.file.starts_with("data:text/csv;base64,"));
        let encoded = req.file.trim_start_matches("data:text/csv;base64,");
        assert_eq!(STANDARD.decode(encoded).unwrap(), b"Answer: {search}");

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["name"], "faq.txt");
        assert_eq!(json["type"], "text/csv");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Port 9 on localhost: nothing listens there in test environments.
        let c = client("http://127.0.0.1:9/v1");
        let err = c.list_bots().await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport { ref endpoint, .. } if endpoint == "bot/list"));
    }
}

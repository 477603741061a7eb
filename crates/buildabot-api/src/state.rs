//! Application state wiring the compiler, store and remote client together.
//!
//! AppState pins the generic core pipeline to the concrete infra
//! implementations: the filesystem loader, `LocalDeploymentStore`, and the
//! ChatBotKit client wrapped in the call recorder.

use std::path::Path;

use anyhow::Context;

use buildabot_core::compiler::{self, CompileOutput};
use buildabot_core::remote::recorder::{CallLog, RecordingRemote};
use buildabot_infra::chatbotkit::ChatBotKitClient;
use buildabot_infra::config::{api_key_from_env, load_config};
use buildabot_infra::filesystem::{LocalDeploymentStore, TreeLoadError, load_tree};
use buildabot_infra::variables::registry_from_tree;
use buildabot_types::config::DeployConfig;
use buildabot_types::error::CompileError;

/// Remote client used by `deploy` and `destroy`.
pub type ConcreteRemote = RecordingRemote<ChatBotKitClient>;

/// Shared state for every CLI command.
pub struct AppState {
    pub config: DeployConfig,
    pub calls: CallLog,
}

impl AppState {
    /// Load configuration from `project_dir`. A `namespace` argument wins
    /// over the config file and environment.
    pub async fn init(project_dir: &Path, namespace: Option<String>) -> anyhow::Result<Self> {
        let mut config = load_config(project_dir).await;
        if namespace.is_some() {
            config.namespace = namespace;
        }
        tracing::debug!(
            project_dir = %project_dir.display(),
            definitions_dir = %config.definitions_dir.display(),
            namespace = config.namespace.as_deref().unwrap_or(""),
            "Loaded configuration"
        );

        Ok(Self {
            config,
            calls: CallLog::new(),
        })
    }

    /// Build the recorded ChatBotKit client. Needs `CHATBOTKIT_API_KEY`.
    pub fn remote(&self) -> anyhow::Result<ConcreteRemote> {
        let api_key = api_key_from_env()?;
        let client = ChatBotKitClient::new(api_key, self.config.api_base_url.clone())
            .context("failed to create ChatBotKit client")?;
        Ok(RecordingRemote::new(client, self.calls.clone()))
    }

    pub fn store(&self) -> LocalDeploymentStore {
        LocalDeploymentStore::new(&self.config.definitions_dir)
    }

    /// Load and compile the definitions directory.
    ///
    /// `None` means there is nothing to compile, which callers treat as a
    /// successful no-op.
    pub async fn compile(&self) -> anyhow::Result<Option<CompileOutput>> {
        let tree = match load_tree(&self.config.definitions_dir).await {
            Ok(tree) => tree,
            Err(TreeLoadError::Empty(root)) => {
                tracing::info!(root = %root.display(), "No definition files found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let plugins = registry_from_tree(&tree);
        match compiler::compile(tree, &plugins) {
            Ok(output) => Ok(Some(output)),
            Err(CompileError::EmptyTree { root }) => {
                tracing::info!(root = %root, "No entities found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

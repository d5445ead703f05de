pub mod api;
pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod error_codes;
pub mod input_validation;
pub mod log_stream;
pub mod logging;
pub mod patch;
pub mod remote_tree;
pub mod schedule;
pub mod status;
pub mod task_editor;
pub mod types;

#[cfg(test)]
mod lib_tests;

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use api::AgentClient;
use channel::{spawn_channel, ChannelHandle};
use config::ClientConfig;
use connection::TokioScheduler;
use error::{ClientError, Result};
use log_stream::LogsChannel;
use logging::LogManager;
use patch::Patch;
use remote_tree::RemoteTree;
use status::{StatusChannel, TaskConfig};

/// Everything a front end needs to talk to one agent.
#[derive(Clone)]
pub struct SyncClient {
    pub config: ClientConfig,
    pub api: AgentClient,
    pub log_manager: Arc<LogManager>,
}

impl SyncClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(ClientError::validation)?;
        let api = AgentClient::new(config.clone())?;
        let log_manager = Arc::new(LogManager::new(config.max_log_lines));
        Ok(Self {
            config,
            api,
            log_manager,
        })
    }

    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::new(ClientConfig::load(path)?)
    }

    /// A status channel using this client's reconnect policy. Register
    /// observers on it before handing it to [`SyncClient::spawn_status`].
    pub fn status_channel(&self) -> StatusChannel {
        StatusChannel::new(self.config.reconnect_policy())
    }

    pub fn spawn_status(
        &self,
        channel: StatusChannel,
    ) -> Result<(ChannelHandle, JoinHandle<StatusChannel>)> {
        let url = self.config.status_url()?;
        info!("connecting status channel to {url}");
        Ok(spawn_channel(
            channel,
            url,
            self.config.connect_timeout(),
            TokioScheduler,
        ))
    }

    /// Streams agent log lines into [`SyncClient::log_manager`].
    pub fn spawn_logs(&self) -> Result<(ChannelHandle, JoinHandle<LogsChannel>)> {
        let url = self.config.logs_url()?;
        let channel = LogsChannel::new(self.config.reconnect_policy(), Arc::clone(&self.log_manager));
        Ok(spawn_channel(
            channel,
            url,
            self.config.connect_timeout(),
            TokioScheduler,
        ))
    }

    pub fn remote_tree(
        &self,
        endpoint_uri: impl Into<String>,
        root_path: impl Into<String>,
    ) -> RemoteTree<AgentClient> {
        RemoteTree::new(self.api.clone(), endpoint_uri, root_path)
    }

    /// One page of history, newest first.
    pub async fn history(
        &self,
        task: &TaskConfig,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Patch>> {
        let mut patches = self.api.load_patches(task, offset, limit).await?;
        Patch::sort_newest_first(&mut patches);
        Ok(patches)
    }
}

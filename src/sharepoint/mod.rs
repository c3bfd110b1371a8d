//! SharePoint document library uploads through Microsoft Graph.

mod auth;
mod config;
mod upload;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BackupError, Result};
use crate::transfer::ProgressObserver;

pub use auth::GraphSession;
pub use config::{
    SharepointConfig, DEFAULT_CHUNK_SIZE, DEFAULT_GRAPH_BASE_URL, DEFAULT_LOGIN_BASE_URL,
    GRAPH_SCOPE,
};
pub use upload::{chunk_ranges, effective_chunk_size, remote_path};

/// Where staged files end up
#[async_trait]
pub trait UploadTarget: Send + Sync {
    /// Uploads `local_path` to `remote_path`, replacing any existing item, and
    /// returns the bytes sent
    async fn upload_file(
        &self,
        session: &GraphSession,
        local_path: &Path,
        remote_path: &str,
        progress: Option<&dyn ProgressObserver>,
    ) -> Result<u64>;
}

pub struct GraphClient {
    graph_base_url: String,
    login_base_url: String,
    drive_id: String,
    chunk_size: u64,
    /// Auth and session creation
    api: reqwest::Client,
    /// Chunk uploads
    transfer: reqwest::Client,
}

impl GraphClient {
    pub fn new(config: &SharepointConfig, api_timeout: Duration, transfer_timeout: Duration) -> Result<Self> {
        let api = reqwest::Client::builder()
            .timeout(api_timeout)
            .build()
            .map_err(|e| BackupError::internal(format!("Failed to create HTTP client: {}", e)))?;
        let transfer = reqwest::Client::builder()
            .timeout(transfer_timeout)
            .build()
            .map_err(|e| BackupError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            graph_base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            login_base_url: config.login_base_url.trim_end_matches('/').to_string(),
            drive_id: config.drive_id.clone(),
            chunk_size: config.chunk_size,
            api,
            transfer,
        })
    }

    pub fn drive_id(&self) -> &str {
        &self.drive_id
    }
}

#[async_trait]
impl UploadTarget for GraphClient {
    async fn upload_file(
        &self,
        session: &GraphSession,
        local_path: &Path,
        remote_path: &str,
        progress: Option<&dyn ProgressObserver>,
    ) -> Result<u64> {
        let size = tokio::fs::metadata(local_path).await?.len();

        let sent = if size == 0 {
            self.upload_small(session, &self.drive_id, local_path, remote_path)
                .await?
        } else {
            self.upload_large(session, &self.drive_id, local_path, remote_path, progress)
                .await?
        };

        tracing::info!(
            remote = %remote_path,
            bytes = sent,
            "Uploaded file to SharePoint"
        );
        Ok(sent)
    }
}

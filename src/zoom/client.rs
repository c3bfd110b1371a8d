use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use super::config::{ZoomCredentials, DEFAULT_PAGE_SIZE};
use super::windows::DateWindow;
use super::{DownloadRequest, RecordingsPage, ZoomApi};
use crate::error::{BackupError, Result};
use crate::transfer::ProgressObserver;

/// An access token obtained for one run
#[derive(Clone)]
pub struct ZoomSession {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

impl ZoomSession {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in: None,
        }
    }
}

impl fmt::Debug for ZoomSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoomSession")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct ZoomClient {
    api_base_url: String,
    /// Listing and auth calls
    api: reqwest::Client,
    /// Recording downloads
    transfer: reqwest::Client,
}

impl ZoomClient {
    pub fn new(api_base_url: &str, api_timeout: Duration, transfer_timeout: Duration) -> Result<Self> {
        let api = reqwest::Client::builder()
            .timeout(api_timeout)
            .build()
            .map_err(|e| BackupError::internal(format!("Failed to create HTTP client: {}", e)))?;
        let transfer = reqwest::Client::builder()
            .timeout(transfer_timeout)
            .build()
            .map_err(|e| BackupError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api,
            transfer,
        })
    }

    /// Server-to-server OAuth with the account credentials grant
    pub async fn authenticate(&self, credentials: &ZoomCredentials) -> Result<ZoomSession> {
        let url = format!(
            "{}?grant_type=account_credentials&account_id={}",
            credentials.oauth_url,
            urlencoding::encode(&credentials.account_id)
        );

        let response = self
            .api
            .post(&url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .send()
            .await
            .map_err(|e| BackupError::Auth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackupError::Auth(format!(
                "Token request failed with status {}: {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackupError::Auth(format!("Failed to parse token response: {}", e)))?;

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BackupError::Auth("Token response has no access_token".to_string()))?;

        tracing::info!(expires_in = ?token.expires_in, "Authenticated with Zoom");

        Ok(ZoomSession {
            access_token,
            expires_in: token.expires_in,
        })
    }
}

/// Rate limits and server errors are worth another attempt
fn listing_status_error(status: StatusCode, body: String) -> BackupError {
    let message = format!("Listing failed with status {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        BackupError::TransientNetwork(message)
    } else {
        BackupError::Network(message)
    }
}

/// Appends the bearer token, and the playback passcode when present, as
/// query parameters
pub fn download_url_with_auth(url: &str, access_token: &str, password: Option<&str>) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    let mut full = format!(
        "{}{}access_token={}",
        url,
        separator,
        urlencoding::encode(access_token)
    );
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        full.push_str("&playback_access_token=");
        full.push_str(&urlencoding::encode(password));
    }
    full
}

#[async_trait]
impl ZoomApi for ZoomClient {
    async fn fetch_recordings_page(
        &self,
        session: &ZoomSession,
        user: &str,
        window: &DateWindow,
        next_page_token: Option<&str>,
    ) -> Result<RecordingsPage> {
        let url = format!(
            "{}/users/{}/recordings",
            self.api_base_url,
            urlencoding::encode(user)
        );

        let mut query = vec![
            ("page_size", DEFAULT_PAGE_SIZE.to_string()),
            ("from", window.start.format("%Y-%m-%d").to_string()),
            ("to", window.last_day().format("%Y-%m-%d").to_string()),
        ];
        if let Some(token) = next_page_token {
            query.push(("next_page_token", token.to_string()));
        }

        let response = self
            .api
            .get(&url)
            .bearer_auth(&session.access_token)
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(listing_status_error(status, error_text));
        }

        let page: RecordingsPage = response.json().await.map_err(|e| {
            BackupError::Network(format!("Failed to parse recordings page: {}", e))
        })?;
        Ok(page)
    }

    async fn download_file(
        &self,
        session: &ZoomSession,
        request: &DownloadRequest,
        dest: &Path,
        progress: Option<&dyn ProgressObserver>,
    ) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = download_url_with_auth(
            &request.url,
            &session.access_token,
            request.password.as_deref(),
        );

        let response = self.transfer.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackupError::Download(format!(
                "Download failed with status {}: {}",
                status, error_text
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if let Some(observer) = progress {
                observer.on_bytes_transferred(chunk.len() as u64);
            }
        }
        file.flush().await?;

        tracing::debug!(path = %dest.display(), bytes = written, "Download complete");
        Ok(written)
    }
}

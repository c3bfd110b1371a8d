use std::io::SeekFrom;
use std::path::Path;

use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::auth::GraphSession;
use super::GraphClient;
use crate::error::{BackupError, Result};
use crate::transfer::ProgressObserver;

#[derive(Debug, Deserialize)]
struct UploadSession {
    #[serde(rename = "uploadUrl")]
    upload_url: String,
}

/// Chunk size for a file of `total` bytes. Files smaller than one chunk are
/// sent in `total - 1` byte chunks since the session rejects a single chunk
/// covering the whole file.
pub fn effective_chunk_size(total: u64, max_chunk: u64) -> u64 {
    let max_chunk = max_chunk.max(1);
    if total < max_chunk {
        total.saturating_sub(1).max(1)
    } else {
        max_chunk
    }
}

/// Inclusive `(first, last)` byte ranges covering `[0, total)`
pub fn chunk_ranges(total: u64, chunk: u64) -> Vec<(u64, u64)> {
    let chunk = chunk.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + chunk).min(total);
        ranges.push((start, end - 1));
        start = end;
    }
    ranges
}

/// `{remote_folder}/{user}/{folder}/{filename}` with every path segment
/// percent-encoded
pub fn remote_path(remote_folder: &str, user: &str, folder: &str, filename: &str) -> String {
    [remote_folder, user, folder, filename]
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl GraphClient {
    fn item_url(&self, drive_id: &str, remote: &str, action: &str) -> String {
        format!(
            "{}/drives/{}/items/root:/{}:/{}",
            self.graph_base_url,
            urlencoding::encode(drive_id),
            remote,
            action
        )
    }

    /// Uploads through a resumable upload session, one sequential chunk at a
    /// time. `remote` is an already-encoded path from [`remote_path`].
    pub async fn upload_large(
        &self,
        session: &GraphSession,
        drive_id: &str,
        local: &Path,
        remote: &str,
        progress: Option<&dyn ProgressObserver>,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::open(local).await?;
        let total = file.metadata().await?.len();

        let body = serde_json::json!({
            "item": { "@microsoft.graph.conflictBehavior": "replace" }
        });

        let response = self
            .api
            .post(self.item_url(drive_id, remote, "createUploadSession"))
            .bearer_auth(&session.access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackupError::upload(
                Some(status.as_u16()),
                format!("Error creating upload session: {}", error_text),
            ));
        }

        let upload: UploadSession = response.json().await.map_err(|e| {
            BackupError::upload(None, format!("Failed to parse upload session: {}", e))
        })?;

        let chunk = effective_chunk_size(total, self.chunk_size);

        for (first, last) in chunk_ranges(total, chunk) {
            let len = last - first + 1;
            let mut buffer = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(first)).await?;
            file.read_exact(&mut buffer).await?;

            // Upload URLs are pre-authenticated; no bearer header
            let result = self
                .transfer
                .put(&upload.upload_url)
                .header(
                    reqwest::header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", first, last, total),
                )
                .body(buffer)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    self.cancel_session(&upload.upload_url).await;
                    return Err(e.into());
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                self.cancel_session(&upload.upload_url).await;
                return Err(BackupError::upload(
                    Some(status.as_u16()),
                    format!("Chunk bytes {}-{}/{} rejected: {}", first, last, total, error_text),
                ));
            }

            if let Some(observer) = progress {
                observer.on_bytes_transferred(len);
            }
        }

        tracing::debug!(remote = %remote, bytes = total, "Upload session complete");
        Ok(total)
    }

    /// Single-request upload, used for empty files
    pub async fn upload_small(
        &self,
        session: &GraphSession,
        drive_id: &str,
        local: &Path,
        remote: &str,
    ) -> Result<u64> {
        let content = tokio::fs::read(local).await?;
        let size = content.len() as u64;

        let response = self
            .transfer
            .put(self.item_url(drive_id, remote, "content"))
            .bearer_auth(&session.access_token)
            .body(content)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackupError::upload(Some(status.as_u16()), error_text));
        }

        Ok(size)
    }

    /// Sessions are not resumed across attempts, so a broken one is dropped
    async fn cancel_session(&self, upload_url: &str) {
        if let Err(e) = self.api.delete(upload_url).send().await {
            tracing::debug!(error = %e, "Failed to cancel upload session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_effective_chunk_size() {
        assert_eq!(effective_chunk_size(100 * MIB, 5 * MIB), 5 * MIB);
        assert_eq!(effective_chunk_size(5 * MIB, 5 * MIB), 5 * MIB);
        assert_eq!(effective_chunk_size(1000, 5 * MIB), 999);
        assert_eq!(effective_chunk_size(1, 5 * MIB), 1);
        assert_eq!(effective_chunk_size(0, 5 * MIB), 1);
    }

    #[test]
    fn test_chunk_ranges_cover_file() {
        let total = 12 * MIB + 17;
        let ranges = chunk_ranges(total, 5 * MIB);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], (0, 5 * MIB - 1));
        assert_eq!(ranges[2].1, total - 1);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1 + 1, pair[1].0);
        }
    }

    #[test]
    fn test_small_file_takes_two_chunks() {
        let total = 1000;
        let ranges = chunk_ranges(total, effective_chunk_size(total, 5 * MIB));
        assert_eq!(ranges, vec![(0, 998), (999, 999)]);
    }

    #[test]
    fn test_empty_file_has_no_ranges() {
        assert!(chunk_ranges(0, 5 * MIB).is_empty());
    }

    #[test]
    fn test_remote_path_encodes_segments() {
        let path = remote_path(
            "Zoom Backups",
            "a.user@example.com",
            "Weekly_Sync - 2024.03.05",
            "2024.03.05 - Weekly_Sync - Audio Only - f#1.m4a",
        );
        assert_eq!(
            path,
            "Zoom%20Backups/a.user%40example.com/Weekly_Sync%20-%202024.03.05/2024.03.05%20-%20Weekly_Sync%20-%20Audio%20Only%20-%20f%231.m4a"
        );
    }

    #[test]
    fn test_remote_path_keeps_nested_folders() {
        assert_eq!(remote_path("Backups/Zoom", "u", "2024/03", "a.mp4"), "Backups/Zoom/u/2024/03/a.mp4");
    }
}

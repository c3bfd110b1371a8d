use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::FileStatus;
use crate::error::{BackupError, Result};

/// One meeting as returned by `GET /users/{user}/recordings`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecording {
    pub uuid: Option<String>,
    pub account_id: Option<String>,
    pub host_id: Option<String>,
    pub topic: Option<String>,
    pub start_time: Option<String>,
    pub total_size: Option<u64>,
    pub recording_play_passcode: Option<String>,
    #[serde(default)]
    pub recording_files: Vec<RawRecordingFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecordingFile {
    pub id: Option<String>,
    pub file_type: Option<String>,
    pub file_extension: Option<String>,
    pub file_size: Option<u64>,
    pub download_url: Option<String>,
    pub recording_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFile {
    pub id: String,
    pub download_url: String,
    pub file_extension: String,
    pub recording_type: String,
    pub file_size: Option<u64>,
    pub status: FileStatus,
}

impl RecordingFile {
    pub fn from_raw(raw: &RawRecordingFile) -> Result<Self> {
        let id = non_empty(raw.id.as_deref())
            .ok_or_else(|| BackupError::internal("recording file without an id"))?;
        let download_url = non_empty(raw.download_url.as_deref()).ok_or_else(|| {
            BackupError::internal(format!("recording file {} has no download_url", id))
        })?;

        let file_type = raw.file_type.as_deref().unwrap_or("");
        let recording_type = match file_type {
            "" => "incomplete".to_string(),
            "TIMELINE" => "timeline".to_string(),
            _ => non_empty(raw.recording_type.as_deref())
                .unwrap_or_else(|| file_type.to_lowercase()),
        };

        let file_extension = non_empty(raw.file_extension.as_deref())
            .unwrap_or_else(|| {
                if file_type.is_empty() {
                    "bin".to_string()
                } else {
                    file_type.to_string()
                }
            })
            .to_lowercase();

        Ok(Self {
            id,
            download_url,
            file_extension,
            recording_type,
            file_size: raw.file_size,
            status: FileStatus::Pending,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    /// Meeting uuid, the ledger key
    pub id: String,
    pub account_id: String,
    pub topic: String,
    pub start_time: DateTime<Utc>,
    pub size_bytes: u64,
    /// Playback passcode appended to download URLs
    pub password: Option<String>,
    /// Email of the user the recording was listed for
    pub owner: String,
    pub files: Vec<RecordingFile>,
}

impl Recording {
    /// Validates an API record. Files that cannot be downloaded are dropped
    /// with a warning; a missing uuid or unreadable start time rejects the
    /// whole recording.
    pub fn from_raw(raw: &RawRecording, owner: &str) -> Result<Self> {
        let id = non_empty(raw.uuid.as_deref())
            .ok_or_else(|| BackupError::internal("recording without a uuid"))?;

        let start_raw = raw.start_time.as_deref().unwrap_or("");
        let start_time = parse_start_time(start_raw).ok_or_else(|| {
            BackupError::internal(format!(
                "recording {} has an unreadable start_time '{}'",
                id, start_raw
            ))
        })?;

        let mut files = Vec::with_capacity(raw.recording_files.len());
        for raw_file in &raw.recording_files {
            match RecordingFile::from_raw(raw_file) {
                Ok(file) => files.push(file),
                Err(e) => tracing::warn!(
                    meeting_id = %id,
                    error = %e,
                    "Skipping recording file"
                ),
            }
        }

        Ok(Self {
            id,
            account_id: raw.account_id.clone().unwrap_or_default(),
            topic: raw.topic.clone().unwrap_or_default(),
            start_time,
            size_bytes: raw.total_size.unwrap_or(0),
            password: non_empty(raw.recording_play_passcode.as_deref()),
            owner: owner.to_string(),
            files,
        })
    }
}

/// Zoom sends RFC 3339; naive timestamps are taken as UTC
pub fn parse_start_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Backup progress of a single recording file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Downloaded,
    #[serde(alias = "download failed", alias = "downloadFailed")]
    DownloadFailed,
    Uploaded,
    #[serde(alias = "upload failed", alias = "uploadFailed")]
    UploadFailed,
}

impl Default for FileStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl FileStatus {
    pub const ALL: [FileStatus; 5] = [
        FileStatus::Pending,
        FileStatus::Downloaded,
        FileStatus::DownloadFailed,
        FileStatus::Uploaded,
        FileStatus::UploadFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Downloaded => "downloaded",
            FileStatus::DownloadFailed => "download_failed",
            FileStatus::Uploaded => "uploaded",
            FileStatus::UploadFailed => "upload_failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FileStatus::DownloadFailed | FileStatus::UploadFailed)
    }

    /// Statuses the state machine takes no action on
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            FileStatus::Uploaded | FileStatus::DownloadFailed | FileStatus::UploadFailed
        )
    }

    /// The status a manual retry moves a failed file back to
    pub fn retry_status(&self) -> Option<FileStatus> {
        match self {
            FileStatus::DownloadFailed => Some(FileStatus::Pending),
            FileStatus::UploadFailed => Some(FileStatus::Downloaded),
            _ => None,
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

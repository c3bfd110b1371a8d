//! Per-file transitions.
//!
//! `pending` files are downloaded to the staging path, `downloaded` files are
//! uploaded and their staging copy removed. Failed and uploaded files are left
//! alone. Every transition is written to the ledger before the next one starts,
//! so an interrupted run resumes from the last recorded status.

use std::path::{Path, PathBuf};

use super::stats::FileOutcome;
use crate::ledger::LedgerStore;
use crate::recording::{FileNames, FileStatus, NamingTemplates, Recording, RecordingFile};
use crate::sharepoint::{remote_path, GraphSession, UploadTarget};
use crate::transfer::{with_retry, LoggingProgress, ProgressObserver, RetryPolicy};
use crate::zoom::{DownloadRequest, ZoomApi, ZoomSession};

/// The upload half of the pipeline; absent for a local-only backup
pub struct UploadStage<'a> {
    pub target: &'a dyn UploadTarget,
    pub session: &'a GraphSession,
    pub remote_folder: String,
}

pub struct FileProcessor<'a> {
    zoom: &'a dyn ZoomApi,
    zoom_session: &'a ZoomSession,
    ledger: &'a LedgerStore,
    templates: &'a NamingTemplates,
    staging_root: PathBuf,
    upload: Option<UploadStage<'a>>,
    retry: RetryPolicy,
    dry_run: bool,
}

impl<'a> FileProcessor<'a> {
    pub fn new(
        zoom: &'a dyn ZoomApi,
        zoom_session: &'a ZoomSession,
        ledger: &'a LedgerStore,
        templates: &'a NamingTemplates,
        staging_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            zoom,
            zoom_session,
            ledger,
            templates,
            staging_root: staging_root.into(),
            upload: None,
            retry: RetryPolicy::default(),
            dry_run: false,
        }
    }

    pub fn with_upload(mut self, stage: UploadStage<'a>) -> Self {
        self.upload = Some(stage);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn upload_enabled(&self) -> bool {
        self.upload.is_some()
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// `{staging_root}/{folder}/{filename}`
    pub fn staging_path(&self, recording: &Recording, file: &RecordingFile) -> PathBuf {
        let names = self.templates.format_names(recording, file);
        self.staging_path_for(&names)
    }

    fn staging_path_for(&self, names: &FileNames) -> PathBuf {
        let mut path = self.staging_root.clone();
        for segment in names.folder.split('/') {
            path.push(segment);
        }
        path.push(&names.filename);
        path
    }

    /// Advances `file` as far as its status allows and reports what happened.
    /// `file.status` is updated in place.
    pub async fn process_file(&self, recording: &Recording, file: &mut RecordingFile) -> FileOutcome {
        if file.status.is_settled() {
            if file.status.is_failed() {
                tracing::warn!(
                    meeting_id = %recording.id,
                    file_id = %file.id,
                    status = %file.status,
                    "File failed in an earlier run, skipping"
                );
            } else {
                tracing::debug!(meeting_id = %recording.id, file_id = %file.id, "Already uploaded");
            }
            return FileOutcome::Skipped(file.status);
        }

        let names = self.templates.format_names(recording, file);
        let local = self.staging_path_for(&names);
        let remote = self
            .upload
            .as_ref()
            .map(|stage| remote_path(&stage.remote_folder, &recording.owner, &names.folder, &names.filename));

        if self.dry_run {
            self.log_planned(recording, file, &local, remote.as_deref());
            return FileOutcome::DryRun;
        }

        let mut downloaded = None;
        if file.status == FileStatus::Pending {
            match self.download(recording, file, &local).await {
                Ok(bytes) => {
                    file.status = FileStatus::Downloaded;
                    self.persist(recording, file);
                    downloaded = Some(bytes);
                }
                Err(e) => {
                    tracing::error!(
                        meeting_id = %recording.id,
                        file_id = %file.id,
                        error = %e,
                        "Failed to download file"
                    );
                    if let Err(e) = tokio::fs::remove_file(&local).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            tracing::debug!(path = %local.display(), error = %e, "Partial download not removed");
                        }
                    }
                    file.status = FileStatus::DownloadFailed;
                    self.persist(recording, file);
                    return FileOutcome::DownloadFailed;
                }
            }
        }

        let (Some(stage), Some(remote)) = (&self.upload, remote) else {
            return match downloaded {
                Some(bytes) => FileOutcome::Downloaded { bytes },
                None => FileOutcome::Skipped(file.status),
            };
        };

        match self.upload(stage, &local, &remote).await {
            Ok(bytes) => {
                file.status = FileStatus::Uploaded;
                // Without a ledger record the next run uploads again from the staged copy
                if !self.persist(recording, file) {
                    tracing::warn!(path = %local.display(), "Keeping staged file until the ledger records the upload");
                } else if let Err(e) = tokio::fs::remove_file(&local).await {
                    tracing::warn!(path = %local.display(), error = %e, "Failed to remove staged file");
                }
                tracing::info!(
                    meeting_id = %recording.id,
                    file_id = %file.id,
                    remote = %remote,
                    "File backed up"
                );
                FileOutcome::Uploaded { bytes }
            }
            Err(e) => {
                tracing::error!(
                    meeting_id = %recording.id,
                    file_id = %file.id,
                    path = %local.display(),
                    error = %e,
                    "Failed to upload file, keeping staged copy"
                );
                file.status = FileStatus::UploadFailed;
                self.persist(recording, file);
                FileOutcome::UploadFailed
            }
        }
    }

    async fn download(&self, recording: &Recording, file: &RecordingFile, local: &Path) -> crate::error::Result<u64> {
        tracing::info!(
            meeting_id = %recording.id,
            file_id = %file.id,
            path = %local.display(),
            "Downloading file"
        );

        let zoom = self.zoom;
        let session = self.zoom_session;
        let request = DownloadRequest::for_file(recording, &file.download_url);
        let request = &request;
        let label = format!("download {}", file.id);
        let name = label.as_str();
        let total = file.file_size.unwrap_or(0);

        with_retry(&self.retry, &label, move || {
            let progress = LoggingProgress::new(name, total);
            async move {
                let observer: &dyn ProgressObserver = &progress;
                zoom.download_file(session, request, local, Some(observer)).await
            }
        })
        .await
    }

    async fn upload(&self, stage: &UploadStage<'_>, local: &Path, remote: &str) -> crate::error::Result<u64> {
        let total = tokio::fs::metadata(local).await?.len();
        tracing::info!(path = %local.display(), remote = %remote, bytes = total, "Uploading file");

        let target = stage.target;
        let session = stage.session;
        let label = format!("upload {}", remote);
        let name = label.as_str();

        with_retry(&self.retry, &label, move || {
            let progress = LoggingProgress::new(name, total);
            async move {
                let observer: &dyn ProgressObserver = &progress;
                target.upload_file(session, local, remote, Some(observer)).await
            }
        })
        .await
    }

    /// Records the file's status; false when the ledger could not be written
    fn persist(&self, recording: &Recording, file: &RecordingFile) -> bool {
        match self.ledger.record_file(recording, file) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    meeting_id = %recording.id,
                    file_id = %file.id,
                    status = %file.status,
                    error = %e,
                    "Failed to write ledger"
                );
                false
            }
        }
    }

    fn log_planned(&self, recording: &Recording, file: &RecordingFile, local: &Path, remote: Option<&str>) {
        tracing::info!(
            meeting_id = %recording.id,
            file_id = %file.id,
            url = %file.download_url,
            path = %local.display(),
            remote = remote.unwrap_or("-"),
            "Dry run: {}",
            planned_action(file.status, remote.is_some())
        );
    }
}

/// What a real run would do with an unsettled file
fn planned_action(status: FileStatus, upload: bool) -> &'static str {
    match (status, upload) {
        (FileStatus::Pending, true) => "would download and upload",
        (FileStatus::Pending, false) => "would download and keep the file locally",
        (_, true) => "would upload the staged file",
        (_, false) => "would leave the staged file in place",
    }
}

use std::future::Future;

use chrono::NaiveDate;

use super::cleanup::remove_empty_dirs;
use super::file_state::FileProcessor;
use super::stats::RunStats;
use crate::error::{BackupError, Result};
use crate::ledger::{Ledger, LedgerStore};
use crate::recording::{FileStatus, Recording};
use crate::transfer::RetryPolicy;
use crate::zoom::{list_recordings, ZoomApi, ZoomSession};

/// Races a backup run against an interrupt. On interrupt the run future is
/// dropped at its current await point and `None` is returned. Ledger writes
/// never await, so the ledger holds the last completed transition.
pub async fn run_until_interrupted<R, I>(run: R, interrupt: I) -> Option<Result<RunStats>>
where
    R: Future<Output = Result<RunStats>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        result = run => Some(result),
        _ = interrupt => None,
    }
}

/// One backup pass over a set of users
pub struct BackupRun<'a> {
    zoom: &'a dyn ZoomApi,
    zoom_session: &'a ZoomSession,
    ledger: &'a LedgerStore,
    processor: FileProcessor<'a>,
    range: (NaiveDate, NaiveDate),
    listing_retry: RetryPolicy,
}

impl<'a> BackupRun<'a> {
    pub fn new(
        zoom: &'a dyn ZoomApi,
        zoom_session: &'a ZoomSession,
        ledger: &'a LedgerStore,
        processor: FileProcessor<'a>,
        range: (NaiveDate, NaiveDate),
    ) -> Self {
        Self {
            zoom,
            zoom_session,
            ledger,
            processor,
            range,
            listing_retry: RetryPolicy::default(),
        }
    }

    pub fn with_listing_retry(mut self, retry: RetryPolicy) -> Self {
        self.listing_retry = retry;
        self
    }

    /// Lists, reconciles and processes every recording of `users`.
    ///
    /// Fails with [`BackupError::NoRecordings`] when the API lists nothing and
    /// the ledger is empty; per-file failures only show up in the returned
    /// stats.
    pub async fn execute(&self, users: &[String]) -> Result<RunStats> {
        if !self.processor.is_dry_run() && self.ledger.create_if_absent()? {
            tracing::info!(path = %self.ledger.path().display(), "Starting with a new ledger");
        }
        let ledger = self.ledger.load_or_empty();

        let mut recordings = self.fetch_recordings(users).await;
        if recordings.is_empty() {
            recordings = self.recordings_from_ledger(&ledger)?;
        }

        self.reconcile(&mut recordings, &ledger);

        let mut stats = RunStats::default();
        for recording in recordings.iter_mut() {
            if !users.iter().any(|u| u == &recording.owner) {
                tracing::info!(
                    meeting_id = %recording.id,
                    user = %recording.owner,
                    "User not in the supplied user list, skipping recording"
                );
                continue;
            }

            tracing::info!(
                meeting_id = %recording.id,
                topic = %recording.topic,
                files = recording.files.len(),
                "Processing recording"
            );

            let mut files = std::mem::take(&mut recording.files);
            for file in files.iter_mut() {
                let outcome = self.processor.process_file(recording, file).await;
                stats.record(&outcome);
            }
            recording.files = files;
        }

        stats.print_summary();
        if !self.processor.is_dry_run() {
            self.cleanup_staging();
        }
        Ok(stats)
    }

    async fn fetch_recordings(&self, users: &[String]) -> Vec<Recording> {
        let mut recordings = Vec::new();

        for user in users {
            let raw = list_recordings(
                self.zoom,
                self.zoom_session,
                user,
                self.range,
                &self.listing_retry,
            )
            .await;

            for meeting in &raw {
                match Recording::from_raw(meeting, user) {
                    Ok(recording) => recordings.push(recording),
                    Err(e) => tracing::warn!(user = %user, error = %e, "Skipping malformed recording"),
                }
            }
        }
        recordings
    }

    fn recordings_from_ledger(&self, ledger: &Ledger) -> Result<Vec<Recording>> {
        if ledger.is_empty() {
            tracing::error!("No recordings listed and the ledger is empty");
            return Err(BackupError::NoRecordings);
        }

        let recordings = ledger.recordings();
        if recordings.is_empty() {
            tracing::warn!(
                entries = ledger.len(),
                "No recordings listed and no ledger entry carries recording details, nothing to process"
            );
            return Ok(recordings);
        }

        tracing::info!(
            count = recordings.len(),
            "No recordings listed, continuing with recordings from the ledger"
        );
        Ok(recordings)
    }

    /// Applies ledger statuses to freshly listed files. A `downloaded` file
    /// whose staged copy is gone goes back to `pending`.
    fn reconcile(&self, recordings: &mut [Recording], ledger: &Ledger) {
        for recording in recordings.iter_mut() {
            for i in 0..recording.files.len() {
                if let Some(status) = ledger.file_status(&recording.id, &recording.files[i].id) {
                    recording.files[i].status = status;
                }

                if recording.files[i].status == FileStatus::Downloaded {
                    let staged = self.processor.staging_path(recording, &recording.files[i]);
                    if !staged.exists() {
                        tracing::warn!(
                            meeting_id = %recording.id,
                            file_id = %recording.files[i].id,
                            path = %staged.display(),
                            "Staged file missing, downloading again"
                        );
                        recording.files[i].status = FileStatus::Pending;
                    }
                }
            }
        }
    }

    fn cleanup_staging(&self) {
        match remove_empty_dirs(self.processor.staging_root()) {
            Ok(0) => {}
            Ok(removed) => tracing::debug!(removed, "Removed empty staging directories"),
            Err(e) => tracing::warn!(error = %e, "Failed to clean up staging directory"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::UploadStage;
    use crate::error::Result;
    use crate::recording::{NamingTemplates, RawRecording, RawRecordingFile, RecordingFile};
    use crate::sharepoint::{GraphSession, UploadTarget};
    use crate::transfer::ProgressObserver;
    use crate::zoom::{DateWindow, DownloadRequest, RecordingsPage};
    use async_trait::async_trait;
    use chrono_tz::Tz;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FakeZoom {
        meetings: Vec<RawRecording>,
        downloads: AtomicU32,
        stall_downloads: bool,
    }

    impl FakeZoom {
        fn new(meetings: Vec<RawRecording>) -> Self {
            Self {
                meetings,
                downloads: AtomicU32::new(0),
                stall_downloads: false,
            }
        }
    }

    #[async_trait]
    impl ZoomApi for FakeZoom {
        async fn fetch_recordings_page(
            &self,
            _session: &ZoomSession,
            user: &str,
            _window: &DateWindow,
            _next_page_token: Option<&str>,
        ) -> Result<RecordingsPage> {
            let meetings = self
                .meetings
                .iter()
                .filter(|m| m.host_id.as_deref() == Some(user))
                .cloned()
                .collect();
            Ok(RecordingsPage {
                meetings: Some(meetings),
                next_page_token: None,
            })
        }

        async fn download_file(
            &self,
            _session: &ZoomSession,
            _request: &DownloadRequest,
            dest: &Path,
            _progress: Option<&dyn ProgressObserver>,
        ) -> Result<u64> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            tokio::fs::create_dir_all(dest.parent().unwrap()).await?;
            if self.stall_downloads {
                tokio::fs::write(dest, b"01234").await?;
                return std::future::pending().await;
            }
            tokio::fs::write(dest, b"0123456789").await?;
            Ok(10)
        }
    }

    struct CountingTarget {
        uploads: AtomicU32,
    }

    #[async_trait]
    impl UploadTarget for CountingTarget {
        async fn upload_file(
            &self,
            _session: &GraphSession,
            local_path: &Path,
            _remote_path: &str,
            _progress: Option<&dyn ProgressObserver>,
        ) -> Result<u64> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(tokio::fs::metadata(local_path).await?.len())
        }
    }

    fn meeting(uuid: &str, host: &str) -> RawRecording {
        RawRecording {
            uuid: Some(uuid.to_string()),
            host_id: Some(host.to_string()),
            topic: Some("Team Sync".to_string()),
            start_time: Some("2024-05-06T10:00:00Z".to_string()),
            total_size: Some(10),
            recording_files: vec![RawRecordingFile {
                id: Some(format!("{}-file", uuid)),
                file_type: Some("MP4".to_string()),
                file_extension: Some("MP4".to_string()),
                file_size: Some(10),
                download_url: Some(format!("https://zoom.us/rec/download/{}", uuid)),
                recording_type: Some("active_speaker".to_string()),
            }],
            ..Default::default()
        }
    }

    fn templates() -> NamingTemplates {
        NamingTemplates::new("{recording_id}.{file_extension}", "{topic}", "%Y", Tz::UTC).unwrap()
    }

    fn range() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_second_run_skips_uploaded_files() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::new(dir.path().join("ledger.json"));
        let zoom = FakeZoom::new(vec![meeting("m1", "a@example.com")]);
        let target = CountingTarget {
            uploads: AtomicU32::new(0),
        };
        let session = ZoomSession::new("z");
        let graph = GraphSession::new("g");
        let templates = templates();
        let users = vec!["a@example.com".to_string()];

        for _ in 0..2 {
            let processor = FileProcessor::new(&zoom, &session, &ledger, &templates, dir.path().join("staging"))
                .with_retry_policy(fast())
                .with_upload(UploadStage {
                    target: &target,
                    session: &graph,
                    remote_folder: "Backups".to_string(),
                });
            BackupRun::new(&zoom, &session, &ledger, processor, range())
                .with_listing_retry(fast())
                .execute(&users)
                .await
                .unwrap();
        }

        assert_eq!(zoom.downloads.load(Ordering::SeqCst), 1);
        assert_eq!(target.uploads.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("staging").exists());
        assert_eq!(std::fs::read_dir(dir.path().join("staging")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_listed_and_empty_ledger_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::new(dir.path().join("ledger.json"));
        let zoom = FakeZoom::new(Vec::new());
        let session = ZoomSession::new("z");
        let templates = templates();
        let processor = FileProcessor::new(&zoom, &session, &ledger, &templates, dir.path().join("staging"));

        let err = BackupRun::new(&zoom, &session, &ledger, processor, range())
            .with_listing_retry(fast())
            .execute(&["a@example.com".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::NoRecordings));
        assert!(ledger.path().exists());
    }

    #[tokio::test]
    async fn test_nothing_listed_and_ledger_without_details_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::new(dir.path().join("ledger.json"));
        std::fs::write(
            ledger.path(),
            r#"{"meeting-1": {"download_url": "https://zoom.us/rec/download/f1", "file_extension": "mp4", "id": "f1", "status": "pending", "type": "audio_only"}}"#,
        )
        .unwrap();
        let zoom = FakeZoom::new(Vec::new());
        let session = ZoomSession::new("z");
        let templates = templates();
        let processor = FileProcessor::new(&zoom, &session, &ledger, &templates, dir.path().join("staging"));

        let stats = BackupRun::new(&zoom, &session, &ledger, processor, range())
            .with_listing_retry(fast())
            .execute(&["a@example.com".to_string()])
            .await
            .unwrap();

        assert_eq!(stats, RunStats::default());
        assert_eq!(zoom.downloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_staged_file_is_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::new(dir.path().join("ledger.json"));
        let zoom = FakeZoom::new(vec![meeting("m1", "a@example.com")]);
        let session = ZoomSession::new("z");
        let templates = templates();

        let mut recording = Recording::from_raw(&meeting("m1", "a@example.com"), "a@example.com").unwrap();
        let mut file: RecordingFile = recording.files.remove(0);
        file.status = FileStatus::Downloaded;
        ledger.record_file(&recording, &file).unwrap();

        let processor = FileProcessor::new(&zoom, &session, &ledger, &templates, dir.path().join("staging"))
            .with_retry_policy(fast());
        let stats = BackupRun::new(&zoom, &session, &ledger, processor, range())
            .with_listing_retry(fast())
            .execute(&["a@example.com".to_string()])
            .await
            .unwrap();

        assert_eq!(zoom.downloads.load(Ordering::SeqCst), 1);
        assert_eq!(stats.downloaded_count, 1);
    }

    #[tokio::test]
    async fn test_interrupt_drops_run_during_download() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::new(dir.path().join("ledger.json"));
        let zoom = FakeZoom {
            stall_downloads: true,
            ..FakeZoom::new(vec![meeting("m1", "a@example.com"), meeting("m2", "a@example.com")])
        };
        let session = ZoomSession::new("z");
        let templates = templates();
        let users = vec!["a@example.com".to_string()];

        let processor = FileProcessor::new(&zoom, &session, &ledger, &templates, dir.path().join("staging"));
        let run = BackupRun::new(&zoom, &session, &ledger, processor, range()).with_listing_retry(fast());
        let interrupt = async {
            while zoom.downloads.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        let result = run_until_interrupted(run.execute(&users), interrupt).await;

        assert!(result.is_none());
        assert_eq!(zoom.downloads.load(Ordering::SeqCst), 1);
        let stored = ledger.load().unwrap();
        assert_ne!(stored.file_status("m1", "m1-file"), Some(FileStatus::Downloaded));
    }

    #[tokio::test]
    async fn test_completed_run_is_returned_without_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::new(dir.path().join("ledger.json"));
        let zoom = FakeZoom::new(vec![meeting("m1", "a@example.com")]);
        let session = ZoomSession::new("z");
        let templates = templates();
        let users = vec!["a@example.com".to_string()];

        let processor = FileProcessor::new(&zoom, &session, &ledger, &templates, dir.path().join("staging"));
        let run = BackupRun::new(&zoom, &session, &ledger, processor, range()).with_listing_retry(fast());

        let stats = run_until_interrupted(run.execute(&users), std::future::pending())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.downloaded_count, 1);
    }
}

//! Completion ledger.
//!
//! A JSON object keyed by meeting uuid that remembers the last known status of
//! every recording file, so an interrupted or failed run resumes instead of
//! starting over. Entries are created or merged, never deleted, and every
//! update rewrites the whole file through a temporary file plus rename.

mod entry;

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::{BackupError, Result};
use crate::recording::{FileStatus, Recording, RecordingFile};

pub use entry::{deep_merge, FileRecord, LedgerEntry, RecordingMeta};

/// In-memory copy of the ledger document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    entries: Map<String, Value>,
}

impl Ledger {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn meeting_ids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn raw(&self, meeting_id: &str) -> Option<&Value> {
        self.entries.get(meeting_id)
    }

    /// Typed view of one entry; malformed entries are logged and ignored
    pub fn entry(&self, meeting_id: &str) -> Option<LedgerEntry> {
        let value = self.entries.get(meeting_id)?;
        match LedgerEntry::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(meeting_id = %meeting_id, error = %e, "Ignoring malformed ledger entry");
                None
            }
        }
    }

    pub fn file_status(&self, meeting_id: &str, file_id: &str) -> Option<FileStatus> {
        self.entry(meeting_id)?.file_status(file_id)
    }

    /// Every file record as `(meeting_id, record)`
    pub fn file_records(&self) -> Vec<(String, FileRecord)> {
        self.entries
            .keys()
            .filter_map(|id| self.entry(id).map(|entry| (id.clone(), entry)))
            .flat_map(|(id, entry)| {
                entry
                    .file_records()
                    .into_iter()
                    .map(move |record| (id.clone(), record))
            })
            .collect()
    }

    /// Rebuilds recordings from entries that carry recording metadata
    pub fn recordings(&self) -> Vec<Recording> {
        let mut recordings = Vec::new();
        for meeting_id in self.entries.keys() {
            match self.entry(meeting_id).and_then(|e| e.to_recording(meeting_id)) {
                Some(recording) => recordings.push(recording),
                None => tracing::warn!(
                    meeting_id = %meeting_id,
                    "Ledger entry has no recording metadata, skipping"
                ),
            }
        }
        recordings
    }

    /// Inserts or field-wise merges an entry
    pub fn apply(&mut self, meeting_id: &str, fields: Map<String, Value>) {
        let mergeable = self.entries.get(meeting_id).map_or(false, Value::is_object);
        if mergeable {
            if let Some(existing) = self.entries.get_mut(meeting_id) {
                deep_merge(existing, Value::Object(fields));
            }
        } else {
            self.entries.insert(meeting_id.to_string(), Value::Object(fields));
        }
    }

    fn from_json(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim_start_matches('\u{feff}');
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(entries)) => Ok(Self { entries }),
            Ok(_) => Err("top level is not a JSON object".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Result of a manual retry over the whole ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub download_failed: usize,
    pub upload_failed: usize,
}

impl ResetSummary {
    pub fn total(&self) -> usize {
        self.download_failed + self.upload_failed
    }
}

pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes an empty ledger when none exists. Returns true if one was created.
    pub fn create_if_absent(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.save(&Ledger::default())?;
        tracing::info!(path = %self.path.display(), "Created empty ledger");
        Ok(true)
    }

    pub fn load(&self) -> Result<Ledger> {
        let raw = std::fs::read_to_string(&self.path)?;
        Ledger::from_json(&raw).map_err(|reason| BackupError::CorruptLedger {
            path: self.path.display().to_string(),
            reason,
        })
    }

    /// Loads the ledger, treating a missing or corrupt file as empty
    pub fn load_or_empty(&self) -> Ledger {
        match self.load() {
            Ok(ledger) => ledger,
            Err(BackupError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ledger::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ledger unreadable, starting from an empty ledger");
                Ledger::default()
            }
        }
    }

    /// Merges `fields` into the entry for `meeting_id` and rewrites the file
    pub fn merge_update(&self, meeting_id: &str, fields: Map<String, Value>) -> Result<()> {
        let mut ledger = self.load_or_empty();
        ledger.apply(meeting_id, fields);
        self.save(&ledger)
    }

    /// Persists the current state of one file of a recording
    pub fn record_file(&self, recording: &Recording, file: &RecordingFile) -> Result<()> {
        let fields = LedgerEntry::for_file(recording, file).to_fields()?;
        self.merge_update(&recording.id, fields)?;
        tracing::debug!(
            meeting_id = %recording.id,
            file_id = %file.id,
            status = %file.status,
            "Ledger updated"
        );
        Ok(())
    }

    /// Moves failed files back into the state machine: download failures to
    /// `pending`, upload failures to `downloaded`
    pub fn reset_failed(&self) -> Result<ResetSummary> {
        let mut ledger = self.load()?;
        let mut summary = ResetSummary::default();

        let meeting_ids: Vec<String> = ledger.meeting_ids().cloned().collect();
        for meeting_id in meeting_ids {
            let Some(mut entry) = ledger.entry(&meeting_id) else {
                continue;
            };

            for record in entry.file_records() {
                match record.status {
                    Some(FileStatus::DownloadFailed) => summary.download_failed += 1,
                    Some(FileStatus::UploadFailed) => summary.upload_failed += 1,
                    _ => {}
                }
            }

            let mut changed = false;
            for record in entry.files.values_mut().chain(std::iter::once(&mut entry.latest)) {
                if let Some(next) = record.status.and_then(|s| s.retry_status()) {
                    record.status = Some(next);
                    changed = true;
                }
            }

            if changed {
                ledger.apply(&meeting_id, entry.to_fields()?);
            }
        }

        if summary.total() > 0 {
            self.save(&ledger)?;
        }
        Ok(summary)
    }

    /// Atomically replaces the ledger file
    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        let body = serde_json::to_vec_pretty(&Value::Object(ledger.entries.clone()))?;
        self.replace_with(|tmp| {
            tmp.write_all(&body)?;
            Ok(())
        })
    }

    /// Fills a temporary file beside the ledger and renames it over the
    /// ledger. If `write` fails the temporary file is dropped and the ledger
    /// keeps its previous contents.
    fn replace_with<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&mut NamedTempFile) -> Result<()>,
    {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        write(&mut tmp)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| BackupError::Io(e.error))?;
        Ok(())
    }
}

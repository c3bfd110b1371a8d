use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::recording::{parse_start_time, FileStatus, Recording, RecordingFile};

/// Last known state of one recording file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FileStatus>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub recording_type: Option<String>,
}

impl FileRecord {
    pub fn from_file(file: &RecordingFile) -> Self {
        Self {
            download_url: Some(file.download_url.clone()),
            file_extension: Some(file.file_extension.clone()),
            id: Some(file.id.clone()),
            status: Some(file.status),
            recording_type: Some(file.recording_type.clone()),
        }
    }

    fn to_file(&self) -> Option<RecordingFile> {
        Some(RecordingFile {
            id: self.id.clone()?,
            download_url: self.download_url.clone()?,
            file_extension: self.file_extension.clone().unwrap_or_default(),
            recording_type: self.recording_type.clone().unwrap_or_default(),
            file_size: None,
            status: self.status.unwrap_or_default(),
        })
    }
}

/// Recording metadata kept so a run can proceed without the API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMeta {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub user: String,
}

impl RecordingMeta {
    pub fn from_recording(recording: &Recording) -> Self {
        Self {
            account_id: recording.account_id.clone(),
            topic: recording.topic.clone(),
            start_time: recording.start_time.to_rfc3339(),
            size: recording.size_bytes,
            password: recording.password.clone(),
            user: recording.owner.clone(),
        }
    }
}

/// One meeting's ledger value.
///
/// The flat fields mirror the most recently written file; `files` keeps every
/// file of the meeting by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub latest: FileRecord,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, FileRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<RecordingMeta>,
}

impl LedgerEntry {
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut value = value.clone();
        normalize_legacy_status(&mut value);
        if let Some(files) = value.get_mut("files").and_then(Value::as_object_mut) {
            for file in files.values_mut() {
                normalize_legacy_status(file);
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// The update written after a file changes status
    pub fn for_file(recording: &Recording, file: &RecordingFile) -> Self {
        let record = FileRecord::from_file(file);
        let mut files = BTreeMap::new();
        files.insert(file.id.clone(), record.clone());

        Self {
            latest: record,
            files,
            recording: Some(RecordingMeta::from_recording(recording)),
        }
    }

    pub fn file_status(&self, file_id: &str) -> Option<FileStatus> {
        if let Some(record) = self.files.get(file_id) {
            return record.status;
        }
        match self.latest.id.as_deref() {
            Some(id) if id == file_id => self.latest.status,
            _ => None,
        }
    }

    /// Every file record of the meeting, falling back to the flat fields for
    /// entries written before per-file records existed
    pub fn file_records(&self) -> Vec<FileRecord> {
        if !self.files.is_empty() {
            return self.files.values().cloned().collect();
        }
        if self.latest.id.is_some() {
            vec![self.latest.clone()]
        } else {
            Vec::new()
        }
    }

    /// Rebuilds the recording when the entry carries its metadata
    pub fn to_recording(&self, meeting_id: &str) -> Option<Recording> {
        let meta = self.recording.as_ref()?;
        let start_time = parse_start_time(&meta.start_time)?;

        let files = self
            .file_records()
            .iter()
            .filter_map(FileRecord::to_file)
            .collect();

        Some(Recording {
            id: meeting_id.to_string(),
            account_id: meta.account_id.clone(),
            topic: meta.topic.clone(),
            start_time,
            size_bytes: meta.size,
            password: meta.password.clone(),
            owner: meta.user.clone(),
            files,
        })
    }

    pub fn to_fields(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

/// Older ledgers store the status under `_status`
fn normalize_legacy_status(value: &mut Value) {
    if let Some(map) = value.as_object_mut() {
        if let Some(legacy) = map.remove("_status") {
            map.entry("status").or_insert(legacy);
        }
    }
}

/// Field-wise merge: patch values overwrite, nested objects merge, keys only
/// present in `target` are preserved
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let nested = patch_value.is_object()
                    && target_map.get(&key).map_or(false, Value::is_object);

                if nested {
                    if let Some(existing) = target_map.get_mut(&key) {
                        deep_merge(existing, patch_value);
                    }
                } else {
                    target_map.insert(key, patch_value);
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

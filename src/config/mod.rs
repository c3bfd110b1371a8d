use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{BackupError, Result};
use crate::recording::NamingTemplates;
use crate::sharepoint::SharepointConfig;
use crate::transfer::RetryPolicy;
use crate::zoom::ZoomCredentials;

pub const DEFAULT_CONFIG_PATH: &str = "zoom-recording-cloud-backup.conf";

/// Environment variable overriding the config document location
pub const CONFIG_PATH_ENV: &str = "ZOOM_BACKUP_CONFIG";

pub const DEFAULT_FILENAME_TEMPLATE: &str =
    "{meeting_time} - {topic} - {rec_type} - {recording_id}.{file_extension}";
pub const DEFAULT_FOLDER_TEMPLATE: &str = "{topic} - {meeting_time}";
pub const DEFAULT_STRFTIME: &str = "%Y.%m.%d";

/// Days listed when no start date is configured
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "Zoom")]
    pub zoom: ZoomCredentials,
    #[serde(rename = "Sharepoint")]
    pub sharepoint: SharepointConfig,
    #[serde(rename = "Recordings", default)]
    pub recordings: RecordingsConfig,
    #[serde(rename = "Storage", default)]
    pub storage: StorageConfig,
    #[serde(rename = "Network", default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingsConfig {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub timezone: String,
    pub strftime: String,
    pub filename: String,
    pub folder: String,
}

impl Default for RecordingsConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            timezone: "UTC".to_string(),
            strftime: DEFAULT_STRFTIME.to_string(),
            filename: DEFAULT_FILENAME_TEMPLATE.to_string(),
            folder: DEFAULT_FOLDER_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Staging root for downloaded files
    pub download_dir: PathBuf,
    /// Ledger location
    pub completed_log: PathBuf,
    /// When false, files stop at `downloaded` and stay on local disk
    pub upload: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            completed_log: PathBuf::from("completed-downloads.json"),
            upload: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Timeout for downloads and upload chunks
    pub request_timeout_secs: u64,
    /// Timeout for listing and auth calls
    pub api_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 300,
            api_timeout_secs: 30,
            max_attempts: 3,
            retry_delay_secs: 3,
        }
    }
}

impl NetworkConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.retry_delay_secs))
    }
}

impl Config {
    /// Resolves the config path: explicit argument, then `ZOOM_BACKUP_CONFIG`
    /// (also read from `.env`), then the default file name.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        dotenv::dotenv().ok();

        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Reads, parses and validates the config document
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackupError::config(format!("Configuration file {} not found", path.display()))
            } else {
                BackupError::config(format!("Failed to read {}: {}", path.display(), e))
            }
        })?;

        let config = Self::from_json(&raw)
            .map_err(|e| BackupError::config(format!("{} in {}", e, path.display())))?;

        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let raw = raw.trim_start_matches('\u{feff}');
        let config: Config = serde_json::from_str(raw)
            .map_err(|e| BackupError::config(format!("Error parsing JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let required = [
            ("Zoom", "account_id", &self.zoom.account_id),
            ("Zoom", "client_id", &self.zoom.client_id),
            ("Zoom", "client_secret", &self.zoom.client_secret),
            ("Sharepoint", "tenant_id", &self.sharepoint.tenant_id),
            ("Sharepoint", "client_id", &self.sharepoint.client_id),
            ("Sharepoint", "site_url", &self.sharepoint.site_url),
            ("Sharepoint", "remote_folder_name", &self.sharepoint.remote_folder_name),
            ("Sharepoint", "drive_id", &self.sharepoint.drive_id),
        ];

        for (section, key, value) in required {
            if value.trim().is_empty() {
                return Err(BackupError::MissingConfiguration(format!(
                    "No value provided for {}:{}",
                    section, key
                )));
            }
        }

        if self.network.max_attempts == 0 {
            return Err(BackupError::config("Network:max_attempts must be at least 1"));
        }

        self.listing_range()?;
        self.naming_templates()?;
        Ok(())
    }

    /// The `[start, end)` listing range; the configured end date is inclusive
    pub fn listing_range(&self) -> Result<(NaiveDate, NaiveDate)> {
        let today = Utc::now().date_naive();

        let start = match &self.recordings.start_date {
            Some(s) if !s.trim().is_empty() => parse_date(s)?,
            _ => today - ChronoDuration::days(DEFAULT_LOOKBACK_DAYS),
        };
        let end_inclusive = match &self.recordings.end_date {
            Some(s) if !s.trim().is_empty() => parse_date(s)?,
            _ => today,
        };

        if start > end_inclusive {
            return Err(BackupError::config(format!(
                "Recordings:start_date {} is after Recordings:end_date {}",
                start, end_inclusive
            )));
        }

        Ok((start, end_inclusive + ChronoDuration::days(1)))
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.recordings.timezone.parse::<Tz>().map_err(|_| {
            BackupError::config(format!(
                "Unknown timezone '{}' in Recordings:timezone",
                self.recordings.timezone
            ))
        })
    }

    pub fn naming_templates(&self) -> Result<NamingTemplates> {
        NamingTemplates::new(
            &self.recordings.filename,
            &self.recordings.folder,
            &self.recordings.strftime,
            self.timezone()?,
        )
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .map_err(|_| BackupError::config(format!("Unrecognized date '{}'", value)))
}

/// Reads a JSON array of user emails
pub fn load_user_list(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BackupError::config(format!("Failed to read user file {}: {}", path.display(), e))
    })?;

    let users: Vec<String> = serde_json::from_str(raw.trim_start_matches('\u{feff}'))
        .map_err(|e| {
            BackupError::config(format!(
                "User file {} must be a JSON array of emails: {}",
                path.display(),
                e
            ))
        })?;

    Ok(users
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> String {
        r#"{
            "Zoom": {"account_id": "acc", "client_id": "zid", "client_secret": "secret"},
            "Sharepoint": {
                "tenant_id": "tenant",
                "client_id": "app",
                "site_url": "https://example.sharepoint.com",
                "remote_folder_name": "Zoom Backups",
                "drive_id": "b!drive"
            }
        }"#
        .to_string()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_json(&minimal_json()).unwrap();
        assert_eq!(config.storage.download_dir, PathBuf::from("downloads"));
        assert_eq!(
            config.storage.completed_log,
            PathBuf::from("completed-downloads.json")
        );
        assert!(config.storage.upload);
        assert_eq!(config.recordings.timezone, "UTC");
        assert_eq!(config.recordings.filename, DEFAULT_FILENAME_TEMPLATE);
        assert_eq!(config.network.max_attempts, 3);
        assert_eq!(config.network.retry_delay_secs, 3);
    }

    #[test]
    fn test_missing_required_key_is_descriptive() {
        let json = r#"{
            "Zoom": {"account_id": "acc", "client_id": "zid"},
            "Sharepoint": {"tenant_id": "t", "client_id": "c", "site_url": "s", "remote_folder_name": "r", "drive_id": "d"}
        }"#;
        let err = Config::from_json(json).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
        assert!(err.to_string().contains("client_secret"));
    }

    #[test]
    fn test_missing_site_url_rejected() {
        let json = minimal_json().replace(r#""site_url": "https://example.sharepoint.com","#, "");
        let err = Config::from_json(&json).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
        assert!(err.to_string().contains("site_url"));
    }

    #[test]
    fn test_empty_site_url_rejected() {
        let json = minimal_json().replace("https://example.sharepoint.com", " ");
        let err = Config::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("Sharepoint:site_url"));
    }

    #[test]
    fn test_empty_required_value_rejected() {
        let json = minimal_json().replace("\"secret\"", "\"\"");
        let err = Config::from_json(&json).unwrap_err();
        assert!(matches!(err, BackupError::MissingConfiguration(_)));
        assert!(err.to_string().contains("Zoom:client_secret"));
    }

    #[test]
    fn test_bom_tolerated() {
        let json = format!("\u{feff}{}", minimal_json());
        assert!(Config::from_json(&json).is_ok());
    }

    #[test]
    fn test_listing_range_end_is_inclusive() {
        let mut config = Config::from_json(&minimal_json()).unwrap();
        config.recordings.start_date = Some("2024-01-01".to_string());
        config.recordings.end_date = Some("2024-03-01T00:00:00Z".to_string());

        let (start, end) = config.listing_range().unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let mut config = Config::from_json(&minimal_json()).unwrap();
        config.recordings.start_date = Some("2024-05-01".to_string());
        config.recordings.end_date = Some("2024-04-01".to_string());
        assert!(config.listing_range().is_err());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let json = minimal_json().replace(
            "\"Sharepoint\"",
            "\"Recordings\": {\"timezone\": \"Mars/Olympus\"}, \"Sharepoint\"",
        );
        let err = Config::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let json = minimal_json().replace(
            "\"Sharepoint\"",
            "\"Recordings\": {\"filename\": \"{host}.{file_extension}\"}, \"Sharepoint\"",
        );
        let err = Config::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("host"));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(parse_date("2024-06-15").unwrap(), expected);
        assert_eq!(parse_date("2024-06-15T23:00:00+00:00").unwrap(), expected);
        assert!(parse_date("15/06/2024").is_err());
    }

    #[test]
    fn test_load_user_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, r#"["a@example.com", " b@example.com ", ""]"#).unwrap();

        let users = load_user_list(&path).unwrap();
        assert_eq!(users, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_load_user_list_rejects_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, r#"{"users": []}"#).unwrap();
        assert!(load_user_list(&path).is_err());
    }
}

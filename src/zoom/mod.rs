//! Zoom cloud recording API: authentication, listing and downloads.

mod client;
mod config;
mod windows;

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::Result;
use crate::recording::{RawRecording, Recording};
use crate::transfer::{with_retry, ProgressObserver, RetryPolicy};

pub use client::{download_url_with_auth, ZoomClient, ZoomSession};
pub use config::{
    ZoomCredentials, DEFAULT_API_BASE_URL, DEFAULT_OAUTH_URL, DEFAULT_PAGE_SIZE, MAX_WINDOW_DAYS,
};
pub use windows::{date_windows, DateWindow};

/// One page of `GET /users/{user}/recordings`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordingsPage {
    /// Absent on some error payloads
    #[serde(default)]
    pub meetings: Option<Vec<RawRecording>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// What a download needs beyond the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub password: Option<String>,
}

impl DownloadRequest {
    pub fn for_file(recording: &Recording, download_url: &str) -> Self {
        Self {
            url: download_url.to_string(),
            password: recording.password.clone(),
        }
    }
}

#[async_trait]
pub trait ZoomApi: Send + Sync {
    async fn fetch_recordings_page(
        &self,
        session: &ZoomSession,
        user: &str,
        window: &DateWindow,
        next_page_token: Option<&str>,
    ) -> Result<RecordingsPage>;

    /// Streams a recording file to `dest` and returns the bytes written
    async fn download_file(
        &self,
        session: &ZoomSession,
        request: &DownloadRequest,
        dest: &Path,
        progress: Option<&dyn ProgressObserver>,
    ) -> Result<u64>;
}

/// Lists every recording of `user` in `[start, end)`, one window and page at a
/// time. A window that keeps failing is skipped so the rest of the range still
/// gets listed.
pub async fn list_recordings<A>(
    api: &A,
    session: &ZoomSession,
    user: &str,
    range: (NaiveDate, NaiveDate),
    retry: &RetryPolicy,
) -> Vec<RawRecording>
where
    A: ZoomApi + ?Sized,
{
    let (start, end) = range;
    let mut recordings = Vec::new();

    for window in date_windows(start, end, MAX_WINDOW_DAYS) {
        let mut next_page_token: Option<String> = None;
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut page_number = 0u32;

        loop {
            page_number += 1;
            let page_token = next_page_token.as_deref();
            let window_ref = &window;

            let page = with_retry(retry, "list recordings", move || {
                api.fetch_recordings_page(session, user, window_ref, page_token)
            })
            .await;

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    tracing::error!(
                        user = %user,
                        from = %window.start,
                        to = %window.last_day(),
                        page = page_number,
                        error = %e,
                        "Skipping window after failed listing"
                    );
                    break;
                }
            };

            match page.meetings {
                Some(meetings) => {
                    tracing::debug!(
                        user = %user,
                        from = %window.start,
                        page = page_number,
                        count = meetings.len(),
                        "Listed recordings page"
                    );
                    recordings.extend(meetings);
                }
                None => {
                    tracing::warn!(
                        user = %user,
                        from = %window.start,
                        page = page_number,
                        "Recordings page has no meetings field, treating as empty"
                    );
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) if seen_tokens.insert(token.clone()) => {
                    next_page_token = Some(token);
                }
                Some(token) => {
                    tracing::warn!(
                        user = %user,
                        from = %window.start,
                        page = page_number,
                        token = %token,
                        "Page token already followed, stopping paging for this window"
                    );
                    break;
                }
                None => break,
            }
        }
    }

    tracing::info!(user = %user, count = recordings.len(), "Listed recordings");
    recordings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;
    use std::sync::Mutex;
    use std::time::Duration;

    type Responder = Box<dyn Fn(&DateWindow, Option<&str>) -> Result<RecordingsPage> + Send + Sync>;

    struct FakeApi {
        respond: Responder,
        calls: Mutex<Vec<(NaiveDate, NaiveDate, Option<String>)>>,
    }

    impl FakeApi {
        fn new(respond: Responder) -> Self {
            Self {
                respond,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(NaiveDate, NaiveDate, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ZoomApi for FakeApi {
        async fn fetch_recordings_page(
            &self,
            _session: &ZoomSession,
            _user: &str,
            window: &DateWindow,
            next_page_token: Option<&str>,
        ) -> Result<RecordingsPage> {
            self.calls.lock().unwrap().push((
                window.start,
                window.last_day(),
                next_page_token.map(str::to_string),
            ));
            (self.respond)(window, next_page_token)
        }

        async fn download_file(
            &self,
            _session: &ZoomSession,
            _request: &DownloadRequest,
            _dest: &Path,
            _progress: Option<&dyn ProgressObserver>,
        ) -> Result<u64> {
            Err(BackupError::internal("not used"))
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn meeting(uuid: &str) -> RawRecording {
        RawRecording {
            uuid: Some(uuid.to_string()),
            ..Default::default()
        }
    }

    fn no_delay() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_windows_sent_with_inclusive_to() {
        let api = FakeApi::new(Box::new(|_, _| {
            Ok(RecordingsPage {
                meetings: Some(Vec::new()),
                next_page_token: None,
            })
        }));
        let session = ZoomSession::new("tok");

        list_recordings(&api, &session, "a@example.com", (day(2024, 1, 1), day(2024, 3, 1)), &no_delay())
            .await;

        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].0, calls[0].1), (day(2024, 1, 1), day(2024, 1, 30)));
        assert_eq!((calls[1].0, calls[1].1), (day(2024, 1, 31), day(2024, 2, 29)));
    }

    #[tokio::test]
    async fn test_follows_page_tokens() {
        let api = FakeApi::new(Box::new(|_, token| {
            Ok(match token {
                None => RecordingsPage {
                    meetings: Some(vec![meeting("m1")]),
                    next_page_token: Some("p2".to_string()),
                },
                Some(_) => RecordingsPage {
                    meetings: Some(vec![meeting("m2")]),
                    next_page_token: Some(String::new()),
                },
            })
        }));
        let session = ZoomSession::new("tok");

        let recordings =
            list_recordings(&api, &session, "u", (day(2024, 1, 1), day(2024, 1, 10)), &no_delay())
                .await;

        let ids: Vec<_> = recordings.iter().filter_map(|r| r.uuid.clone()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(api.calls()[1].2.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_exhausted_window_is_skipped() {
        let first_window_start = day(2024, 1, 1);
        let api = FakeApi::new(Box::new(move |window, _| {
            if window.start == first_window_start {
                Err(BackupError::TransientNetwork("timed out".to_string()))
            } else {
                Ok(RecordingsPage {
                    meetings: Some(vec![meeting("later")]),
                    next_page_token: None,
                })
            }
        }));
        let session = ZoomSession::new("tok");

        let recordings =
            list_recordings(&api, &session, "u", (day(2024, 1, 1), day(2024, 2, 15)), &no_delay())
                .await;

        assert_eq!(recordings.len(), 1);
        let attempts_on_first = api
            .calls()
            .iter()
            .filter(|c| c.0 == first_window_start)
            .count();
        assert_eq!(attempts_on_first, 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_not_retried() {
        let api = FakeApi::new(Box::new(|_, _| {
            Err(BackupError::Network("404 user not found".to_string()))
        }));
        let session = ZoomSession::new("tok");

        let recordings =
            list_recordings(&api, &session, "u", (day(2024, 1, 1), day(2024, 1, 5)), &no_delay())
                .await;

        assert!(recordings.is_empty());
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_meetings_treated_as_empty() {
        let api = FakeApi::new(Box::new(|_, _| Ok(RecordingsPage::default())));
        let session = ZoomSession::new("tok");

        let recordings =
            list_recordings(&api, &session, "u", (day(2024, 1, 1), day(2024, 1, 5)), &no_delay())
                .await;
        assert!(recordings.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_page_token_stops_paging() {
        let api = FakeApi::new(Box::new(|_, _| {
            Ok(RecordingsPage {
                meetings: Some(vec![meeting("m")]),
                next_page_token: Some("same".to_string()),
            })
        }));
        let session = ZoomSession::new("tok");

        let recordings =
            list_recordings(&api, &session, "u", (day(2024, 1, 1), day(2024, 1, 5)), &no_delay())
                .await;
        assert_eq!(recordings.len(), 2);
    }

    #[tokio::test]
    async fn test_page_token_cycle_stops_paging() {
        let api = FakeApi::new(Box::new(|_, token| {
            let next = match token {
                None | Some("b") => "a",
                Some(_) => "b",
            };
            Ok(RecordingsPage {
                meetings: Some(vec![meeting("m")]),
                next_page_token: Some(next.to_string()),
            })
        }));
        let session = ZoomSession::new("tok");

        let recordings =
            list_recordings(&api, &session, "u", (day(2024, 1, 1), day(2024, 1, 5)), &no_delay())
                .await;

        let tokens: Vec<_> = api.calls().into_iter().map(|c| c.2).collect();
        assert_eq!(tokens, vec![None, Some("a".to_string()), Some("b".to_string())]);
        assert_eq!(recordings.len(), 3);
    }

    #[test]
    fn test_page_parses_api_payload() {
        let page: RecordingsPage = serde_json::from_str(
            r#"{
                "from": "2024-01-01",
                "to": "2024-01-30",
                "page_size": 300,
                "next_page_token": "",
                "meetings": [{
                    "uuid": "abc==",
                    "topic": "Sync",
                    "start_time": "2024-01-02T15:00:00Z",
                    "recording_files": [{"id": "f1", "file_type": "MP4", "download_url": "https://x"}]
                }]
            }"#,
        )
        .unwrap();
        let meetings = page.meetings.unwrap();
        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].recording_files.len(), 1);
    }
}

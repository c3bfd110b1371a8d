use std::fmt;
use std::time::{Duration, Instant};

use colored::*;
use serde::Deserialize;

use super::config::GRAPH_SCOPE;
use super::GraphClient;
use crate::error::{BackupError, Result};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Added to the poll interval on every `slow_down`
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// A delegated Graph token obtained for one run
#[derive(Clone)]
pub struct GraphSession {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

impl GraphSession {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in: None,
        }
    }

    /// Placeholder for dry runs, which never reach the target
    pub fn unauthenticated() -> Self {
        Self::new(String::new())
    }
}

impl fmt::Debug for GraphSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphSession")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    #[serde(default = "default_interval")]
    interval: u64,
    #[serde(default)]
    message: Option<String>,
}

fn default_expires_in() -> u64 {
    900
}

fn default_interval() -> u64 {
    5
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug)]
enum PollOutcome {
    Token(GraphSession),
    Pending,
    SlowDown,
    Failed(BackupError),
}

fn classify_token_response(response: TokenResponse) -> PollOutcome {
    if let Some(token) = response.access_token.filter(|t| !t.is_empty()) {
        return PollOutcome::Token(GraphSession {
            access_token: token,
            expires_in: response.expires_in,
        });
    }

    let description = response.error_description.unwrap_or_default();
    match response.error.as_deref() {
        Some("authorization_pending") => PollOutcome::Pending,
        Some("slow_down") => PollOutcome::SlowDown,
        Some("expired_token") => PollOutcome::Failed(BackupError::Auth(
            "Device code expired before sign-in completed".to_string(),
        )),
        Some(other) => {
            PollOutcome::Failed(BackupError::Auth(format!("{}: {}", other, description)))
        }
        None => PollOutcome::Failed(BackupError::Auth(
            "Token response has neither access_token nor error".to_string(),
        )),
    }
}

impl GraphClient {
    /// Interactive device-code sign-in. Prints the verification URL and code,
    /// then polls until the user finishes or the code expires.
    pub async fn authenticate(&self, tenant_id: &str, client_id: &str) -> Result<GraphSession> {
        let base = format!(
            "{}/{}/oauth2/v2.0",
            self.login_base_url,
            urlencoding::encode(tenant_id)
        );

        let response = self
            .api
            .post(format!("{}/devicecode", base))
            .form(&[("client_id", client_id), ("scope", GRAPH_SCOPE)])
            .send()
            .await
            .map_err(|e| BackupError::Auth(format!("Device code request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackupError::Auth(format!(
                "Device code request failed with status {}: {}",
                status, error_text
            )));
        }

        let device: DeviceCodeResponse = response
            .json()
            .await
            .map_err(|e| BackupError::Auth(format!("Failed to parse device code response: {}", e)))?;

        println!("\n{}", "Microsoft sign-in required".bold());
        match &device.message {
            Some(message) => println!("  {}", message),
            None => println!(
                "  Open {} and enter the code {}",
                device.verification_uri.cyan(),
                device.user_code.yellow().bold()
            ),
        }
        println!();

        let deadline = Instant::now() + Duration::from_secs(device.expires_in);
        let mut interval = Duration::from_secs(device.interval.max(1));
        let token_url = format!("{}/token", base);

        loop {
            tokio::time::sleep(interval).await;

            if Instant::now() >= deadline {
                return Err(BackupError::Auth(
                    "Device code expired before sign-in completed".to_string(),
                ));
            }

            let token: TokenResponse = self
                .api
                .post(&token_url)
                .form(&[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", client_id),
                    ("device_code", device.device_code.as_str()),
                ])
                .send()
                .await
                .map_err(|e| BackupError::Auth(format!("Token request failed: {}", e)))?
                .json()
                .await
                .map_err(|e| BackupError::Auth(format!("Failed to parse token response: {}", e)))?;

            match classify_token_response(token) {
                PollOutcome::Token(session) => {
                    tracing::info!(expires_in = ?session.expires_in, "Authenticated with Microsoft Graph");
                    return Ok(session);
                }
                PollOutcome::Pending => {
                    tracing::debug!("Waiting for device sign-in");
                }
                PollOutcome::SlowDown => {
                    interval += SLOW_DOWN_STEP;
                    tracing::debug!(interval_secs = interval.as_secs(), "Token endpoint asked to slow down");
                }
                PollOutcome::Failed(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_response(error: &str) -> TokenResponse {
        TokenResponse {
            error: Some(error.to_string()),
            error_description: Some("details".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_is_returned() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"token_type": "Bearer", "access_token": "abc", "expires_in": 3600}"#,
        )
        .unwrap();
        match classify_token_response(response) {
            PollOutcome::Token(session) => {
                assert_eq!(session.access_token, "abc");
                assert_eq!(session.expires_in, Some(3600));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_pending_and_slow_down() {
        assert!(matches!(
            classify_token_response(error_response("authorization_pending")),
            PollOutcome::Pending
        ));
        assert!(matches!(
            classify_token_response(error_response("slow_down")),
            PollOutcome::SlowDown
        ));
    }

    #[test]
    fn test_expired_and_declined_are_auth_errors() {
        for error in ["expired_token", "authorization_declined", "bad_verification_code"] {
            match classify_token_response(error_response(error)) {
                PollOutcome::Failed(BackupError::Auth(_)) => {}
                other => panic!("unexpected outcome for {}: {:?}", error, other),
            }
        }
    }

    #[test]
    fn test_device_code_defaults() {
        let device: DeviceCodeResponse = serde_json::from_str(
            r#"{"device_code": "d", "user_code": "ABCD-EFGH", "verification_uri": "https://microsoft.com/devicelogin"}"#,
        )
        .unwrap();
        assert_eq!(device.interval, 5);
        assert_eq!(device.expires_in, 900);
    }
}

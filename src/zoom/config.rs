use serde::Deserialize;

/// OAuth token endpoint for server-to-server apps
pub const DEFAULT_OAUTH_URL: &str = "https://zoom.us/oauth/token";

/// REST API base
pub const DEFAULT_API_BASE_URL: &str = "https://api.zoom.us/v2";

/// Largest page the recordings endpoint accepts
pub const DEFAULT_PAGE_SIZE: u32 = 300;

/// Longest range the recordings endpoint accepts per call
pub const MAX_WINDOW_DAYS: i64 = 30;

/// Account credentials of a Server-to-Server OAuth app (`Zoom` section)
#[derive(Debug, Clone, Deserialize)]
pub struct ZoomCredentials {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_oauth_url() -> String {
    DEFAULT_OAUTH_URL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let creds: ZoomCredentials = serde_json::from_str(
            r#"{"account_id": "a", "client_id": "b", "client_secret": "c"}"#,
        )
        .unwrap();
        assert_eq!(creds.oauth_url, "https://zoom.us/oauth/token");
        assert_eq!(creds.api_base_url, "https://api.zoom.us/v2");
    }
}

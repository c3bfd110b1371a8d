use serde::Deserialize;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";

/// Delegated scope requested by the device-code flow
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default offline_access";

/// Upload session chunk size (a multiple of 320 KiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Target drive settings (`Sharepoint` section)
#[derive(Debug, Clone, Deserialize)]
pub struct SharepointConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub site_url: String,
    /// Top-level folder under the drive root
    pub remote_folder_name: String,
    pub drive_id: String,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
    #[serde(default = "default_login_base_url")]
    pub login_base_url: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_graph_base_url() -> String {
    DEFAULT_GRAPH_BASE_URL.to_string()
}

fn default_login_base_url() -> String {
    DEFAULT_LOGIN_BASE_URL.to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

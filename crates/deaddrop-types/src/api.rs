use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Upload --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub expires_at: DateTime<Utc>,
    /// Shown once to the uploader; required for early deletion.
    pub delete_token: String,
}

// -- Download --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    /// Time-boxed capability URL for the ciphertext blob.
    pub url: String,
    pub name: String,
    pub expires_at: DateTime<Utc>,
}

// -- Delete / cleanup --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub message: String,
    pub deleted: usize,
}

// -- Webhooks --

/// Body POSTed to a drop's webhook after a successful download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event: String,
    pub drop_id: String,
    pub download_count: u32,
    pub downloads_remaining: Option<u32>,
    pub exhausted: bool,
    pub at: DateTime<Utc>,
}

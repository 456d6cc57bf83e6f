use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix appended to `storage_path` for the companion preview blob.
pub const PREVIEW_SUFFIX: &str = "-preview";

/// Server-side metadata for one shared artifact.
///
/// The server only holds ciphertext. The decryption key lives in the link
/// fragment and, for password drops, in the recipient's head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropRecord {
    pub id: String,
    pub delete_token: String,
    pub storage_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub declared_size: u64,
    /// 0 means unlimited.
    pub download_limit: u32,
    pub download_count: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_password_protected: bool,
    pub password_salt: Option<String>,
    pub has_preview: bool,
    pub webhook_url: Option<String>,
}

/// Logical lifecycle state, always computed from the record and the clock.
///
/// `Purged` has no variant: a purged drop simply has no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropState {
    Active,
    Exhausted,
    Expired,
}

impl DropRecord {
    /// Classify the record at `now`. Expiry wins over exhaustion.
    pub fn state_at(&self, now: DateTime<Utc>) -> DropState {
        if self.expires_at < now {
            DropState::Expired
        } else if self.is_exhausted() {
            DropState::Exhausted
        } else {
            DropState::Active
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.download_limit > 0 && self.download_count >= self.download_limit
    }

    /// `None` when the drop has no download limit.
    pub fn downloads_remaining(&self) -> Option<u32> {
        (self.download_limit > 0)
            .then(|| self.download_limit.saturating_sub(self.download_count))
    }

    pub fn preview_path(&self) -> String {
        format!("{}{}", self.storage_path, PREVIEW_SUFFIX)
    }

    /// Every blob key owned by this record.
    pub fn blob_keys(&self) -> Vec<String> {
        let mut keys = vec![self.storage_path.clone()];
        if self.has_preview {
            keys.push(self.preview_path());
        }
        keys
    }

    pub fn view(&self) -> DropRecordView {
        DropRecordView {
            id: self.id.clone(),
            name: self.original_name.clone(),
            size: self.declared_size,
            mime_type: self.mime_type.clone(),
            expires_at: self.expires_at,
            downloads_remaining: self.downloads_remaining(),
            is_password_protected: self.is_password_protected,
            password_salt: self.password_salt.clone(),
            has_preview: self.has_preview,
        }
    }
}

/// Public projection of a record. No delete token, storage path, or
/// webhook target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRecordView {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub expires_at: DateTime<Utc>,
    pub downloads_remaining: Option<u32>,
    pub is_password_protected: bool,
    pub password_salt: Option<String>,
    pub has_preview: bool,
}

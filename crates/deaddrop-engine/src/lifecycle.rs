use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use deaddrop_crypto::Salt;
use deaddrop_db::RecordStore;
use deaddrop_types::models::PREVIEW_SUFFIX;
use deaddrop_types::{DropRecord, DropRecordView, DropState};

use crate::error::DropError;
use crate::storage::{BlobStore, SignedAccess};
use crate::webhook::{self, WebhookNotice};

/// 50 MB ceiling on the uploaded ciphertext.
pub const MAX_BLOB_SIZE: usize = 50 * 1024 * 1024;

const STORAGE_PREFIX: &str = "drops/";
const DEFAULT_NAME: &str = "untitled";
const DEFAULT_MIME: &str = "application/octet-stream";
const DEFAULT_DOWNLOAD_LIMIT: u32 = 1;

/// Bound on compare-and-swap retries when other downloads keep winning.
const MAX_CLAIM_ATTEMPTS: usize = 16;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lifetime of a drop from upload time.
    pub retention: TimeDelta,
    /// Lifetime of a signed download grant.
    pub access_ttl: Duration,
    /// Delay between the budget-exhausting download and the purge, so the
    /// in-flight transfer is not cut off. Access is denied immediately
    /// regardless.
    pub purge_grace: Duration,
    pub max_blob_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retention: TimeDelta::hours(24),
            access_ttl: Duration::from_secs(300),
            purge_grace: Duration::from_secs(60),
            max_blob_size: MAX_BLOB_SIZE,
        }
    }
}

/// An upload as received from the uploader. Descriptive fields are
/// optional and untrusted.
#[derive(Debug, Clone, Default)]
pub struct NewDrop {
    pub blob: Bytes,
    pub preview: Option<Bytes>,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    pub declared_size: Option<u64>,
    pub download_limit: Option<u32>,
    pub is_password_protected: bool,
    pub password_salt: Option<String>,
    pub webhook_url: Option<String>,
}

/// Result of a successful budget claim.
#[derive(Debug, Clone)]
pub struct DownloadGrant {
    /// The record as it stands after this claim.
    pub record: DropRecord,
    pub access: SignedAccess,
    pub notice: Option<WebhookNotice>,
}

/// Owns every state transition of a drop:
/// ACTIVE -> EXHAUSTED | EXPIRED (computed on read) -> PURGED (physical).
#[derive(Clone)]
pub struct LifecycleEngine {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    config: EngineConfig,
}

impl LifecycleEngine {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: EngineConfig,
    ) -> Self {
        Self { records, blobs, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Store the blob (and best-effort preview), then insert the record.
    ///
    /// If the main write or the insert fails, whatever was written is removed
    /// again, so no blob is ever left without a record.
    pub async fn create(&self, upload: NewDrop) -> Result<DropRecord, DropError> {
        if upload.blob.is_empty() {
            return Err(DropError::InvalidRequest("no file provided".into()));
        }
        if upload.blob.len() > self.config.max_blob_size {
            return Err(DropError::PayloadTooLarge {
                size: upload.blob.len(),
                limit: self.config.max_blob_size,
            });
        }
        let password_salt = checked_salt(upload.is_password_protected, upload.password_salt)?;

        let id = Uuid::new_v4().to_string();
        let storage_path = format!("{}{}", STORAGE_PREFIX, id);
        let preview_path = format!("{}{}", storage_path, PREVIEW_SUFFIX);
        let mime_type = non_blank(upload.mime_type).unwrap_or_else(|| DEFAULT_MIME.to_string());
        let declared_size = upload.declared_size.unwrap_or(upload.blob.len() as u64);

        // Stored timestamps have millisecond precision.
        let now = Utc::now().trunc_subsecs(3);
        let expires_at = now.checked_add_signed(self.config.retention).ok_or_else(|| {
            DropError::InvalidRequest("retention window is out of range".into())
        })?;

        if let Err(e) = self.blobs.put(&storage_path, upload.blob, &mime_type).await {
            // A failed write may still leave a partial file behind.
            if let Err(cleanup) = self.blobs.remove(&[storage_path.clone()]).await {
                warn!("Cleanup of partial blob for {} failed: {:#}", id, cleanup);
            }
            return Err(DropError::Storage(e));
        }

        let mut written = vec![storage_path.clone()];
        let mut has_preview = false;
        if let Some(preview) = upload.preview.filter(|p| !p.is_empty()) {
            written.push(preview_path.clone());
            match self.blobs.put(&preview_path, preview, DEFAULT_MIME).await {
                Ok(()) => has_preview = true,
                Err(e) => warn!("Preview upload failed for {}, continuing without: {:#}", id, e),
            }
        }

        let record = DropRecord {
            id: id.clone(),
            delete_token: Uuid::new_v4().to_string(),
            storage_path,
            original_name: non_blank(upload.original_name)
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
            mime_type,
            declared_size,
            download_limit: upload.download_limit.unwrap_or(DEFAULT_DOWNLOAD_LIMIT),
            download_count: 0,
            created_at: now,
            expires_at,
            is_password_protected: password_salt.is_some(),
            password_salt,
            has_preview,
            webhook_url: webhook::sanitize_url(upload.webhook_url),
        };

        if let Err(e) = self.records.insert(&record) {
            warn!("Record insert failed for {}, rolling back blobs: {:#}", id, e);
            if let Err(rollback) = self.blobs.remove(&written).await {
                warn!("Rollback of blobs for {} failed: {:#}", id, rollback);
            }
            return Err(DropError::RecordStore(e));
        }

        info!(
            "Drop {} created: {} bytes, limit {}, expires {}",
            record.id, record.declared_size, record.download_limit, record.expires_at
        );
        Ok(record)
    }

    /// Spend one unit of download budget and hand out a time-boxed grant.
    ///
    /// The claim is a compare-and-swap on `download_count` in the record
    /// store; a caller that loses the race re-reads and re-classifies.
    pub async fn fetch_for_download(&self, id: &str) -> Result<DownloadGrant, DropError> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let record = self.load(id)?;
            let now = Utc::now();

            let state = record.state_at(now);
            if state != DropState::Active {
                debug!("Drop {} is {:?}, purging", id, state);
                if let Err(e) = self.purge_record(&record).await {
                    warn!("Purge of dead drop {} failed: {}", id, e);
                }
                return Err(DropError::Gone);
            }

            let claimed = self
                .records
                .compare_and_increment(id, record.download_count)
                .map_err(DropError::RecordStore)?;
            if !claimed {
                debug!("Drop {}: lost download claim race, retrying", id);
                continue;
            }

            let mut record = record;
            record.download_count += 1;

            if record.is_exhausted() {
                self.schedule_purge(record.id.clone());
            }

            let access = self
                .blobs
                .signed_access(&record.storage_path, self.config.access_ttl)
                .await
                .map_err(DropError::Storage)?;

            info!(
                "Drop {} downloaded ({}/{})",
                record.id, record.download_count, record.download_limit
            );
            let notice = webhook::download_notice(&record, now);
            return Ok(DownloadGrant { record, access, notice });
        }

        Err(DropError::RecordStore(anyhow!(
            "download claim for {} did not settle after {} attempts",
            id,
            MAX_CLAIM_ATTEMPTS
        )))
    }

    /// Read-only view. Same classification as downloads, no counter change
    /// and no purge.
    pub fn fetch_metadata(&self, id: &str) -> Result<DropRecordView, DropError> {
        let record = self.load_live(id, Utc::now())?;
        Ok(record.view())
    }

    /// Preview bytes for a live drop. Does not spend budget.
    pub async fn fetch_preview(&self, id: &str) -> Result<Bytes, DropError> {
        let record = self.load_live(id, Utc::now())?;
        if !record.has_preview {
            return Err(DropError::NotFound);
        }
        self.blobs
            .get(&record.preview_path())
            .await
            .map_err(DropError::Storage)
    }

    /// Purge on behalf of the uploader. A wrong token changes nothing.
    pub async fn delete_by_owner(&self, id: &str, token: &str) -> Result<(), DropError> {
        let record = self.load(id)?;
        if record.delete_token != token {
            return Err(DropError::Forbidden);
        }
        self.purge_record(&record).await?;
        info!("Drop {} deleted by owner", id);
        Ok(())
    }

    /// Purge every drop that is expired at `now` or out of budget.
    /// Returns how many this call actually removed.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, DropError> {
        let dead = self.records.scan_dead(now).map_err(DropError::RecordStore)?;

        let mut purged = 0;
        for record in &dead {
            match self.purge_record(record).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(e) => warn!("Sweep could not purge {}: {}", record.id, e),
            }
        }

        if purged > 0 {
            info!("Sweep: purged {} of {} dead drops", purged, dead.len());
        }
        Ok(purged)
    }

    /// Remove blobs and record. Purging an unknown id is a no-op.
    pub async fn purge(&self, id: &str) -> Result<bool, DropError> {
        match self.records.get(id).map_err(DropError::RecordStore)? {
            Some(record) => self.purge_record(&record).await,
            None => Ok(false),
        }
    }

    async fn purge_record(&self, record: &DropRecord) -> Result<bool, DropError> {
        // A stranded blob is cheaper than a record pointing at nothing, so
        // blob failures do not stop the record delete.
        if let Err(e) = self.blobs.remove(&record.blob_keys()).await {
            warn!("Blob removal for {} failed: {:#}", record.id, e);
        }
        let deleted = self.records.delete(&record.id).map_err(DropError::RecordStore)?;
        if deleted {
            info!("Purged drop {}", record.id);
        }
        Ok(deleted)
    }

    fn schedule_purge(&self, id: String) {
        let engine = self.clone();
        let grace = self.config.purge_grace;
        debug!("Drop {} exhausted, purging in {:?}", id, grace);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(e) = engine.purge(&id).await {
                warn!("Delayed purge of {} failed: {}", id, e);
            }
        });
    }

    fn load(&self, id: &str) -> Result<DropRecord, DropError> {
        self.records
            .get(id)
            .map_err(DropError::RecordStore)?
            .ok_or(DropError::NotFound)
    }

    fn load_live(&self, id: &str, now: DateTime<Utc>) -> Result<DropRecord, DropError> {
        let record = self.load(id)?;
        match record.state_at(now) {
            DropState::Active => Ok(record),
            DropState::Exhausted | DropState::Expired => Err(DropError::Gone),
        }
    }
}

fn checked_salt(protected: bool, salt: Option<String>) -> Result<Option<String>, DropError> {
    if !protected {
        return Ok(None);
    }
    let salt = non_blank(salt).ok_or_else(|| {
        DropError::InvalidRequest("password-protected drop is missing its salt".into())
    })?;
    Salt::from_base64(&salt)
        .map_err(|_| DropError::InvalidRequest("malformed password salt".into()))?;
    Ok(Some(salt))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

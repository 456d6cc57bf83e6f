use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::fs;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Time-boxed capability for fetching one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAccess {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Opaque blob store holding ciphertext. Keys are `drops/<id>` and
/// `drops/<id>-preview`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Issue a grant valid for `ttl`. The permanent path is never exposed.
    async fn signed_access(&self, key: &str, ttl: Duration) -> Result<SignedAccess>;

    /// Remove every key. Missing keys are not an error.
    async fn remove(&self, keys: &[String]) -> Result<()>;
}

/// Manages on-disk blob storage.
///
/// Each blob is a flat file at `{storage_dir}/{key}`. Access grants are
/// URLs signed with HMAC-SHA256 over the key and expiry, served back by the
/// `/blobs` route.
pub struct DiskStorage {
    dir: PathBuf,
    signing_key: Vec<u8>,
    public_url: String,
}

impl DiskStorage {
    pub async fn new(dir: PathBuf, signing_secret: &str, public_url: &str) -> Result<Self> {
        if signing_secret.is_empty() {
            bail!("Blob signing secret must not be empty");
        }
        fs::create_dir_all(&dir).await?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self {
            dir,
            signing_key: signing_secret.as_bytes().to_vec(),
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Path to the file for a given key. Rejects anything that could
    /// escape the storage directory.
    pub fn blob_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }

    /// Open a blob for streaming.
    pub async fn open_blob(&self, key: &str) -> Result<fs::File> {
        let path = self.blob_path(key)?;
        Ok(fs::File::open(&path).await?)
    }

    /// Check a grant presented back to the `/blobs` route.
    pub fn verify_access(&self, key: &str, expires: i64, sig: &str, now: DateTime<Utc>) -> bool {
        if validate_key(key).is_err() || expires < now.timestamp() {
            return false;
        }
        let Ok(sig) = hex::decode(sig) else {
            return false;
        };
        match self.mac(key, expires) {
            Ok(mac) => mac.verify_slice(&sig).is_ok(),
            Err(_) => false,
        }
    }

    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| anyhow!("Invalid signing key: {}", e))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }
}

#[async_trait]
impl BlobStore for DiskStorage {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &bytes).await?;
        debug!("Stored blob {} ({} bytes, {})", key, bytes.len(), content_type);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.blob_path(key)?;
        Ok(Bytes::from(fs::read(&path).await?))
    }

    async fn signed_access(&self, key: &str, ttl: Duration) -> Result<SignedAccess> {
        validate_key(key)?;
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| anyhow!("Access TTL {:?} is out of range", ttl))?;
        let expires = expires_at.timestamp();
        let sig = hex::encode(self.mac(key, expires)?.finalize().into_bytes());
        Ok(SignedAccess {
            url: format!("{}/blobs/{}?expires={}&sig={}", self.public_url, key, expires, sig),
            expires_at,
        })
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let mut first_err = None;
        for key in keys {
            let path = match self.blob_path(key) {
                Ok(path) => path,
                Err(e) => {
                    first_err.get_or_insert(e);
                    continue;
                }
            };
            match fs::remove_file(&path).await {
                Ok(()) => info!("Deleted blob {}", key),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Blob {} already gone", key);
                }
                Err(e) => {
                    warn!("Failed to delete blob {}: {}", key, e);
                    first_err.get_or_insert(e.into());
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });
    if !valid {
        bail!("Invalid blob key: {:?}", key);
    }
    Ok(())
}

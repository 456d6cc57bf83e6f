use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;

use deaddrop_engine::EngineConfig;

/// Upper bounds that keep timestamp arithmetic in range.
const MAX_RETENTION_HOURS: i64 = 24 * 366;
const MAX_ACCESS_TTL_SECS: u64 = 24 * 3600;

/// Placeholder signing secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    /// Base of the signed blob URLs handed to downloaders.
    pub public_url: String,
    pub signing_secret: String,
    /// `None` disables the cron cleanup endpoint.
    pub cron_secret: Option<String>,
    pub retention_hours: i64,
    pub cleanup_interval_secs: u64,
    pub purge_grace_secs: u64,
    pub access_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signing_secret = get("DEADDROP_SIGNING_SECRET").unwrap_or_default();
        if signing_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&signing_secret.as_str()) {
            bail!(
                "DEADDROP_SIGNING_SECRET is unset or still a placeholder; \
                 set it in your .env file and restart"
            );
        }

        let retention_hours: i64 = parse_or(&get, "DEADDROP_RETENTION_HOURS", 24)?;
        if !(1..=MAX_RETENTION_HOURS).contains(&retention_hours) {
            bail!(
                "DEADDROP_RETENTION_HOURS must be between 1 and {}, got {}",
                MAX_RETENTION_HOURS,
                retention_hours
            );
        }

        let access_ttl_secs: u64 = parse_or(&get, "DEADDROP_ACCESS_TTL_SECS", 300)?;
        if !(1..=MAX_ACCESS_TTL_SECS).contains(&access_ttl_secs) {
            bail!(
                "DEADDROP_ACCESS_TTL_SECS must be between 1 and {}, got {}",
                MAX_ACCESS_TTL_SECS,
                access_ttl_secs
            );
        }

        Ok(Self {
            host: get("DEADDROP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "DEADDROP_PORT", 3000)?,
            db_path: get("DEADDROP_DB_PATH")
                .unwrap_or_else(|| "deaddrop.db".into())
                .into(),
            storage_dir: get("DEADDROP_STORAGE_DIR")
                .unwrap_or_else(|| "./drop-storage".into())
                .into(),
            public_url: get("DEADDROP_PUBLIC_URL")
                .unwrap_or_else(|| "http://localhost:3000".into()),
            signing_secret,
            cron_secret: get("DEADDROP_CRON_SECRET").filter(|s| !s.is_empty()),
            retention_hours,
            cleanup_interval_secs: parse_or(&get, "DEADDROP_CLEANUP_INTERVAL_SECS", 3600)?,
            purge_grace_secs: parse_or(&get, "DEADDROP_PURGE_GRACE_SECS", 60)?,
            access_ttl_secs,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            retention: TimeDelta::hours(self.retention_hours),
            access_ttl: Duration::from_secs(self.access_ttl_secs),
            purge_grace: Duration::from_secs(self.purge_grace_secs),
            ..EngineConfig::default()
        }
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}

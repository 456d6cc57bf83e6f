use chrono::{DateTime, Utc};

use deaddrop_types::DropRecord;
use deaddrop_types::api::WebhookPayload;

pub const DOWNLOAD_EVENT: &str = "drop.downloaded";

/// A notification the transport layer should deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookNotice {
    pub url: String,
    pub payload: WebhookPayload,
}

/// Keep a webhook target only if it is an http(s) URL.
pub fn sanitize_url(url: Option<String>) -> Option<String> {
    url.map(|u| u.trim().to_string())
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
}

/// Decide whether a successful download should notify the uploader.
///
/// `record` is the state after the budget claim. The original file name is
/// deliberately left out of the payload.
pub fn download_notice(record: &DropRecord, at: DateTime<Utc>) -> Option<WebhookNotice> {
    let url = record.webhook_url.clone()?;
    Some(WebhookNotice {
        url,
        payload: WebhookPayload {
            event: DOWNLOAD_EVENT.to_string(),
            drop_id: record.id.clone(),
            download_count: record.download_count,
            downloads_remaining: record.downloads_remaining(),
            exhausted: record.is_exhausted(),
            at,
        },
    })
}

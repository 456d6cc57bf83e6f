use std::time::Duration;

use tracing::{debug, warn};

use deaddrop_engine::WebhookNotice;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fire-and-forget delivery. The download response never waits on it.
pub fn deliver(client: reqwest::Client, notice: WebhookNotice) {
    tokio::spawn(async move {
        let result = client
            .post(&notice.url)
            .timeout(DELIVERY_TIMEOUT)
            .json(&notice.payload)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        match result {
            Ok(_) => debug!("Webhook delivered for drop {}", notice.payload.drop_id),
            Err(e) => warn!("Webhook for drop {} failed: {}", notice.payload.drop_id, e),
        }
    });
}

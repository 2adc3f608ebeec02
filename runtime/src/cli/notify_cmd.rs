//! `sentinel test-notify`: push a synthetic listing through the webhook.

use crate::cli::output;
use crate::config::SentinelConfig;
use crate::notifier::{sample_listing, Notifier, WebhookNotifier};
use anyhow::{bail, Context, Result};
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = SentinelConfig::load(config_path)?;
    let url = config
        .webhook_url
        .as_deref()
        .context("no webhook configured; set webhook_url or SENTINEL_WEBHOOK_URL")?;

    let listing = sample_listing();
    let delivered = WebhookNotifier::new(url, config.notify_timeout_ms)?
        .send(&listing)
        .await;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "delivered": delivered,
            "product_id": listing.product_id,
        }));
    } else if delivered && !output::is_quiet() {
        eprintln!("  Test notification delivered ({})", listing.product_id);
    }

    if !delivered {
        bail!("webhook did not accept the test notification");
    }
    Ok(())
}

//! Outbound notification channel.

use crate::listing::Listing;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Embed accent colour.
const EMBED_COLOR: u32 = 0xF9_73_16;
/// Discord rejects embed titles longer than this.
const MAX_TITLE_CHARS: usize = 256;

/// Fire-and-forget delivery of one listing. `false` means it was not delivered.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, listing: &Listing) -> bool;
}

/// Posts a Discord-style embed to a webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("failed to build webhook client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

fn field(name: &str, value: &str) -> Value {
    json!({"name": name, "value": value, "inline": true})
}

/// Webhook body for one listing. Absent fields are left out.
pub fn embed_payload(listing: &Listing) -> Value {
    let mut fields = Vec::new();
    if let Some(price) = &listing.price {
        fields.push(field("Price", price));
    }
    if let Some(condition) = &listing.condition {
        fields.push(field("Condition", condition));
    }
    if let Some(size) = &listing.size {
        fields.push(field("Size", size));
    }
    match (&listing.seller_name, &listing.seller_url) {
        (Some(name), Some(url)) => fields.push(field("Seller", &format!("[{name}]({url})"))),
        (Some(name), None) => fields.push(field("Seller", name)),
        _ => {}
    }
    if let Some(posted) = &listing.time_posted {
        fields.push(field("Posted", posted));
    }
    fields.push(field("Likes", &listing.likes));

    let mut embed = json!({
        "title": listing.display_title().chars().take(MAX_TITLE_CHARS).collect::<String>(),
        "color": EMBED_COLOR,
        "fields": fields,
        "footer": {"text": format!("Listing {}", listing.product_id)},
    });
    if let Some(link) = &listing.link {
        embed["url"] = json!(link);
    }
    if let Some(img) = &listing.img {
        embed["thumbnail"] = json!({"url": img});
    }

    json!({"username": "Listing Sentinel", "embeds": [embed]})
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, listing: &Listing) -> bool {
        let body = embed_payload(listing);
        match self.client.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                warn!("webhook rejected {}: {status} {text}", listing.product_id);
                false
            }
            Err(e) => {
                warn!("webhook request for {} failed: {e}", listing.product_id);
                false
            }
        }
    }
}

/// Writes new listings to the log instead of a remote channel.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, listing: &Listing) -> bool {
        info!(
            product_id = %listing.product_id,
            price = listing.price.as_deref().unwrap_or("-"),
            link = listing.link.as_deref().unwrap_or("-"),
            "new listing: {}",
            listing.display_title()
        );
        true
    }
}

/// The synthetic record sent by `sentinel test-notify`.
pub fn sample_listing() -> Listing {
    let mut listing = Listing::new(format!("test_{}", chrono::Utc::now().timestamp()));
    listing.title = Some("Nike Air Force 1 Low - TEST LISTING".to_string());
    listing.price = Some("RM 120".to_string());
    listing.link = Some("https://www.carousell.com.my/p/test-nike-shoes-12345".to_string());
    listing.img = Some("https://via.placeholder.com/300x300?text=Nike+Test".to_string());
    listing.seller_name = Some("Test Seller".to_string());
    listing.time_posted = Some("Just now".to_string());
    listing.condition = Some("Brand new".to_string());
    listing.size = Some("US 9".to_string());
    listing
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::{assert_json_eq, assert_json_include};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn listing() -> Listing {
        let mut l = Listing::new("1234567890");
        l.title = Some("Nike Air Max 90".to_string());
        l.price = Some("RM 320".to_string());
        l.link = Some("https://www.carousell.com.my/p/nike-air-max-90-1234567890/".to_string());
        l.img = Some("https://cdn/p/1.jpg".to_string());
        l.seller_name = Some("sneakerhead".to_string());
        l.seller_url = Some("https://www.carousell.com.my/u/sneakerhead/".to_string());
        l.likes = "12".to_string();
        l
    }

    #[test]
    fn test_embed_payload_full_record() {
        assert_json_eq!(
            embed_payload(&listing()),
            json!({
                "username": "Listing Sentinel",
                "embeds": [{
                    "title": "Nike Air Max 90",
                    "url": "https://www.carousell.com.my/p/nike-air-max-90-1234567890/",
                    "color": EMBED_COLOR,
                    "thumbnail": {"url": "https://cdn/p/1.jpg"},
                    "footer": {"text": "Listing 1234567890"},
                    "fields": [
                        {"name": "Price", "value": "RM 320", "inline": true},
                        {"name": "Seller", "value": "[sneakerhead](https://www.carousell.com.my/u/sneakerhead/)", "inline": true},
                        {"name": "Likes", "value": "12", "inline": true}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_embed_payload_bare_record() {
        let payload = embed_payload(&Listing::new("9"));
        assert_json_include!(
            actual: payload.clone(),
            expected: json!({"embeds": [{"title": "(untitled)", "fields": [{"name": "Likes", "value": "0"}]}]})
        );
        assert!(payload["embeds"][0].get("url").is_none());
    }

    #[tokio::test]
    async fn test_webhook_success_and_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"embeds": [{"title": "Nike Air Max 90"}]})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), 2_000).unwrap();
        assert!(notifier.send(&listing()).await);

        let mut other = listing();
        other.title = Some("Something else".to_string());
        assert!(!notifier.send(&other).await);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_false() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook", 500).unwrap();
        assert!(!notifier.send(&sample_listing()).await);
    }
}

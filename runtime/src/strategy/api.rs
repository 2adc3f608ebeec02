//! Structured-data prober.
//!
//! Tries every candidate endpoint with GET then POST. A 200 body is read as
//! JSON, or failing that as markup with embedded JSON in script tags.

use super::{AcquisitionStrategy, Stage, StrategyContext};
use crate::config::SentinelConfig;
use crate::error::StrategyResult;
use crate::extraction::json::{extract_payload, JsonContext};
use crate::http_client::{HttpClient, Method};
use crate::listing::Listing;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use url::Url;

static JSON_SCRIPT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/json"]"#).expect("script selector is valid")
});
static ANY_SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script").expect("script selector is valid"));
static EMBEDDED_LISTINGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\{.*"listings".*\})"#).expect("embedded JSON regex is valid"));

pub struct ApiProber {
    client: HttpClient,
    endpoints: Vec<String>,
    params: Value,
    base: Option<Url>,
    base_url: String,
    currency: String,
    keyword: String,
}

impl ApiProber {
    pub fn from_config(config: &SentinelConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(&config.api)?,
            endpoints: config.api.endpoints.clone(),
            params: config.api.params.clone(),
            base: config.base(),
            base_url: config.base_url.clone(),
            currency: config.currency.clone(),
            keyword: config.keyword.clone(),
        })
    }

    fn json_context(&self) -> JsonContext<'_> {
        JsonContext {
            base: self.base.as_ref(),
            base_url: &self.base_url,
            currency: &self.currency,
            keyword: &self.keyword,
        }
    }

    async fn probe(&self, endpoint: &str, method: Method) -> Vec<Listing> {
        let response = match self.client.send(method, endpoint, &self.params).await {
            Ok(r) => r,
            Err(e) => {
                debug!("{method} {endpoint} failed: {e:#}");
                return Vec::new();
            }
        };
        info!("{method} {endpoint} - status {}", response.status);
        if response.status != 200 {
            return Vec::new();
        }
        parse_body(&response.body, &self.json_context())
    }
}

/// Records from a 200 body: JSON first, then script payloads in markup.
pub fn parse_body(body: &str, ctx: &JsonContext<'_>) -> Vec<Listing> {
    match serde_json::from_str::<Value>(body) {
        Ok(data) => {
            if let Some(keys) = data.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()) {
                debug!("JSON response with keys {keys:?}");
            }
            extract_payload(&data, ctx)
        }
        Err(_) => extract_from_markup(body, ctx),
    }
}

/// Look for a listing payload embedded in the page's scripts.
pub fn extract_from_markup(html: &str, ctx: &JsonContext<'_>) -> Vec<Listing> {
    let document = Html::parse_document(html);

    for script in document.select(&JSON_SCRIPT) {
        let text: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let listings = extract_payload(&data, ctx);
        if !listings.is_empty() {
            return listings;
        }
    }

    for script in document.select(&ANY_SCRIPT) {
        let text: String = script.text().collect();
        if !text.contains("listings") && !text.contains("products") {
            continue;
        }
        let Some(raw) = EMBEDDED_LISTINGS.captures(&text).and_then(|c| c.get(1)) else {
            continue;
        };
        let Ok(data) = serde_json::from_str::<Value>(raw.as_str()) else {
            continue;
        };
        let listings = extract_payload(&data, ctx);
        if !listings.is_empty() {
            return listings;
        }
    }

    Vec::new()
}

#[async_trait]
impl AcquisitionStrategy for ApiProber {
    fn stage(&self) -> Stage {
        Stage::Api
    }

    async fn acquire(&self, _ctx: &mut StrategyContext) -> StrategyResult<Vec<Listing>> {
        info!("probing {} structured-data endpoints", self.endpoints.len());
        for endpoint in &self.endpoints {
            for method in [Method::Get, Method::Post] {
                let listings = self.probe(endpoint, method).await;
                if !listings.is_empty() {
                    info!("{} listings from {method} {endpoint}", listings.len());
                    return Ok(listings);
                }
            }
        }
        warn!("all structured-data endpoints failed");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> JsonContext<'static> {
        JsonContext {
            base: None,
            base_url: "https://www.carousell.com.my",
            currency: "RM",
            keyword: "nike",
        }
    }

    fn prober(endpoints: Vec<String>) -> ApiProber {
        let mut config = SentinelConfig::default();
        config.api.endpoints = endpoints;
        config.api.timeout_ms = 2_000;
        ApiProber::from_config(&config).unwrap()
    }

    #[test]
    fn test_markup_json_script() {
        let html = r#"<html><script type="application/json">{"props": 1}</script>
            <script type="application/json">{"data": {"results": [{"id": "7", "title": "Nike Zoom"}]}}</script></html>"#;
        let out = extract_from_markup(html, &ctx());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].product_id, "7");
    }

    #[test]
    fn test_markup_inline_assignment() {
        let html = r#"<script>window.__DATA__ = {"listings": [{"id": 9, "title": "Nike SB"}]};</script>"#;
        let out = extract_from_markup(html, &ctx());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].link.as_deref(), Some("https://www.carousell.com.my/p/9"));
    }

    #[test]
    fn test_parse_body_prefers_json() {
        let out = parse_body(r#"{"items": [{"id": "1", "name": "nike tee"}]}"#, &ctx());
        assert_eq!(out.len(), 1);
        assert!(parse_body("<html>nothing</html>", &ctx()).is_empty());
    }

    #[tokio::test]
    async fn test_falls_through_endpoints_and_methods() {
        let server = MockServer::start().await;
        Mock::given(path("/first"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"listings": []})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/second"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"listings": [{"id": "123", "title": "Nike Air", "price": 150}]}),
            ))
            .mount(&server)
            .await;

        let prober = prober(vec![
            "http://127.0.0.1:1/unreachable".to_string(),
            format!("{}/first", server.uri()),
            format!("{}/second", server.uri()),
        ]);
        let out = prober.acquire(&mut StrategyContext::default()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].price.as_deref(), Some("RM 150"));
    }

    #[tokio::test]
    async fn test_all_endpoints_failing_is_empty_not_error() {
        let server = MockServer::start().await;
        Mock::given(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json, no scripts"))
            .expect(2)
            .mount(&server)
            .await;

        let prober = prober(vec![format!("{}/api", server.uri())]);
        let out = prober.acquire(&mut StrategyContext::default()).await.unwrap();
        assert!(out.is_empty());
    }
}

//! Async HTTP client wrapping reqwest.
//!
//! Sends requests with the mobile-app header set the marketplace API expects.
//! Retries on 5xx and backs off on 429, up to a configurable retry count.

use crate::config::ApiConfig;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Request method used against a candidate endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Parameters go into the query string.
    Get,
    /// Parameters go into a JSON body.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Status and body of one request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_retries: u32,
}

fn default_headers(config: &ApiConfig) -> HeaderMap {
    let pairs = [
        ("accept", "application/json, text/plain, */*"),
        ("accept-language", "en-US,en;q=0.9"),
        ("x-requested-with", "XMLHttpRequest"),
        ("sec-fetch-site", "same-origin"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-dest", "empty"),
        ("referer", config.referer.as_str()),
    ];
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    headers
}

/// Largest backoff exponent; caps the 5xx delay at 500ms * 2^6.
const MAX_BACKOFF_EXP: u32 = 6;

/// Delay before retry number `attempt` (1-based) after a 5xx or transport error.
fn backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(MAX_BACKOFF_EXP);
    Duration::from_millis(500 * 2u64.pow(exp))
}

/// Flatten a JSON object into query pairs. Non-scalar values are skipped.
pub fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Some(map) = params.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), value))
        })
        .collect()
}

impl HttpClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.as_str())
            .default_headers(default_headers(config))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
        })
    }

    /// Send `params` to `url` with retry on 5xx and backoff on 429.
    ///
    /// Non-success statuses are returned, not raised; only transport
    /// failures are errors.
    pub async fn send(&self, method: Method, url: &str, params: &Value) -> Result<HttpResponse> {
        let mut retries = 0u32;

        loop {
            let builder = match method {
                Method::Get => self.client.get(url).query(&query_pairs(params)),
                Method::Post => self.client.post(url).json(params),
            };

            match builder.send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if status >= 500 && retries < self.max_retries {
                        retries += 1;
                        tokio::time::sleep(backoff(retries)).await;
                        continue;
                    }

                    if status == 429 && retries < self.max_retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    let body = r.text().await.unwrap_or_default();
                    return Ok(HttpResponse { status, body });
                }
                Err(e) => {
                    if retries < self.max_retries {
                        retries += 1;
                        tokio::time::sleep(backoff(retries)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> ApiConfig {
        ApiConfig {
            timeout_ms: 2_000,
            ..ApiConfig::default()
        }
    }

    #[test]
    fn test_query_pairs_skips_nested() {
        let pairs = query_pairs(&json!({"q": "nike", "limit": 20, "nested": {"a": 1}}));
        assert!(pairs.contains(&("q".to_string(), "nike".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "20".to_string())));
        assert_eq!(pairs.len(), 2);
    }

    #[tokio::test]
    async fn test_get_sends_query_and_mobile_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "nike shoes"))
            .and(header("x-requested-with", "XMLHttpRequest"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = HttpClient::new(&config()).unwrap();
        let url = format!("{}/search", server.uri());
        let resp = client
            .send(Method::Get, &url, &json!({"query": "nike shoes"}))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "ok");
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"limit": 20})))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(&config()).unwrap();
        let resp = client
            .send(Method::Post, &server.uri(), &json!({"limit": 20}))
            .await
            .unwrap();
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn test_retries_5xx_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = HttpClient::new(&ApiConfig {
            max_retries: 1,
            ..config()
        })
        .unwrap();
        let resp = client.send(Method::Get, &server.uri(), &json!({})).await.unwrap();
        assert_eq!(resp.status, 200);
    }

    #[test]
    fn test_invalid_user_agent_is_an_error() {
        let result = HttpClient::new(&ApiConfig {
            user_agent: "Carousell/6.62\n(iPhone)".to_string(),
            ..config()
        });
        let err = result.err().expect("control character in user agent must fail");
        assert!(format!("{err:#}").contains("failed to build HTTP client"));
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(3), Duration::from_millis(2_000));
        assert_eq!(backoff(65), Duration::from_millis(32_000));
        assert_eq!(backoff(u32::MAX), Duration::from_millis(32_000));
    }
}

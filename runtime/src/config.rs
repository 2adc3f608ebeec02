//! Configuration loading and resolution.
//!
//! Resolution order for the config file:
//! 1. explicit `--config` path
//! 2. `SENTINEL_CONFIG` env
//! 3. `./sentinel.json`
//! 4. `~/.sentinel/config.json`
//!
//! A missing file means built-in defaults. Environment overrides
//! (`SENTINEL_WEBHOOK_URL`, `SENTINEL_DB`, `SENTINEL_CHROMIUM_PATH`) are
//! applied last.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Top-level configuration for one watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Marketplace origin; relative links resolve against it and synthesized
    /// links are `{base_url}/p/{product_id}`.
    pub base_url: String,
    /// Page visited first to establish a browsing session.
    pub landing_url: String,
    /// Search results page that is watched.
    pub search_url: String,
    /// Target product keyword. Structured-data records must mention it.
    pub keyword: String,
    /// Extra words that mark a heuristic-scan candidate as relevant.
    pub scan_keywords: Vec<String>,
    /// Currency marker prefixed to prices and used to spot price text.
    pub currency: String,
    pub api: ApiConfig,
    pub browser: BrowserSettings,
    pub strategies: StrategyToggles,
    /// Webhook that receives new listings.
    pub webhook_url: Option<String>,
    pub notify_timeout_ms: u64,
    /// SQLite listing store. Defaults to `~/.sentinel/listings.db`.
    pub store_path: Option<PathBuf>,
    /// JSONL run journal. Defaults to `~/.sentinel/runs.jsonl`.
    pub journal_path: Option<PathBuf>,
}

/// Structured-query probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub endpoints: Vec<String>,
    /// Sent as query parameters on GET and as the JSON body on POST.
    pub params: Value,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub user_agent: String,
    pub referer: String,
}

/// Rendered-page acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
    /// Tried in order when the challenge page never clears on `search_url`.
    pub alternative_urls: Vec<String>,
    /// Title fragments that mark an interstitial challenge page.
    pub challenge_markers: Vec<String>,
    pub container_selector: String,
    /// XPath of the "load more" control.
    pub load_more_xpath: String,
    pub timing: Timing,
}

/// Every bounded wait in the rendered-page flow, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub navigation_timeout_ms: u64,
    pub landing_pause_ms: u64,
    pub challenge_budget_ms: u64,
    pub poll_interval_ms: u64,
    pub alternative_settle_ms: u64,
    pub container_timeout_ms: u64,
    pub control_timeout_ms: u64,
    pub pre_click_pause_ms: u64,
    pub settle_ms: u64,
}

/// Individually switch acquisition strategies off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyToggles {
    pub api: bool,
    pub browser: bool,
    pub scanner: bool,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.carousell.com.my".to_string(),
            landing_url: "https://www.carousell.com.my/".to_string(),
            search_url: "https://www.carousell.com.my/search/nike%20shoes?sort_by=3".to_string(),
            keyword: "nike".to_string(),
            scan_keywords: vec!["nike".to_string(), "shoe".to_string()],
            currency: "RM".to_string(),
            api: ApiConfig::default(),
            browser: BrowserSettings::default(),
            strategies: StrategyToggles::default(),
            webhook_url: None,
            notify_timeout_ms: 10_000,
            store_path: None,
            journal_path: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://www.carousell.com.my/api-service/web/listings/search/".to_string(),
                "https://www.carousell.com.my/api/listings/search/".to_string(),
                "https://api.carousell.com.my/v1/search/".to_string(),
                "https://www.carousell.com.my/_next/data/search.json".to_string(),
            ],
            params: json!({
                "query": "nike shoes",
                "locale": "en-MY",
                "country_code": "MY",
                "limit": 20,
                "offset": 0,
                "sort_by": "recent"
            }),
            timeout_ms: 10_000,
            max_retries: 0,
            user_agent: "Carousell/6.62.0 (iPhone; iOS 17.1.1; Scale/3.00)".to_string(),
            referer: "https://www.carousell.com.my/".to_string(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            alternative_urls: vec![
                "https://carousell.com.my/search/nike%20shoes".to_string(),
                "https://www.carousell.com.my/search/nike".to_string(),
                "https://carousell.com.my/search/nike".to_string(),
                "https://www.carousell.com.my/c/18/?query=nike%20shoes".to_string(),
                "https://m.carousell.com.my/search/nike%20shoes".to_string(),
            ],
            challenge_markers: vec!["Just a moment".to_string(), "Cloudflare".to_string()],
            container_selector: r#"div[data-testid*="listing-card-"]"#.to_string(),
            load_more_xpath: "//button[contains(text(),'Show more results')]".to_string(),
            timing: Timing::default(),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            landing_pause_ms: 3_000,
            challenge_budget_ms: 30_000,
            poll_interval_ms: 2_000,
            alternative_settle_ms: 5_000,
            container_timeout_ms: 15_000,
            control_timeout_ms: 10_000,
            pre_click_pause_ms: 2_000,
            settle_ms: 7_000,
        }
    }
}

impl Default for StrategyToggles {
    fn default() -> Self {
        Self {
            api: true,
            browser: true,
            scanner: true,
        }
    }
}

impl Timing {
    /// All pauses zero and all budgets shrunk, for replays and tests.
    pub fn instant() -> Self {
        Self {
            navigation_timeout_ms: 1_000,
            landing_pause_ms: 0,
            challenge_budget_ms: 20,
            poll_interval_ms: 5,
            alternative_settle_ms: 0,
            container_timeout_ms: 20,
            control_timeout_ms: 20,
            pre_click_pause_ms: 0,
            settle_ms: 0,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl SentinelConfig {
    /// Resolve, read and parse the configuration, then apply env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a JSON config file. Absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config JSON: {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SENTINEL_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.webhook_url = Some(url);
            }
        }
        if let Ok(db) = std::env::var("SENTINEL_DB") {
            self.store_path = Some(PathBuf::from(db));
        }
        if let Ok(path) = std::env::var("SENTINEL_CHROMIUM_PATH") {
            self.browser.chromium_path = Some(PathBuf::from(path));
        }
    }

    /// Marketplace origin as a parsed URL, if it parses.
    pub fn base(&self) -> Option<Url> {
        Url::parse(&self.base_url).ok()
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| sentinel_home().join("listings.db"))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.journal_path
            .clone()
            .unwrap_or_else(|| sentinel_home().join("runs.jsonl"))
    }
}

/// `~/.sentinel`, or `/tmp/.sentinel` when there is no home directory.
pub fn sentinel_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".sentinel")
}

/// Find the config file to load, if any.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("SENTINEL_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let cwd = PathBuf::from("sentinel.json");
    if cwd.exists() {
        return Some(cwd);
    }

    let home = sentinel_home().join("config.json");
    if home.exists() {
        return Some(home);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_original_watcher() {
        let c = SentinelConfig::default();
        assert_eq!(c.currency, "RM");
        assert_eq!(c.api.endpoints.len(), 4);
        assert!(c
            .browser
            .alternative_urls
            .iter()
            .any(|u| u.starts_with("https://m.")));
        assert_eq!(c.browser.timing.challenge_budget_ms, 30_000);
        assert!(c.strategies.api && c.strategies.browser && c.strategies.scanner);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");
        std::fs::write(
            &path,
            r#"{"keyword": "adidas", "browser": {"headless": false}}"#,
        )
        .unwrap();

        let c = SentinelConfig::from_file(&path).unwrap();
        assert_eq!(c.keyword, "adidas");
        assert!(!c.browser.headless);
        assert_eq!(c.browser.timing.settle_ms, 7_000);
        assert_eq!(c.currency, "RM");
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(SentinelConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_explicit_path_wins() {
        let p = PathBuf::from("/etc/sentinel/custom.json");
        assert_eq!(resolve_config_path(Some(&p)), Some(p));
    }

    #[test]
    fn test_store_path_override() {
        let c = SentinelConfig {
            store_path: Some(PathBuf::from("/var/lib/sentinel.db")),
            ..SentinelConfig::default()
        };
        assert_eq!(c.store_path(), PathBuf::from("/var/lib/sentinel.db"));
        assert!(SentinelConfig::default()
            .journal_path()
            .ends_with(".sentinel/runs.jsonl"));
    }
}

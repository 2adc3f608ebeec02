//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (Chromium via chromiumoxide, or a replay of saved
//! HTML snapshots).

pub mod chromium;
pub mod replay;

use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// A browser engine that hands out rendering sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Acquire a fresh session. The caller owns it and must `close()` it.
    async fn acquire(&self, headless: bool) -> Result<Box<dyn RenderContext>>;
}

/// A single rendering session (one browser tab).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL; the load and the navigation wait share one timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;
    /// Current document title.
    async fn title(&self) -> Result<String>;
    /// Number of elements matching a CSS selector right now.
    async fn count(&self, css: &str) -> Result<usize>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Install a script that runs before any page script on every navigation.
    async fn add_init_script(&mut self, script: &str) -> Result<()>;
    /// Whether an element matching the XPath exists and can receive a click.
    async fn is_interactable(&self, xpath: &str) -> Result<bool>;
    /// Scroll the first element matching the XPath into view.
    async fn scroll_into_view(&self, xpath: &str) -> Result<()>;
    /// Click the first element matching the XPath.
    async fn click(&self, xpath: &str) -> Result<()>;
    /// Release the session.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Poll until at least one element matches `css` or `timeout` elapses.
    async fn wait_for_any(&self, css: &str, timeout: Duration, poll: Duration) -> bool {
        let start = Instant::now();
        loop {
            if matches!(self.count(css).await, Ok(n) if n > 0) {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Poll until the XPath element is interactable or `timeout` elapses.
    async fn wait_for_interactable(&self, xpath: &str, timeout: Duration, poll: Duration) -> bool {
        let start = Instant::now();
        loop {
            if matches!(self.is_interactable(xpath).await, Ok(true)) {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }
}

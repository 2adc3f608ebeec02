//! Replay renderer: serves saved HTML snapshots instead of a live browser.
//!
//! Every navigation lands on the first snapshot. While later snapshots
//! remain, the load-more control counts as interactable and a click advances
//! to the next one. Used by `sentinel replay` to check the extraction rules
//! against pages captured earlier, and by the strategy tests.

use super::{RenderContext, Renderer};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Title served for URLs registered with [`ReplayRenderer::with_challenge`].
pub const CHALLENGE_TITLE: &str = "Just a moment...";

/// One saved page.
#[derive(Debug, Clone)]
pub struct ReplayPage {
    pub title: String,
    pub html: String,
}

impl ReplayPage {
    pub fn new(title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            html: html.into(),
        }
    }

    /// Read a saved page; the title comes from its `<title>` element.
    pub fn from_file(path: &Path) -> Result<Self> {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let title = page_title(&html);
        Ok(Self { title, html })
    }
}

fn page_title(html: &str) -> String {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("title") else {
        return String::new();
    };
    doc.select(&sel)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// What happened to the sessions handed out by one renderer.
#[derive(Debug, Default)]
pub struct ReplayLog {
    navigations: Mutex<Vec<String>>,
    acquired: AtomicUsize,
    closed: AtomicUsize,
    clicks: AtomicUsize,
    init_scripts: AtomicUsize,
}

impl ReplayLog {
    pub fn navigations(&self) -> Vec<String> {
        self.navigations
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn clicks(&self) -> usize {
        self.clicks.load(Ordering::Relaxed)
    }

    pub fn init_scripts(&self) -> usize {
        self.init_scripts.load(Ordering::Relaxed)
    }
}

pub struct ReplayRenderer {
    pages: Arc<Vec<ReplayPage>>,
    challenged: Arc<Vec<String>>,
    available: bool,
    log: Arc<ReplayLog>,
}

impl ReplayRenderer {
    pub fn new(pages: Vec<ReplayPage>) -> Self {
        Self {
            pages: Arc::new(pages),
            challenged: Arc::new(Vec::new()),
            available: true,
            log: Arc::new(ReplayLog::default()),
        }
    }

    pub fn from_files(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let pages = paths
            .iter()
            .map(|p| ReplayPage::from_file(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(pages))
    }

    /// A renderer whose sessions can never be acquired.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    /// Serve a challenge page title whenever `url` is the current page.
    pub fn with_challenge(mut self, url: impl Into<String>) -> Self {
        let mut challenged = self.challenged.as_ref().clone();
        challenged.push(url.into());
        self.challenged = Arc::new(challenged);
        self
    }

    pub fn log(&self) -> Arc<ReplayLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Renderer for ReplayRenderer {
    async fn acquire(&self, _headless: bool) -> Result<Box<dyn RenderContext>> {
        if !self.available {
            bail!("no browser available for replay");
        }
        self.log.acquired.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ReplayContext {
            pages: Arc::clone(&self.pages),
            challenged: Arc::clone(&self.challenged),
            log: Arc::clone(&self.log),
            url: "about:blank".to_string(),
            index: AtomicUsize::new(0),
        }))
    }
}

pub struct ReplayContext {
    pages: Arc<Vec<ReplayPage>>,
    challenged: Arc<Vec<String>>,
    log: Arc<ReplayLog>,
    url: String,
    index: AtomicUsize,
}

impl ReplayContext {
    fn current(&self) -> Option<&ReplayPage> {
        self.pages.get(self.index.load(Ordering::Relaxed))
    }

    fn has_next(&self) -> bool {
        self.index.load(Ordering::Relaxed) + 1 < self.pages.len()
    }
}

#[async_trait]
impl RenderContext for ReplayContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<()> {
        if let Ok(mut log) = self.log.navigations.lock() {
            log.push(url.to_string());
        }
        self.url = url.to_string();
        self.index.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        if self.challenged.iter().any(|u| *u == self.url) {
            return Ok(CHALLENGE_TITLE.to_string());
        }
        Ok(self.current().map(|p| p.title.clone()).unwrap_or_default())
    }

    async fn count(&self, css: &str) -> Result<usize> {
        let selector =
            Selector::parse(css).map_err(|e| anyhow::anyhow!("invalid selector {css}: {e:?}"))?;
        let Some(page) = self.current() else {
            return Ok(0);
        };
        Ok(Html::parse_document(&page.html).select(&selector).count())
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.current().map(|p| p.html.clone()).unwrap_or_default())
    }

    async fn add_init_script(&mut self, _script: &str) -> Result<()> {
        self.log.init_scripts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn is_interactable(&self, _xpath: &str) -> Result<bool> {
        Ok(self.has_next())
    }

    async fn scroll_into_view(&self, xpath: &str) -> Result<()> {
        if !self.has_next() {
            bail!("no element for {xpath}");
        }
        Ok(())
    }

    async fn click(&self, xpath: &str) -> Result<()> {
        if !self.has_next() {
            bail!("no element for {xpath}");
        }
        self.index.fetch_add(1, Ordering::Relaxed);
        self.log.clicks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.closed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pages() -> Vec<ReplayPage> {
        vec![
            ReplayPage::new("one", "<div class='c'></div>"),
            ReplayPage::new("two", "<div class='c'></div><div class='c'></div>"),
        ]
    }

    #[tokio::test]
    async fn test_click_advances_until_last_page() {
        let renderer = ReplayRenderer::new(pages());
        let mut ctx = renderer.acquire(true).await.unwrap();
        ctx.navigate("https://x/search", 1000).await.unwrap();
        assert_eq!(ctx.count("div.c").await.unwrap(), 1);
        assert!(ctx.is_interactable("//button").await.unwrap());

        ctx.click("//button").await.unwrap();
        assert_eq!(ctx.title().await.unwrap(), "two");
        assert_eq!(ctx.count("div.c").await.unwrap(), 2);
        assert!(!ctx.is_interactable("//button").await.unwrap());
        assert!(ctx.click("//button").await.is_err());

        ctx.close().await.unwrap();
        let log = renderer.log();
        assert_eq!(log.clicks(), 1);
        assert_eq!(log.closed(), 1);
        assert_eq!(log.navigations(), vec!["https://x/search".to_string()]);
    }

    #[tokio::test]
    async fn test_challenge_title_and_wait_helpers() {
        let renderer = ReplayRenderer::new(pages()).with_challenge("https://x/blocked");
        let mut ctx = renderer.acquire(true).await.unwrap();
        ctx.navigate("https://x/blocked", 1000).await.unwrap();
        assert_eq!(ctx.title().await.unwrap(), CHALLENGE_TITLE);

        let poll = Duration::from_millis(1);
        assert!(ctx.wait_for_any("div.c", Duration::from_millis(5), poll).await);
        assert!(!ctx.wait_for_any("span.none", Duration::from_millis(5), poll).await);
        ctx.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unavailable_and_file_title() {
        assert!(ReplayRenderer::unavailable().acquire(true).await.is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, "<html><head><title> Saved </title></head></html>").unwrap();
        assert_eq!(ReplayPage::from_file(&path).unwrap().title, "Saved");
    }
}

//! Chromium-based renderer using chromiumoxide.

use super::{RenderContext, Renderer};
use crate::stealth;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. configured path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. SENTINEL_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("SENTINEL_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.sentinel/chromium/
    let home = crate::config::sentinel_home().join("chromium");
    let candidates = if cfg!(target_os = "macos") {
        vec![
            home.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            home.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            home.join("chrome"),
        ]
    } else {
        vec![home.join("chrome-linux64/chrome"), home.join("chrome")]
    };
    if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
        return Some(found);
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one Chromium process per acquired session.
pub struct ChromiumRenderer {
    chromium_path: Option<PathBuf>,
}

impl ChromiumRenderer {
    pub fn new(chromium_path: Option<PathBuf>) -> Self {
        Self { chromium_path }
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn acquire(&self, headless: bool) -> Result<Box<dyn RenderContext>> {
        let chrome_path = find_chromium(self.chromium_path.as_deref())
            .context("Chromium not found. Set SENTINEL_CHROMIUM_PATH or install Chrome.")?;
        let user_agent = stealth::pick_user_agent();

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1920, 1080)
            .arg(format!("--user-agent={user_agent}"))
            .arg("--lang=en-US,en;q=0.9")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-renderer-backgrounding");
        builder = if headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                bail!("failed to create new page: {e}");
            }
        };

        tracing::debug!(headless, user_agent, "chromium session acquired");
        Ok(Box::new(ChromiumContext {
            browser,
            page,
            handler_task,
        }))
    }
}

/// One browser process with a single tab. The child process is killed when
/// the context is dropped without `close()`.
pub struct ChromiumContext {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumContext {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();
        let page = &self.page;
        let load = async {
            page.goto(url).await?;
            let _ = page.wait_for_navigation().await;
            Ok::<(), CdpError>(())
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), load).await {
            Ok(Ok(())) => {
                let final_url = page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| url.to_string());
                tracing::debug!(
                    final_url = %final_url,
                    "page loaded in {}ms",
                    start.elapsed().as_millis()
                );
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn title(&self) -> Result<String> {
        self.eval("document.title").await
    }

    async fn count(&self, css: &str) -> Result<usize> {
        let selector = serde_json::to_string(css)?;
        self.eval(&format!("document.querySelectorAll({selector}).length"))
            .await
    }

    async fn get_html(&self) -> Result<String> {
        self.eval("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")
    }

    async fn add_init_script(&mut self, script: &str) -> Result<()> {
        self.page
            .evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .context("failed to register init script")?;
        // Also apply to the document that is already loaded.
        let _ = self.page.evaluate(script).await;
        Ok(())
    }

    async fn is_interactable(&self, xpath: &str) -> Result<bool> {
        match self.page.find_xpath(xpath).await {
            Ok(el) => Ok(el.clickable_point().await.is_ok()),
            Err(_) => Ok(false),
        }
    }

    async fn scroll_into_view(&self, xpath: &str) -> Result<()> {
        let el = self
            .page
            .find_xpath(xpath)
            .await
            .with_context(|| format!("no element for {xpath}"))?;
        el.scroll_into_view().await?;
        Ok(())
    }

    async fn click(&self, xpath: &str) -> Result<()> {
        let el = self
            .page
            .find_xpath(xpath)
            .await
            .with_context(|| format!("no element for {xpath}"))?;
        el.click().await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        let _ = this.page.close().await;
        let closed = this.browser.close().await;
        let _ = this.browser.wait().await;
        this.handler_task.abort();
        closed.context("failed to close Chromium")?;
        tracing::debug!("chromium session released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_path_is_skipped() {
        let bogus = Path::new("/definitely/not/a/chrome");
        // Falls through to the other lookups; must never return the bogus path.
        assert_ne!(find_chromium(Some(bogus)).as_deref(), Some(bogus));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_navigate_count_and_click() {
        let renderer = ChromiumRenderer::new(None);
        let mut ctx = renderer.acquire(true).await.expect("failed to acquire");

        ctx.navigate(
            "data:text/html,<title>Hi</title><div class='c'>a</div><div class='c'>b</div><button onclick=\"this.textContent='done'\">Show more results</button>",
            10000,
        )
        .await
        .expect("navigation failed");

        assert_eq!(ctx.title().await.unwrap(), "Hi");
        assert_eq!(ctx.count("div.c").await.unwrap(), 2);

        let xpath = "//button[contains(text(),'Show more results')]";
        assert!(ctx.is_interactable(xpath).await.unwrap());
        ctx.click(xpath).await.expect("click failed");
        assert!(ctx.get_html().await.unwrap().contains("done"));
        assert!(!ctx.is_interactable("//button[@id='nope']").await.unwrap());

        // Unroutable host: the load never finishes, so the whole navigation must time out.
        let err = ctx.navigate("http://10.255.255.1/", 300).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        ctx.close().await.expect("close failed");
    }
}

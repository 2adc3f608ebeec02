//! Rendered-page extractor.
//!
//! Drives one rendering session through the landing page, the search page
//! (waiting out any challenge interstitial, then trying alternative URLs),
//! and the "Show more results" pagination loop. The session is released on
//! every exit path.

use super::{AcquisitionStrategy, Stage, StrategyContext};
use crate::config::{BrowserSettings, SentinelConfig};
use crate::error::{StrategyError, StrategyResult};
use crate::extraction::dom::harvest_page;
use crate::listing::Listing;
use crate::renderer::{RenderContext, Renderer};
use crate::stealth;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

pub struct BrowserStrategy {
    renderer: Arc<dyn Renderer>,
    settings: BrowserSettings,
    landing_url: String,
    search_url: String,
    base: Option<Url>,
    currency: String,
}

/// Records collected so far, deduplicated by product id in first-seen order.
#[derive(Default)]
struct Accumulator {
    seen: HashSet<String>,
    listings: Vec<Listing>,
}

impl Accumulator {
    /// Append unseen records; returns how many were new.
    fn extend(&mut self, batch: Vec<Listing>) -> usize {
        let before = self.listings.len();
        for listing in batch {
            if self.seen.insert(listing.product_id.clone()) {
                self.listings.push(listing);
            }
        }
        self.listings.len() - before
    }
}

fn pause(ms: u64) -> tokio::time::Sleep {
    tokio::time::sleep(Duration::from_millis(ms))
}

/// Leave the current page for the heuristic scanner.
async fn keep_snapshot(session: &dyn RenderContext, ctx: &mut StrategyContext) {
    match session.get_html().await {
        Ok(html) => ctx.page_snapshot = Some(html),
        Err(e) => warn!("could not snapshot page for scanning: {e:#}"),
    }
}

impl BrowserStrategy {
    pub fn new(renderer: Arc<dyn Renderer>, config: &SentinelConfig) -> Self {
        Self {
            renderer,
            settings: config.browser.clone(),
            landing_url: config.landing_url.clone(),
            search_url: config.search_url.clone(),
            base: config.base(),
            currency: config.currency.clone(),
        }
    }

    fn is_challenge(&self, title: &str) -> bool {
        self.settings
            .challenge_markers
            .iter()
            .any(|m| title.contains(m.as_str()))
    }

    async fn goto(&self, session: &mut dyn RenderContext, url: &str) -> StrategyResult<()> {
        info!("navigating to {url}");
        session
            .navigate(url, self.settings.timing.navigation_timeout_ms)
            .await
            .map_err(|source| StrategyError::Navigation {
                url: url.to_string(),
                source,
            })
    }

    /// Poll the title until no challenge marker remains. False if the
    /// budget runs out first.
    async fn wait_out_challenge(&self, session: &dyn RenderContext) -> bool {
        let timing = &self.settings.timing;
        let budget = Duration::from_millis(timing.challenge_budget_ms);
        let start = Instant::now();
        loop {
            tokio::time::sleep(timing.poll_interval()).await;
            let waited_ms = start.elapsed().as_millis() as u64;
            match session.title().await {
                Ok(title) if !self.is_challenge(&title) => {
                    info!("page loaded after {waited_ms}ms");
                    return true;
                }
                Ok(title) => debug!(waited_ms, title = %title, "challenge still present"),
                Err(e) => debug!(waited_ms, "title unavailable: {e:#}"),
            }
            if start.elapsed() >= budget {
                return false;
            }
        }
    }

    async fn harvest(&self, session: &dyn RenderContext) -> StrategyResult<Vec<Listing>> {
        let html = session.get_html().await?;
        let page = harvest_page(
            &html,
            &self.settings.container_selector,
            self.base.as_ref(),
            &self.currency,
        )?;
        Ok(page.listings)
    }

    /// Harvest the loaded search page, following "Show more results" until
    /// the control disappears or a click brings nothing new.
    async fn harvest_all(
        &self,
        session: &dyn RenderContext,
        ctx: &mut StrategyContext,
    ) -> StrategyResult<Vec<Listing>> {
        let timing = &self.settings.timing;
        let poll = timing.poll_interval();
        let css = &self.settings.container_selector;

        let present = session
            .wait_for_any(css, Duration::from_millis(timing.container_timeout_ms), poll)
            .await;
        if !present {
            info!(
                "no listing containers after {}ms",
                timing.container_timeout_ms
            );
            keep_snapshot(session, ctx).await;
            return Ok(Vec::new());
        }

        let mut acc = Accumulator::default();
        acc.extend(self.harvest(session).await?);

        let xpath = &self.settings.load_more_xpath;
        let control_timeout = Duration::from_millis(timing.control_timeout_ms);
        loop {
            if !session.wait_for_interactable(xpath, control_timeout, poll).await {
                debug!("no load-more control; pagination done");
                break;
            }
            if let Err(e) = session.scroll_into_view(xpath).await {
                debug!("load-more scroll failed: {e:#}");
                break;
            }
            pause(timing.pre_click_pause_ms).await;
            if let Err(e) = session.click(xpath).await {
                debug!("load-more click failed: {e:#}");
                break;
            }
            info!("clicked load-more, waiting for content");
            pause(timing.settle_ms).await;

            let batch = match self.harvest(session).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("harvest after load-more failed: {e}");
                    break;
                }
            };
            let added = acc.extend(batch);
            info!("load-more added {added} listings ({} total)", acc.listings.len());
            if added == 0 {
                break;
            }
        }

        if acc.listings.is_empty() {
            info!("containers present but none yielded a listing");
            keep_snapshot(session, ctx).await;
        }
        Ok(acc.listings)
    }

    async fn drive(
        &self,
        session: &mut dyn RenderContext,
        ctx: &mut StrategyContext,
    ) -> StrategyResult<Vec<Listing>> {
        let installed = stealth::apply(session).await;
        debug!("{installed} fingerprint overrides installed");

        self.goto(session, &self.landing_url).await?;
        pause(self.settings.timing.landing_pause_ms).await;
        self.goto(session, &self.search_url).await?;

        if self.wait_out_challenge(session).await {
            return self.harvest_all(session, ctx).await;
        }

        warn!("challenge page persisted; trying alternative URLs");
        let mut cleared = false;
        for url in &self.settings.alternative_urls {
            if let Err(e) = self.goto(session, url).await {
                debug!("{e}");
                continue;
            }
            pause(self.settings.timing.alternative_settle_ms).await;
            match session.title().await {
                Ok(title) if !self.is_challenge(&title) => {}
                _ => continue,
            }
            info!("alternative URL cleared the challenge: {url}");
            cleared = true;
            let listings = self.harvest_all(session, ctx).await?;
            if !listings.is_empty() {
                return Ok(listings);
            }
        }

        if cleared {
            return Ok(Vec::new());
        }
        Err(StrategyError::ChallengeNotCleared {
            waited_ms: self.settings.timing.challenge_budget_ms,
            alternatives: self.settings.alternative_urls.len(),
        })
    }
}

#[async_trait]
impl AcquisitionStrategy for BrowserStrategy {
    fn stage(&self) -> Stage {
        Stage::Browser
    }

    async fn acquire(&self, ctx: &mut StrategyContext) -> StrategyResult<Vec<Listing>> {
        let mut session = self
            .renderer
            .acquire(self.settings.headless)
            .await
            .map_err(StrategyError::Session)?;

        let outcome = self.drive(session.as_mut(), ctx).await;

        if let Err(e) = session.close().await {
            warn!("failed to release rendering session: {e:#}");
        }
        outcome
    }
}

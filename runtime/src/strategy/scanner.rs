//! Heuristic selector scanner.
//!
//! Last resort when the rendered page had no recognizable listing cards.
//! Walks a table of loose selectors over the saved page and keeps the first
//! one that produces any record.

use super::{AcquisitionStrategy, Stage, StrategyContext};
use crate::config::SentinelConfig;
use crate::error::StrategyResult;
use crate::extraction::{element_text, product_id_from_url};
use crate::listing::{clean_text, normalize_url, Listing};
use async_trait::async_trait;
use fnv::FnvHasher;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::hash::Hasher;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

/// Candidates inspected per selector.
const CANDIDATE_LIMIT: usize = 5;
/// Leading characters of candidate text checked for relevance.
const RELEVANCE_WINDOW: usize = 100;

#[derive(Debug, Clone, Copy)]
pub enum ScanSelector {
    Css(&'static str),
    /// The n-th ancestor of every element whose own text holds the currency marker.
    PriceAncestor(usize),
}

pub const SCAN_SELECTORS: &[ScanSelector] = &[
    ScanSelector::Css(r#"a[href*="/p/"]"#),
    ScanSelector::Css(r#"div[class*="listing"]"#),
    ScanSelector::Css(r#"[data-testid*="listing"]"#),
    ScanSelector::Css(r#"[data-testid*="card"]"#),
    ScanSelector::Css(r#"div[class*="card"]"#),
    ScanSelector::Css("article"),
    ScanSelector::PriceAncestor(3),
];

static PRODUCT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/p/"]"#).expect("product link selector is valid"));
static ALT_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[alt]").expect("image selector is valid"));
static SRC_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("image selector is valid"));

pub struct HeuristicScanner {
    base: Option<Url>,
    keyword: String,
    scan_keywords: Vec<String>,
    currency: String,
}

/// Last eight decimal digits of the link's FNV-1a hash.
pub fn fallback_id(link: &str) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(link.as_bytes());
    let digits = hasher.finish().to_string();
    digits[digits.len().saturating_sub(8)..].to_string()
}

fn own_text_contains(el: &ElementRef<'_>, needle: &str) -> bool {
    el.children()
        .filter_map(|c| c.value().as_text())
        .any(|t| t.contains(needle))
}

fn descendants<'a>(el: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.descendants().skip(1).filter_map(ElementRef::wrap)
}

fn nth_ancestor<'a>(el: ElementRef<'a>, n: usize) -> Option<ElementRef<'a>> {
    let mut current = el;
    for _ in 0..n {
        current = current.parent().and_then(ElementRef::wrap)?;
    }
    Some(current)
}

impl HeuristicScanner {
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self {
            base: config.base(),
            keyword: config.keyword.to_lowercase(),
            scan_keywords: config.scan_keywords.iter().map(|k| k.to_lowercase()).collect(),
            currency: config.currency.clone(),
        }
    }

    fn candidates<'a>(&self, document: &'a Html, selector: ScanSelector) -> Vec<ElementRef<'a>> {
        match selector {
            ScanSelector::Css(css) => match Selector::parse(css) {
                Ok(sel) => document.select(&sel).collect(),
                Err(e) => {
                    debug!("skipping selector {css}: {e:?}");
                    Vec::new()
                }
            },
            ScanSelector::PriceAncestor(n) => {
                let mut seen = HashSet::new();
                document
                    .root_element()
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .filter(|el| own_text_contains(el, &self.currency))
                    .filter_map(|el| nth_ancestor(el, n))
                    .filter(|el| seen.insert(el.id()))
                    .collect()
            }
        }
    }

    fn is_relevant(&self, el: &ElementRef<'_>) -> bool {
        let text: String = element_text(el)
            .chars()
            .take(RELEVANCE_WINDOW)
            .collect::<String>()
            .to_lowercase();
        let currency = self.currency.to_lowercase();
        text.contains(&currency)
            || (!self.keyword.is_empty() && text.contains(self.keyword.as_str()))
            || self.scan_keywords.iter().any(|k| text.contains(k.as_str()))
    }

    fn link(&self, el: &ElementRef<'_>) -> Option<String> {
        let anchor = if PRODUCT_LINK.matches(el) {
            *el
        } else {
            el.select(&PRODUCT_LINK).next()?
        };
        normalize_url(anchor.value().attr("href")?, self.base.as_ref())
    }

    fn title(&self, el: &ElementRef<'_>) -> Option<String> {
        el.select(&ALT_IMAGE)
            .find_map(|img| clean_text(img.value().attr("alt")?))
            .or_else(|| {
                descendants(el)
                    .find(|d| {
                        d.children()
                            .filter_map(|c| c.value().as_text())
                            .any(|t| t.to_lowercase().contains(&self.keyword))
                    })
                    .and_then(|d| clean_text(&element_text(&d)))
            })
    }

    fn price(&self, el: &ElementRef<'_>) -> Option<String> {
        descendants(el)
            .find(|d| own_text_contains(d, &self.currency))
            .and_then(|d| clean_text(&element_text(&d)))
    }

    /// Build a record from a loosely matched element; `None` without a link.
    pub fn extract_basic(&self, el: &ElementRef<'_>) -> Option<Listing> {
        let link = self.link(el)?;
        let product_id = product_id_from_url(&link).unwrap_or_else(|| fallback_id(&link));
        let mut listing = Listing::new(product_id);
        listing.link = Some(link);
        listing.title = self.title(el);
        listing.price = self.price(el);
        listing.img = el
            .select(&SRC_IMAGE)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string);
        Some(listing)
    }

    /// Run the selector table over a page; the first productive selector wins.
    pub fn scan(&self, html: &str) -> Vec<Listing> {
        let document = Html::parse_document(html);
        for selector in SCAN_SELECTORS {
            let candidates = self.candidates(&document, *selector);
            info!("selector {selector:?} found {} elements", candidates.len());

            let listings: Vec<Listing> = candidates
                .iter()
                .take(CANDIDATE_LIMIT)
                .filter(|el| self.is_relevant(el))
                .filter_map(|el| self.extract_basic(el))
                .collect();
            if !listings.is_empty() {
                info!("{} listings via selector {selector:?}", listings.len());
                return listings;
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl AcquisitionStrategy for HeuristicScanner {
    fn stage(&self) -> Stage {
        Stage::Scanner
    }

    async fn acquire(&self, ctx: &mut StrategyContext) -> StrategyResult<Vec<Listing>> {
        match ctx.page_snapshot.as_deref() {
            Some(html) => Ok(self.scan(html)),
            None => {
                debug!("no rendered page to scan");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> HeuristicScanner {
        HeuristicScanner::from_config(&SentinelConfig::default())
    }

    #[test]
    fn test_fallback_id_is_eight_digits_and_stable() {
        let a = fallback_id("https://www.carousell.com.my/p/mystery");
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(a, fallback_id("https://www.carousell.com.my/p/mystery"));
    }

    #[test]
    fn test_anchor_selector_wins_first() {
        let html = r#"<html><body>
            <a href="/p/nike-pegasus-41-555/"><img alt="Nike Pegasus 41" src="https://cdn/555.jpg"/><span>RM 280</span></a>
            <article><a href="/p/other-777/">Nike other RM 1</a></article>
        </body></html>"#;
        let out = scanner().scan(html);
        assert_eq!(out.len(), 2);
        let first = &out[0];
        assert_eq!(first.product_id, "555");
        assert_eq!(first.title.as_deref(), Some("Nike Pegasus 41"));
        assert_eq!(first.price.as_deref(), Some("RM 280"));
        assert_eq!(first.img.as_deref(), Some("https://cdn/555.jpg"));
        assert_eq!(
            first.link.as_deref(),
            Some("https://www.carousell.com.my/p/nike-pegasus-41-555/")
        );
    }

    #[test]
    fn test_irrelevant_candidates_are_skipped() {
        let html = r#"<a href="/p/kettle-1/">Kettle</a>
            <div class="card-x"><a href="/p/nike-dunk-2/">Dunk</a><p>Nike Dunk</p></div>"#;
        let out = scanner().scan(html);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].product_id, "2");
        assert_eq!(out[0].title.as_deref(), Some("Nike Dunk"));
    }

    #[test]
    fn test_target_keyword_counts_as_relevant() {
        let config = SentinelConfig {
            keyword: "Adidas".to_string(),
            ..SentinelConfig::default()
        };
        let html = r#"<a href="/p/adidas-samba-og-88/"><span>Adidas Samba OG</span></a>"#;
        let out = HeuristicScanner::from_config(&config).scan(html);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].product_id, "88");
        assert_eq!(out[0].title.as_deref(), Some("Adidas Samba OG"));

        assert!(scanner().scan(html).is_empty());
    }

    #[test]
    fn test_price_ancestor_and_hash_fallback() {
        let html = r#"<section><ul><li><a href="/p/mystery-box/">box</a><div><b><i>RM 50</i></b></div></li></ul></section>"#;
        let out = scanner().scan(html);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].product_id.len(), 8);
        assert_eq!(out[0].price.as_deref(), Some("RM 50"));
    }

    #[test]
    fn test_only_first_five_candidates() {
        let filler: String = (0..5).map(|i| format!("<article>empty {i}</article>")).collect();
        let html = format!("{filler}<article><a href=\"/p/late-9/\">late</a> Nike</article>");
        assert!(scanner().scan(&html).is_empty());
    }

    #[tokio::test]
    async fn test_without_snapshot_is_empty() {
        let out = scanner().acquire(&mut StrategyContext::default()).await.unwrap();
        assert!(out.is_empty());
    }
}

//! Rule tables for rendered listing cards.
//!
//! The marketplace ships obfuscated class names (`D_ls`, `D_lI`, ...). Rules
//! lean on stable hooks (`data-testid`, href patterns, `title` attributes)
//! first and use class fragments only where nothing better exists.

use super::{element_text, first_match, product_id_from_url};
use crate::listing::{clean_text, normalize_url, Listing, DEFAULT_LIKES, KNOWN_CONDITIONS};
use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

/// `data-testid` prefix carried by each listing card container.
pub const CARD_TESTID_PREFIX: &str = "listing-card-";

const RELATIVE_TIME_WORDS: &[&str] = &["ago", "seconds", "minutes", "hours", "days"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static PRODUCT_LINK: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href*="/p/"]"#));
static SELLER_LINK: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[href*="/u/"], a[href*="/user/"]"#));
static LISTING_IMAGE: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[href*="/p/"] img, img[class*="D_mm"]"#));
static ANY_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector("img[src]"));
static TITLE_PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector(r#"p[class*="D_lI"]"#));
static TITLED_PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p[title]"));
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));
static SELLER_NAME: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"p[data-testid="listing-card-text-seller-name"]"#));
static SELLER_TIME: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"div[class*="D_rw"] div[class*="D_aLG"] p"#));
static DETAIL_PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector(r#"p[class*="D_lz"]"#));
static LIKE_COUNT: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"button[data-testid="listing-card-btn-like"] span"#));

/// One listing card plus the anchors most rules start from.
pub struct Card<'a> {
    root: ElementRef<'a>,
    product_link: Option<ElementRef<'a>>,
    seller_link: Option<ElementRef<'a>>,
    base: Option<&'a Url>,
    currency: &'a str,
}

type CardRule = fn(&Card<'_>) -> Option<String>;

impl<'a> Card<'a> {
    pub fn new(root: ElementRef<'a>, base: Option<&'a Url>, currency: &'a str) -> Self {
        Self {
            product_link: root.select(&PRODUCT_LINK).next(),
            seller_link: root.select(&SELLER_LINK).next(),
            root,
            base,
            currency,
        }
    }

    fn link(&self) -> Option<String> {
        let href = self.product_link?.value().attr("href")?;
        normalize_url(href, self.base)
    }

    fn seller_url(&self) -> Option<String> {
        let href = self.seller_link?.value().attr("href")?;
        normalize_url(href, self.base)
    }

    fn paragraphs(&self) -> impl Iterator<Item = String> + '_ {
        self.root.select(&PARAGRAPH).map(|p| element_text(&p))
    }

    fn details(&self) -> impl Iterator<Item = String> + '_ {
        self.root.select(&DETAIL_PARAGRAPH).map(|p| element_text(&p))
    }
}

// ── product_id ──

const PRODUCT_ID_RULES: &[CardRule] = &[id_from_testid, id_from_link_path];

fn id_from_testid(card: &Card<'_>) -> Option<String> {
    card.root
        .value()
        .attr("data-testid")?
        .strip_prefix(CARD_TESTID_PREFIX)
        .map(str::to_string)
}

fn id_from_link_path(card: &Card<'_>) -> Option<String> {
    product_id_from_url(&card.link()?)
}

// ── title ──

const TITLE_RULES: &[CardRule] = &[title_from_image_alt, title_from_link_paragraph];

fn title_from_image_alt(card: &Card<'_>) -> Option<String> {
    let img = card.root.select(&LISTING_IMAGE).next()?;
    clean_text(img.value().attr("alt")?)
}

fn title_from_link_paragraph(card: &Card<'_>) -> Option<String> {
    let p = card.product_link?.select(&TITLE_PARAGRAPH).next()?;
    clean_text(&element_text(&p))
}

// ── img ──

const IMAGE_RULES: &[CardRule] = &[image_from_listing_image, image_from_any];

fn image_from_listing_image(card: &Card<'_>) -> Option<String> {
    let img = card.root.select(&LISTING_IMAGE).next()?;
    img.value().attr("src").map(str::to_string)
}

fn image_from_any(card: &Card<'_>) -> Option<String> {
    let img = card.root.select(&ANY_IMAGE).next()?;
    img.value().attr("src").map(str::to_string)
}

// ── price ──

const PRICE_RULES: &[CardRule] = &[
    price_from_title_attr,
    price_from_titled_text,
    price_from_currency_paragraph,
];

fn price_from_title_attr(card: &Card<'_>) -> Option<String> {
    let p = card.product_link?.select(&TITLED_PARAGRAPH).next()?;
    clean_text(p.value().attr("title")?)
}

fn price_from_titled_text(card: &Card<'_>) -> Option<String> {
    let p = card.product_link?.select(&TITLED_PARAGRAPH).next()?;
    clean_text(&element_text(&p))
}

fn price_from_currency_paragraph(card: &Card<'_>) -> Option<String> {
    let link = card.product_link?;
    let texts: Vec<String> = link.select(&PARAGRAPH).map(|p| element_text(&p)).collect();
    texts
        .iter()
        .find(|t| t.starts_with(card.currency))
        .or_else(|| texts.iter().find(|t| t.contains(card.currency)))
        .cloned()
}

// ── seller ──

const SELLER_NAME_RULES: &[CardRule] = &[seller_from_name_paragraph, seller_from_link_text];

fn seller_from_name_paragraph(card: &Card<'_>) -> Option<String> {
    let p = card.seller_link?.select(&SELLER_NAME).next()?;
    clean_text(&element_text(&p))
}

fn seller_from_link_text(card: &Card<'_>) -> Option<String> {
    let link = card.seller_link?;
    link.select(&PARAGRAPH)
        .map(|p| element_text(&p))
        .find(|t| !t.is_empty())
        .or_else(|| clean_text(&element_text(&link)))
}

// ── time_posted ──

const TIME_POSTED_RULES: &[CardRule] = &[time_from_seller_block, time_from_relative_phrase];

fn time_from_seller_block(card: &Card<'_>) -> Option<String> {
    let p = card.seller_link?.select(&SELLER_TIME).next()?;
    clean_text(&element_text(&p))
}

fn time_from_relative_phrase(card: &Card<'_>) -> Option<String> {
    card.paragraphs().find(|t| {
        let lower = t.to_lowercase();
        RELATIVE_TIME_WORDS.iter().any(|w| lower.contains(w))
    })
}

// ── condition / size ──

const CONDITION_RULES: &[CardRule] = &[condition_from_label, condition_from_known_phrase];
const SIZE_RULES: &[CardRule] = &[size_from_label, size_from_link_paragraph];

fn labelled(card: &Card<'_>, label: &str) -> Option<String> {
    card.details()
        .find(|t| t.contains(label))
        .and_then(|t| clean_text(&t.replace(label, "")))
}

fn condition_from_label(card: &Card<'_>) -> Option<String> {
    labelled(card, "Condition:")
}

fn condition_from_known_phrase(card: &Card<'_>) -> Option<String> {
    card.details()
        .find(|t| KNOWN_CONDITIONS.contains(&t.as_str()))
}

fn size_from_label(card: &Card<'_>) -> Option<String> {
    labelled(card, "Size:")
}

fn size_from_link_paragraph(card: &Card<'_>) -> Option<String> {
    card.product_link?
        .select(&PARAGRAPH)
        .map(|p| element_text(&p))
        .find(|t| t.contains("Size: "))
        .and_then(|t| clean_text(&t.replace("Size: ", "")))
}

// ── likes ──

const LIKES_RULES: &[CardRule] = &[likes_from_button];

fn likes_from_button(card: &Card<'_>) -> Option<String> {
    card.root
        .select(&LIKE_COUNT)
        .map(|s| element_text(&s))
        .find(|t| !t.is_empty())
}

/// Build a record from one card, or `None` when no `product_id` is derivable.
pub fn extract_card(card: &Card<'_>) -> Option<Listing> {
    let product_id = first_match(PRODUCT_ID_RULES, |rule| rule(card))?;

    let mut listing = Listing::new(product_id);
    listing.link = card.link();
    listing.img = first_match(IMAGE_RULES, |rule| rule(card));
    listing.title = first_match(TITLE_RULES, |rule| rule(card));
    listing.price = first_match(PRICE_RULES, |rule| rule(card));
    listing.seller_url = card.seller_url();
    listing.seller_name = first_match(SELLER_NAME_RULES, |rule| rule(card));
    listing.time_posted = first_match(TIME_POSTED_RULES, |rule| rule(card));
    listing.condition = first_match(CONDITION_RULES, |rule| rule(card));
    listing.size = first_match(SIZE_RULES, |rule| rule(card));
    listing.likes =
        first_match(LIKES_RULES, |rule| rule(card)).unwrap_or_else(|| DEFAULT_LIKES.to_string());
    Some(listing)
}

/// Result of reading every listing card on one page snapshot.
#[derive(Debug, Default)]
pub struct PageHarvest {
    /// Containers matched by the card selector.
    pub containers: usize,
    /// Records built from containers that had a `product_id`.
    pub listings: Vec<Listing>,
}

/// Run the card rules over every container matching `container_css`.
pub fn harvest_page(
    html: &str,
    container_css: &str,
    base: Option<&Url>,
    currency: &str,
) -> Result<PageHarvest> {
    let containers = Selector::parse(container_css)
        .map_err(|e| anyhow!("invalid container selector {container_css:?}: {e}"))?;
    let document = Html::parse_document(html);

    let mut harvest = PageHarvest::default();
    for (i, root) in document.select(&containers).enumerate() {
        harvest.containers += 1;
        let card = Card::new(root, base, currency);
        match extract_card(&card) {
            Some(listing) => harvest.listings.push(listing),
            None => debug!("card {} has no derivable product_id; skipped", i + 1),
        }
    }

    info!(
        "harvested {} listings from {} containers",
        harvest.listings.len(),
        harvest.containers
    );
    Ok(harvest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.carousell.com.my";
    const CARDS: &str = r#"div[data-testid*="listing-card-"]"#;

    fn full_card() -> &'static str {
        r#"
        <div data-testid="listing-card-1234567890">
          <a class="D_ls" href="/u/sneakerhead/?t-source=card">
            <div class="D_rw x"><img src="https://cdn/avatar.jpg"/>
              <div><p data-testid="listing-card-text-seller-name">sneakerhead</p>
                <div class="D_aLG"><p>3 days ago</p></div></div>
            </div>
          </a>
          <a class="D_ls" href="/p/nike-air-max-90-1234567890/?t-id=abc#top">
            <img class="D_mm" alt="Nike Air Max 90" src="https://cdn/p/1.jpg"/>
            <p class="D_lI">Nike Air Max 90 OG</p>
            <p title="RM 320">RM 320</p>
            <p class="D_lz">Size: UK 9</p>
          </a>
          <p class="D_lz">Lightly used</p>
          <button data-testid="listing-card-btn-like"><span class="D_lz">12</span></button>
        </div>"#
    }

    fn harvest(body: &str) -> PageHarvest {
        let base = Url::parse(BASE).unwrap();
        harvest_page(&format!("<html><body>{body}</body></html>"), CARDS, Some(&base), "RM")
            .unwrap()
    }

    #[test]
    fn test_full_card_extraction() {
        let h = harvest(full_card());
        assert_eq!(h.containers, 1);
        let l = &h.listings[0];
        assert_eq!(l.product_id, "1234567890");
        assert_eq!(
            l.link.as_deref(),
            Some("https://www.carousell.com.my/p/nike-air-max-90-1234567890/")
        );
        assert_eq!(l.title.as_deref(), Some("Nike Air Max 90"));
        assert_eq!(l.img.as_deref(), Some("https://cdn/p/1.jpg"));
        assert_eq!(l.price.as_deref(), Some("RM 320"));
        assert_eq!(l.seller_name.as_deref(), Some("sneakerhead"));
        assert_eq!(
            l.seller_url.as_deref(),
            Some("https://www.carousell.com.my/u/sneakerhead/")
        );
        assert_eq!(l.time_posted.as_deref(), Some("3 days ago"));
        assert_eq!(l.condition.as_deref(), Some("Lightly used"));
        assert_eq!(l.size.as_deref(), Some("UK 9"));
        assert_eq!(l.likes, "12");
    }

    #[test]
    fn test_product_id_falls_back_to_link_path() {
        let h = harvest(
            r#"<div data-testid="promoted-listing-card-x">
                 <a href="https://www.carousell.com.my/p/jordan-1-high-555?ref=1"><p>RM 10</p></a>
               </div>"#,
        );
        assert_eq!(h.listings.len(), 1);
        assert_eq!(h.listings[0].product_id, "555");
    }

    #[test]
    fn test_card_without_id_is_dropped() {
        let h = harvest(
            r#"<div data-testid="ad-listing-card-slot"><a href="/p/no-digits-here/"><p>RM 5</p></a></div>
               <div data-testid="listing-card-77"><a href="/p/ok-77"></a></div>"#,
        );
        assert_eq!(h.containers, 2);
        assert_eq!(h.listings.len(), 1);
        assert_eq!(h.listings[0].product_id, "77");
    }

    #[test]
    fn test_likes_default_when_absent() {
        let h = harvest(r#"<div data-testid="listing-card-9"><a href="/p/a-9"></a></div>"#);
        assert_eq!(h.listings[0].likes, "0");

        let h = harvest(
            r#"<div data-testid="listing-card-9"><button data-testid="listing-card-btn-like"><span> </span></button></div>"#,
        );
        assert_eq!(h.listings[0].likes, "0");
    }

    #[test]
    fn test_title_falls_back_to_link_paragraph() {
        let h = harvest(
            r#"<div data-testid="listing-card-5"><a href="/p/x-5"><img src="i.jpg"/><p class="D_lI">Nike Dunk</p></a></div>"#,
        );
        assert_eq!(h.listings[0].title.as_deref(), Some("Nike Dunk"));
    }

    #[test]
    fn test_price_fallbacks() {
        // Empty title attribute falls through to the paragraph's visible text.
        let h = harvest(
            r#"<div data-testid="listing-card-1"><a href="/p/x-1"><p title="">RM 99</p></a></div>"#,
        );
        assert_eq!(h.listings[0].price.as_deref(), Some("RM 99"));

        // No titled paragraph: currency-marked text.
        let h = harvest(
            r#"<div data-testid="listing-card-2"><a href="/p/x-2"><p>Nike Blazer</p><p>Price RM 45</p><p>RM 40</p></a></div>"#,
        );
        assert_eq!(h.listings[0].price.as_deref(), Some("RM 40"));
    }

    #[test]
    fn test_condition_label_and_time_phrase_fallback() {
        let h = harvest(
            r#"<div data-testid="listing-card-3">
                 <p class="D_lz">Condition: Brand new</p>
                 <p>Posted 5 Minutes ago</p>
               </div>"#,
        );
        let l = &h.listings[0];
        assert_eq!(l.condition.as_deref(), Some("Brand new"));
        assert_eq!(l.time_posted.as_deref(), Some("Posted 5 Minutes ago"));
        assert!(l.size.is_none());
        assert!(l.seller_url.is_none());
    }

    #[test]
    fn test_unknown_detail_is_not_a_condition() {
        let h = harvest(r#"<div data-testid="listing-card-4"><p class="D_lz">Meetup only</p></div>"#);
        assert!(h.listings[0].condition.is_none());
    }

    #[test]
    fn test_invalid_container_selector() {
        assert!(harvest_page("<html></html>", "div[[", None, "RM").is_err());
    }
}

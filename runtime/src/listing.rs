//! Canonical listing record shared by every acquisition strategy.

use serde::{Deserialize, Serialize};
use url::Url;

/// Descriptive condition phrases the marketplace renders without a prefix.
pub const KNOWN_CONDITIONS: &[&str] = &["Lightly used", "Well used", "Like new", "Brand new", "Used"];

/// Value stored in `likes` when the card shows no like count.
pub const DEFAULT_LIKES: &str = "0";

/// One normalized marketplace listing.
///
/// `product_id` is the only mandatory field and the sole dedup key.
/// `link` and `seller_url` never carry a query string or fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub product_id: String,
    pub title: Option<String>,
    pub price: Option<String>,
    pub link: Option<String>,
    pub img: Option<String>,
    pub seller_name: Option<String>,
    pub seller_url: Option<String>,
    pub time_posted: Option<String>,
    pub condition: Option<String>,
    pub size: Option<String>,
    pub likes: String,
}

impl Listing {
    /// A record with only its key set; every other field absent, `likes` at its default.
    pub fn new(product_id: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            title: None,
            price: None,
            link: None,
            img: None,
            seller_name: None,
            seller_url: None,
            time_posted: None,
            condition: None,
            size: None,
            likes: DEFAULT_LIKES.to_string(),
        }
    }

    /// Title for log lines and notifications.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(untitled)")
    }
}

/// Resolve `href` against `base` and strip its query string and fragment.
///
/// Returns `None` when `href` cannot be parsed even relative to `base`.
pub fn normalize_url(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let mut url = match Url::parse(href) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(href).ok()?,
        Err(_) => return None,
    };
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Collapse runs of whitespace and trim; `None` when nothing is left.
pub fn clean_text(text: &str) -> Option<String> {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_query_and_fragment() {
        assert_eq!(
            normalize_url("https://x/p/a-1?ref=2#frag", None).as_deref(),
            Some("https://x/p/a-1")
        );
    }

    #[test]
    fn test_normalize_tracking_variants_collapse() {
        let a = normalize_url("https://www.carousell.com.my/p/nike-air-123?t-id=abc", None);
        let b = normalize_url("https://www.carousell.com.my/p/nike-air-123?t-id=xyz&ref=home#top", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_relative_href() {
        let base = Url::parse("https://www.carousell.com.my/search/nike").unwrap();
        assert_eq!(
            normalize_url("/u/sneakerhead/?src=card", Some(&base)).as_deref(),
            Some("https://www.carousell.com.my/u/sneakerhead/")
        );
        assert!(normalize_url("/p/x-1", None).is_none());
        assert!(normalize_url("   ", Some(&base)).is_none());
    }

    #[test]
    fn test_new_listing_defaults_likes() {
        let l = Listing::new("42");
        assert_eq!(l.likes, "0");
        assert!(l.title.is_none());
        assert_eq!(l.display_title(), "(untitled)");
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Nike \n  Air  ").as_deref(), Some("Nike Air"));
        assert_eq!(clean_text(" \t "), None);
    }
}

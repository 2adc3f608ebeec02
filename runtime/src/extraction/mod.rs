//! Field extraction: raw listing containers to canonical [`Listing`] records.
//!
//! Each field has an ordered table of pure rule functions. Rules are tried in
//! order and the first non-empty value wins; when every rule misses the field
//! stays absent (or at its default for `likes`). A missing field never drops
//! the record; a missing `product_id` always does.
//!
//! - [`dom`] works on one rendered listing card (`scraper` element).
//! - [`json`] works on one object from a structured-data payload.
//!
//! [`Listing`]: crate::listing::Listing

pub mod dom;
pub mod json;

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static PRODUCT_PATH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/p/[^/]+-(\d+)").expect("product path regex is valid"));

/// Evaluate `rules` in order and return the first non-blank value.
pub fn first_match<R>(rules: &[R], apply: impl Fn(&R) -> Option<String>) -> Option<String> {
    rules
        .iter()
        .filter_map(apply)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Numeric listing id at the end of a `/p/<slug>-<id>` path.
///
/// Only the path is inspected, so ids inside query strings never match.
pub fn product_id_from_url(link: &str) -> Option<String> {
    let path = match Url::parse(link) {
        Ok(u) => u.path().to_string(),
        Err(_) => link.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    PRODUCT_PATH_ID
        .captures(&path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(el: &scraper::ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

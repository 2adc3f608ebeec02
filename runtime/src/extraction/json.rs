//! Rule tables for structured-data payloads.
//!
//! Marketplace APIs disagree on key names, so every field has a short
//! ordered list of candidate keys. The payload shape itself is located
//! through [`LISTING_PATHS`], a declarative table of key paths.

use super::first_match;
use crate::listing::{normalize_url, Listing, DEFAULT_LIKES};
use serde_json::Value;
use url::Url;

/// Key paths that may hold the listing array, tried in order.
pub const LISTING_PATHS: &[&[&str]] = &[
    &["data", "listings"],
    &["listings"],
    &["results"],
    &["data", "results"],
    &["items"],
    &["data", "items"],
    &["products"],
    &["data"],
];

const ID_KEYS: &[&str] = &["id", "listing_id", "product_id", "_id", "uuid"];
const TITLE_KEYS: &[&str] = &["title", "name", "listing_title", "product_name"];
const PRICE_KEYS: &[&str] = &["price", "listing_price", "amount"];
const IMAGE_KEYS: &[&str] = &["image", "images", "photo", "photos", "thumbnail"];
const LINK_KEYS: &[&str] = &["link", "url", "permalink"];
const SELLER_KEYS: &[&str] = &["seller_name", "username"];
const NESTED_SELLER_KEYS: &[&str] = &["username", "name"];
const TIME_KEYS: &[&str] = &["time_posted", "time_created", "created_at"];
const CONDITION_KEYS: &[&str] = &["condition", "condition_name"];
const SIZE_KEYS: &[&str] = &["size"];
const LIKES_KEYS: &[&str] = &["likes_count", "like_count", "likes"];

/// Settings shared by every item of one payload.
#[derive(Debug, Clone, Copy)]
pub struct JsonContext<'a> {
    pub base: Option<&'a Url>,
    pub base_url: &'a str,
    pub currency: &'a str,
    pub keyword: &'a str,
}

/// Follow `path` through nested objects.
pub fn navigate<'v>(data: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(data, |current, key| current.get(*key))
}

/// The first [`LISTING_PATHS`] entry that resolves to an array.
pub fn locate_listings(data: &Value) -> Option<(&'static [&'static str], &Vec<Value>)> {
    LISTING_PATHS
        .iter()
        .find_map(|path| navigate(data, path)?.as_array().map(|arr| (*path, arr)))
}

/// Run the item rules over the first listing array found in `data`.
///
/// Non-object elements and items failing the relevance filter are skipped.
pub fn extract_payload(data: &Value, ctx: &JsonContext<'_>) -> Vec<Listing> {
    let Some((path, items)) = locate_listings(data) else {
        return Vec::new();
    };
    let listings: Vec<Listing> = items
        .iter()
        .filter(|item| item.is_object())
        .filter_map(|item| extract_item(item, ctx))
        .collect();
    tracing::debug!(
        "path {} held {} items, {} accepted",
        path.join("."),
        items.len(),
        listings.len()
    );
    listings
}

/// Display text of a scalar; strings are trimmed, numbers printed as-is.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_by_keys(item: &Value, keys: &[&str]) -> Option<String> {
    first_match(keys, |key| item.get(*key).and_then(scalar_text))
}

fn price_text(value: &Value, currency: &str) -> Option<String> {
    let amount = match value.get("amount") {
        Some(amount) => scalar_text(amount),
        None => scalar_text(value),
    }?;
    Some(format!("{currency} {amount}"))
}

fn image_url(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(image_url),
        Value::Object(_) => value.get("url").and_then(scalar_text),
        _ => scalar_text(value),
    }
}

fn seller_name(item: &Value) -> Option<String> {
    text_by_keys(item, SELLER_KEYS).or_else(|| {
        let seller = item.get("seller")?;
        text_by_keys(seller, NESTED_SELLER_KEYS)
    })
}

/// Build a record from one payload item.
///
/// Returns `None` without an id, without a title, or when the title does not
/// mention the target keyword.
pub fn extract_item(item: &Value, ctx: &JsonContext<'_>) -> Option<Listing> {
    let product_id = text_by_keys(item, ID_KEYS)?;
    let title = text_by_keys(item, TITLE_KEYS)?;
    if !title.to_lowercase().contains(&ctx.keyword.to_lowercase()) {
        return None;
    }

    let mut listing = Listing::new(product_id);
    listing.price = first_match(PRICE_KEYS, |key| {
        item.get(*key).and_then(|v| price_text(v, ctx.currency))
    });
    listing.img = first_match(IMAGE_KEYS, |key| item.get(*key).and_then(image_url));
    listing.link = first_match(LINK_KEYS, |key| {
        item.get(*key)
            .and_then(Value::as_str)
            .and_then(|href| normalize_url(href, ctx.base))
    })
    .or_else(|| {
        Some(format!(
            "{}/p/{}",
            ctx.base_url.trim_end_matches('/'),
            listing.product_id
        ))
    });
    listing.seller_name = seller_name(item);
    listing.time_posted = text_by_keys(item, TIME_KEYS);
    listing.condition = text_by_keys(item, CONDITION_KEYS);
    listing.size = text_by_keys(item, SIZE_KEYS);
    listing.likes = text_by_keys(item, LIKES_KEYS).unwrap_or_else(|| DEFAULT_LIKES.to_string());
    listing.title = Some(title);
    Some(listing)
}

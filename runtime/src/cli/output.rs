//! Output helpers shared by the subcommands.
//!
//! Global flags are published through environment variables by `main` so
//! every command can check them without threading them through.

use crate::listing::Listing;
use serde::Serialize;

pub fn is_quiet() -> bool {
    std::env::var_os("SENTINEL_QUIET").is_some()
}

pub fn is_json() -> bool {
    std::env::var_os("SENTINEL_JSON").is_some()
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to serialize output: {e}"),
    }
}

/// One line per listing: id, price, title, link.
pub fn print_listings(listings: &[Listing]) {
    for l in listings {
        println!(
            "{:<14} {:<12} {}  {}",
            l.product_id,
            l.price.as_deref().unwrap_or("-"),
            l.display_title(),
            l.link.as_deref().unwrap_or("-")
        );
    }
}

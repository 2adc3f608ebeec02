//! Deduplication and dispatch gate.
//!
//! The only place that decides whether a listing is new. Unseen records are
//! saved first and then sent; a failed send is counted and not retried.

use crate::listing::Listing;
use crate::notifier::Notifier;
use crate::store::ListingStore;
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub forwarded: usize,
    pub already_seen: usize,
    pub notify_failures: usize,
}

pub struct DispatchGate<'a> {
    store: &'a dyn ListingStore,
    notifier: &'a dyn Notifier,
}

impl<'a> DispatchGate<'a> {
    pub fn new(store: &'a dyn ListingStore, notifier: &'a dyn Notifier) -> Self {
        Self { store, notifier }
    }

    /// Persist and forward every unseen record. Store errors abort the pass.
    pub async fn dispatch(&self, listings: &[Listing]) -> Result<GateReport> {
        let mut report = GateReport::default();

        for listing in listings {
            if listing.product_id.trim().is_empty() {
                continue;
            }
            if self.store.exists(&listing.product_id)? {
                debug!("{} already seen", listing.product_id);
                report.already_seen += 1;
                continue;
            }

            self.store.save(listing)?;
            info!(
                "new listing: {} - {}",
                listing.display_title(),
                listing.price.as_deref().unwrap_or("no price")
            );
            report.forwarded += 1;

            if !self.notifier.send(listing).await {
                warn!("notification failed for {}", listing.product_id);
                report.notify_failures += 1;
            }
        }

        if report.forwarded == 0 {
            info!("no new listings");
        } else {
            info!(
                "forwarded {} new listings ({} notification failures)",
                report.forwarded, report.notify_failures
            );
        }
        Ok(report)
    }
}

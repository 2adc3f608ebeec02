//! `sentinel status`: what the watcher has seen and how recent runs went.

use crate::audit::RunJournal;
use crate::cli::output;
use crate::config::SentinelConfig;
use crate::store::SqliteStore;
use anyhow::Result;
use std::path::Path;

const RECENT: usize = 5;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = SentinelConfig::load(config_path)?;
    let store_path = config.store_path();

    let (count, recent) = if store_path.exists() {
        let store = SqliteStore::open(&store_path)?;
        (store.count()?, store.recent(RECENT)?)
    } else {
        (0, Vec::new())
    };
    let runs = RunJournal::read_recent(&config.journal_path(), RECENT)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "store": store_path.display().to_string(),
            "listings_seen": count,
            "recent_listings": recent,
            "recent_runs": runs,
        }));
        return Ok(());
    }

    println!("Store: {} ({count} listings seen)", store_path.display());
    if !recent.is_empty() {
        println!();
        println!("Recently seen:");
        for item in &recent {
            println!(
                "  {}  {:<12} {}",
                item.first_seen,
                item.listing.price.as_deref().unwrap_or("-"),
                item.listing.display_title()
            );
        }
    }

    println!();
    if runs.is_empty() {
        println!("No runs recorded yet.");
    } else {
        println!("Last runs:");
        for run in runs.iter().rev() {
            let stage = run
                .stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let status = format!("{:?}", run.status).to_lowercase();
            println!(
                "  {}  {:<9} via {:<8} found {:>3}, new {:>3}, seen {:>3}, failed sends {} ({}ms)",
                run.timestamp,
                status,
                stage,
                run.found,
                run.forwarded,
                run.already_seen,
                run.notify_failures,
                run.duration_ms
            );
        }
    }
    Ok(())
}

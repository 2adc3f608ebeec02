//! Environment readiness check.

use crate::cli::output;
use crate::config::{resolve_config_path, SentinelConfig};
use crate::renderer::chromium::find_chromium;
use crate::store::SqliteStore;
use anyhow::Result;
use std::path::Path;
use std::process::Command;

/// Check config, Chromium, the store, the webhook and available memory.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let resolved = resolve_config_path(config_path);
    let config = SentinelConfig::load(config_path)?;

    let chromium = find_chromium(config.browser.chromium_path.as_deref());
    let store = SqliteStore::open(&config.store_path());
    let webhook = config.webhook_url.is_some();
    let mem_mb = get_available_memory_mb();

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "config": resolved.as_ref().map(|p| p.display().to_string()),
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "store": {
                "path": config.store_path().display().to_string(),
                "ok": store.is_ok(),
            },
            "webhook": webhook,
            "available_memory_mb": mem_mb,
            "ready": store.is_ok() && webhook,
        }));
        return Ok(());
    }

    println!("Listing Sentinel Doctor");
    println!("=======================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &resolved {
        Some(path) => println!("[OK] Config: {}", path.display()),
        None => println!("[OK] Config: built-in defaults"),
    }

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Only the API strategy can succeed. \
             Set SENTINEL_CHROMIUM_PATH or install Chrome."
        ),
    }

    match &store {
        Ok(_) => println!("[OK] Store: {}", config.store_path().display()),
        Err(e) => println!("[!!] Store unusable: {e:#}"),
    }

    if webhook {
        println!("[OK] Webhook configured");
    } else {
        println!("[!!] No webhook configured; new listings will only be logged.");
    }

    match mem_mb {
        Some(mb) if mb >= 512 => println!("[OK] Available memory: {mb}MB (>= 512MB for Chromium)"),
        Some(mb) => println!("[!!] Available memory: {mb}MB (< 512MB, Chromium may fail)"),
        None => println!("[??] Could not determine available memory"),
    }

    println!();
    if store.is_ok() && webhook {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        s.lines()
            .find(|line| line.starts_with("Mem:"))
            .and_then(|line| line.split_whitespace().nth(6))
            .and_then(|v| v.parse().ok())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

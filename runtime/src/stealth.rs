//! Browser fingerprint masking.
//!
//! Sessions get a randomly chosen desktop user agent and a set of property
//! overrides that hide the usual automation markers. Each override is
//! installed independently; one that fails is skipped.

use crate::renderer::RenderContext;
use rand::seq::SliceRandom;

/// Desktop user agents rotated across sessions.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Property overrides applied before any page script runs.
pub const OVERRIDE_SCRIPTS: &[&str] = &[
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})",
    "Object.defineProperty(navigator, 'plugins', {get: () => [1, 2, 3, 4, 5]})",
    "Object.defineProperty(navigator, 'languages', {get: () => ['en-US', 'en']})",
    "Object.defineProperty(navigator, 'permissions', {get: () => ({query: () => Promise.resolve({state: 'granted'})})})",
    "Object.defineProperty(navigator, 'hardwareConcurrency', {get: () => 4})",
    "Object.defineProperty(navigator, 'deviceMemory', {get: () => 8})",
    "window.chrome = {runtime: {}}",
    "Object.defineProperty(navigator, 'connection', {get: () => ({effectiveType: '4g', rtt: 100, downlink: 10})})",
];

pub fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Install every override on `ctx`. Returns how many were accepted.
pub async fn apply(ctx: &mut dyn RenderContext) -> usize {
    let mut applied = 0;
    for script in OVERRIDE_SCRIPTS {
        match ctx.add_init_script(script).await {
            Ok(()) => applied += 1,
            Err(e) => tracing::debug!("stealth override skipped: {e:#}"),
        }
    }
    applied
}

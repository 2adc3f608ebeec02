// Copyright 2026 Listing Sentinel Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use listing_sentinel::cli;
use listing_sentinel::cli::run_cmd::RunFlags;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sentinel",
    about = "Listing Sentinel: marketplace listing watcher",
    version,
    after_help = "Run 'sentinel <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (default: $SENTINEL_CONFIG, ./sentinel.json, ~/.sentinel/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire listings once and notify about new ones
    Run {
        /// Show the browser window
        #[arg(long)]
        headful: bool,
        /// Skip the structured-data endpoints
        #[arg(long)]
        no_api: bool,
        /// Skip the browser and heuristic scanner
        #[arg(long)]
        no_browser: bool,
        /// Print listings instead of storing and sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Send a synthetic listing to the configured webhook
    TestNotify,
    /// Show stored listings and recent runs
    Status,
    /// Check environment and diagnose issues
    Doctor,
    /// Extract listings from saved HTML pages (load-more pages in order)
    Replay {
        /// HTML files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("SENTINEL_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("SENTINEL_QUIET", "1");
    }
    cli::init_tracing(cli.verbose, cli.log_json);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run {
            headful,
            no_api,
            no_browser,
            dry_run,
        } => {
            let flags = RunFlags {
                config: cli.config.clone(),
                headful,
                no_api,
                no_browser,
                dry_run,
            };
            cli::run_cmd::run(&flags).await
        }
        Commands::TestNotify => cli::notify_cmd::run(config).await,
        Commands::Status => cli::status::run(config).await,
        Commands::Doctor => cli::doctor::run(config).await,
        Commands::Replay { files } => cli::replay_cmd::run(config, &files).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "sentinel", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !cli::output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}

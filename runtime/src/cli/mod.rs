//! CLI subcommand implementations for the `sentinel` binary.

pub mod doctor;
pub mod notify_cmd;
pub mod output;
pub mod replay_cmd;
pub mod run_cmd;
pub mod status;

/// Initialize tracing on stderr. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose {
        "listing_sentinel=debug"
    } else {
        "listing_sentinel=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

//! Tracing subscriber setup.
//!
//! Logs go to stderr so `qbx ask` and `qbx history --json` keep stdout clean.
//! `RUST_LOG` wins when set; otherwise `--verbose` selects debug.

use tracing_subscriber::EnvFilter;

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "querybox=debug,tower_http=debug"
    } else {
        "querybox=info,tower_http=warn"
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

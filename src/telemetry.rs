// 📡 Structured logging
//
// Library code only emits `tracing` events; binaries call `init_logging`
// once. `RUST_LOG` overrides the verbosity-derived default.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Default filter for a given `-v` count
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,open_bid=info",
        1 => "info,open_bid=debug",
        _ => "debug,open_bid=trace",
    }
}

pub fn init_logging(verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}

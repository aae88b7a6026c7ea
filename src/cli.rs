use std::path::PathBuf;

use clap::Parser;

/// Level-2 order-book engine — maintains a local book, rolling stats, and
/// a short-horizon mid-price forecast for a single product.
#[derive(Parser, Debug)]
#[command(name = "orderbook-engine", version)]
pub struct Args {
    /// Product to subscribe to (e.g. BTC-USD)
    #[arg(long, default_value = "BTC-USD")]
    pub product: String,

    /// WebSocket feed URL
    #[arg(long, default_value = "wss://ws-feed.pro.coinbase.com")]
    pub url: String,

    /// Directory to append raw inbound JSON messages to (must be empty)
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Enable verbose (debug-level) logging
    #[arg(long)]
    pub debug: bool,

    /// Log level (trace, debug, info, warn, error); overridden by --debug
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

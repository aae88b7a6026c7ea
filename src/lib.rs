//! Level-2 order-book engine: local book maintenance, rolling statistics,
//! and a short-horizon mid-price forecast, driven from a single
//! synchronous ingest thread behind an async websocket transport.

pub mod cache;
pub mod console;
pub mod error;
pub mod forecast_table;
pub mod forecaster;
pub mod ingress;
pub mod messages;
pub mod mid_price_series;
pub mod order_book;
pub mod price_book;
pub mod transport;

pub use error::Error;
pub use ingress::IngressAdapter;
pub use order_book::{EngineConfig, OrderBook, OrderBookStats};

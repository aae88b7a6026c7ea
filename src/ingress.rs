//! Parses inbound wire messages and dispatches them to the engine.
//!
//! Runs entirely on the ingest thread: no operation here suspends for I/O.

use tracing::{info, warn};

use crate::cache::CacheSink;
use crate::error::Error;
use crate::forecaster::SeasonalModel;
use crate::messages::{self, InboundMessage};
use crate::order_book::{EngineConfig, OrderBook, OrderBookStats};

/// Owns the (possibly not-yet-initialized) engine for one product and
/// routes parsed messages to it, writing to an optional cache sink first.
pub struct IngressAdapter<M: SeasonalModel + Default + Send + 'static> {
    engine: Option<OrderBook<M>>,
    config: EngineConfig,
    product: String,
    cache: Option<CacheSink>,
}

impl<M: SeasonalModel + Default + Send + 'static> IngressAdapter<M> {
    pub fn new(product: String, config: EngineConfig, cache: Option<CacheSink>) -> Self {
        Self {
            engine: None,
            config,
            product,
            cache,
        }
    }

    /// Handle one raw text frame from the transport.
    pub fn handle_text(&mut self, raw: &str) -> Result<(), Error> {
        let parsed = match messages::parse_inbound(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "failed to parse inbound message, dropping");
                return Ok(());
            }
        };

        let message_type = match &parsed {
            InboundMessage::Subscriptions => "subscriptions",
            InboundMessage::Snapshot(_) => "snapshot",
            InboundMessage::L2Update(_) => "l2update",
            InboundMessage::Unknown(raw_type) => {
                warn!(r#type = %raw_type, "ignoring message of unknown type");
                return Ok(());
            }
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.write(&self.product, message_type, raw) {
                warn!(error = %e, "failed to write cache entry");
            }
        }

        match parsed {
            InboundMessage::Subscriptions => {
                info!("subscription confirmed");
            }
            InboundMessage::Snapshot(snapshot) => {
                if self.engine.is_some() {
                    warn!("received a second snapshot on an already-initialized engine, ignoring");
                } else {
                    info!(bids = snapshot.bids.len(), asks = snapshot.asks.len(), "engine initialized from snapshot");
                    self.engine = Some(OrderBook::from_snapshot(snapshot, self.config.clone()));
                }
            }
            InboundMessage::L2Update(update) => match &mut self.engine {
                Some(engine) => engine.apply_update(update)?,
                None => warn!("received l2update before any snapshot, ignoring"),
            },
            InboundMessage::Unknown(_) => unreachable!("handled above"),
        }

        Ok(())
    }

    pub fn stats(&self) -> Option<OrderBookStats> {
        self.engine.as_ref().map(OrderBook::get_stats)
    }

    pub fn await_forecaster_idle(&self, timeout: std::time::Duration) -> bool {
        match &self.engine {
            Some(engine) => engine.await_forecaster_idle(timeout),
            None => true,
        }
    }
}

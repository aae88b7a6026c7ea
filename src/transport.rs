//! WebSocket subscriber: connects, subscribes, and forwards raw text
//! frames to the ingest thread. Reconnects with a fixed delay on any
//! connection error; detects a stale connection via a periodic check
//! and a ping/pong keepalive. This is the only async/tokio part of the
//! system — everything past `tx.send` runs on a synchronous ingest
//! thread with no runtime dependence.

use std::sync::mpsc::Sender;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::messages;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const STALE_THRESHOLD: Duration = Duration::from_secs(60);
const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Outer reconnection loop. Runs until cancelled.
pub async fn run_feed(url: &str, product: &str, tx: Sender<String>, cancel: CancellationToken) {
    info!(url, product, "starting feed");

    loop {
        match run_single_connection(url, product, &tx, &cancel).await {
            Ok(()) => {
                info!("feed stopped gracefully");
                return;
            }
            Err(e) => {
                error!(error = %e, "connection error");

                if cancel.is_cancelled() {
                    return;
                }

                info!(delay = ?RECONNECT_DELAY, "reconnecting");
                tokio::select! {
                    _ = time::sleep(RECONNECT_DELAY) => {}
                    _ = cancel.cancelled() => {
                        info!("shutdown during reconnect wait");
                        return;
                    }
                }
            }
        }
    }
}

/// Single WebSocket connection lifetime.
async fn run_single_connection(
    url: &str,
    product: &str,
    tx: &Sender<String>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    info!("connecting");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, mut stream) = ws_stream.split();

    info!("connected");
    sink.send(Message::Text(messages::subscribe_request(product).into()))
        .await?;

    let mut last_message_time = Instant::now();
    let mut ping_interval = time::interval(PING_INTERVAL);
    ping_interval.tick().await;

    let mut stale_interval = time::interval(STALE_CHECK_INTERVAL);
    stale_interval.tick().await;

    let mut pong_deadline: Option<Instant> = None;

    loop {
        let pong_timeout_fut = match pong_deadline {
            Some(deadline) => time::sleep_until(deadline),
            None => time::sleep_until(Instant::now() + Duration::from_secs(86_400)),
        };
        let pong_active = pong_deadline.is_some();

        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_message_time = Instant::now();
                        if tx.send(text.to_string()).is_err() {
                            warn!("ingest thread gone, stopping feed");
                            return Err(Error::ConnectionClosed);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!("received server ping");
                        last_message_time = Instant::now();
                        sink.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        debug!("received pong");
                        last_message_time = Instant::now();
                        pong_deadline = None;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("received close frame");
                        return Err(Error::ConnectionClosed);
                    }
                    Some(Ok(_)) => {
                        last_message_time = Instant::now();
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocket(e));
                    }
                    None => {
                        return Err(Error::ConnectionClosed);
                    }
                }
            }

            _ = ping_interval.tick() => {
                debug!("sending ping");
                sink.send(Message::Ping(vec![].into())).await?;
                pong_deadline = Some(Instant::now() + PONG_TIMEOUT);
            }

            _ = stale_interval.tick() => {
                let elapsed = last_message_time.elapsed();
                if elapsed > STALE_THRESHOLD {
                    let ms = elapsed.as_millis() as u64;
                    warn!(elapsed_ms = ms, "connection stale");
                    return Err(Error::StaleConnection(ms));
                }
            }

            _ = pong_timeout_fut, if pong_active => {
                warn!("pong timeout");
                return Err(Error::PongTimeout);
            }

            _ = cancel.cancelled() => {
                info!("shutdown requested, sending close frame");
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}

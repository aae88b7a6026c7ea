mod cli;

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use orderbook_engine::cache::CacheSink;
use orderbook_engine::forecaster::SeasonalMeanModel;
use orderbook_engine::ingress::IngressAdapter;
use orderbook_engine::order_book::EngineConfig;
use orderbook_engine::{console, transport};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);
const RETRAIN_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let args = cli::Args::parse();

    let level = if args.debug { "debug" } else { args.log_level.as_str() };
    let filter = level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(product = %args.product, url = %args.url, "orderbook-engine starting");

    let cache = match args.cache {
        Some(dir) => match CacheSink::new(dir) {
            Ok(sink) => Some(sink),
            Err(e) => {
                tracing::error!(error = %e, "fatal cache configuration error");
                std::process::exit(1);
            }
        },
        None => None,
    };

    let adapter = Arc::new(Mutex::new(IngressAdapter::<SeasonalMeanModel>::new(
        args.product.clone(),
        EngineConfig::default(),
        cache,
    )));

    let (tx, rx) = std_mpsc::channel::<String>();

    let ingest_adapter = Arc::clone(&adapter);
    let ingest_thread = std::thread::spawn(move || {
        while let Ok(text) = rx.recv() {
            let mut adapter = ingest_adapter.lock().unwrap();
            if let Err(e) = adapter.handle_text(&text) {
                tracing::warn!(error = %e, "failed to process inbound message");
            }
        }
    });

    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received SIGINT, shutting down");
        cancel_clone.cancel();
    });

    #[cfg(unix)]
    {
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            let mut sig =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            sig.recv().await;
            info!("received SIGTERM, shutting down");
            cancel_clone.cancel();
        });
    }

    let reporter_adapter = Arc::clone(&adapter);
    let reporter_cancel = cancel.clone();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(REPORT_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stats = reporter_adapter.lock().unwrap().stats();
                    if let Some(stats) = stats {
                        let stdout = std::io::stdout();
                        let mut handle = stdout.lock();
                        if let Err(e) = console::print_stats(&stats, &mut handle) {
                            tracing::debug!(error = %e, "failed to print stats");
                        }
                    }
                }
                _ = reporter_cancel.cancelled() => return,
            }
        }
    });

    transport::run_feed(&args.url, &args.product, tx, cancel).await;

    let _ = reporter.await;
    drop(ingest_thread.join());

    let idle = adapter.lock().unwrap().await_forecaster_idle(RETRAIN_SHUTDOWN_TIMEOUT);
    if !idle {
        tracing::warn!("shutting down with a forecaster refit still in flight");
    }
}

//! editwatch runtime
//!
//! Wires the stream consumer, range table refresher and dispatcher together:
//! - Loads the address range dataset (startup fails without it)
//! - Authorizes with the notification endpoint unless DRY_RUN is set
//! - Spawns the refresher, dispatcher and stream consumer
//! - Stops everything on CTRL+C
//!
//! Usage:
//!   cargo run --release --bin editwatch
//!
//! Environment variables: see `RuntimeConfig::from_env`. `.env` is honored.
//!
//! Exit status is 1 when startup fails or a stream record outgrows the read
//! buffer ceiling.

use dotenv::dotenv;
use editwatch::aggregation::{AggregationStore, Dispatcher};
use editwatch::classify::{load_table, OriginClassifier, TableRefresher};
use editwatch::config::{RuntimeConfig, TableSource};
use editwatch::publish::{authorize, HttpPublisher, LogPublisher, Publisher, WikidataTitles, USER_AGENT};
use editwatch::stream::{EventFilter, HttpEventSource, StreamConsumer};
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    // NOTE: Workaround for rustls issue
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("⚠️  Crypto provider already installed");
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::from_env()?;

    info!("🚀 editwatch {}", env!("CARGO_PKG_VERSION"));
    info!("   ├─ Stream: {}", config.stream_url);
    info!(
        "   ├─ Read buffer: 2^{} bytes (ceiling 2^{})",
        config.buffer_exponent, config.buffer_exponent_max
    );
    match &config.table_source {
        TableSource::Url(url) => info!("   ├─ Range dataset: {}", url),
        TableSource::File(path) => info!("   ├─ Range dataset: {} (file)", path),
    }
    info!("   ├─ Refresh interval: {}s", config.refresh_interval.as_secs());
    info!("   ├─ Tick interval: {}s", config.tick_interval.as_secs());
    info!("   ├─ Quiet period: {}s", config.quiet_period_secs);
    info!("   └─ Mode: {}", if config.dry_run { "dry-run" } else { "publishing" });

    let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

    info!("🔧 Loading range dataset...");
    let table = load_table(&config.table_source, &client).await?;
    info!("✅ Range dataset loaded: {} ranges ({} skipped)", table.len(), table.skipped());
    let classifier = Arc::new(OriginClassifier::new(table));

    let titles = Arc::new(WikidataTitles::new(client.clone()));
    let publisher: Arc<dyn Publisher> = match &config.oauth {
        Some(oauth) if !config.dry_run => {
            let token = authorize(&client, oauth).await?;
            Arc::new(
                HttpPublisher::new(client.clone(), &config.publish_url, token, titles)
                    .with_refresh(oauth.clone()),
            )
        }
        _ => Arc::new(LogPublisher::new(titles)),
    };

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(1);

    let refresher = TableRefresher::new(
        config.table_source.clone(),
        client.clone(),
        classifier.clone(),
        config.refresh_interval,
    );
    let refresher_handle = tokio::spawn(refresher.run(cancel.clone()));

    let store = AggregationStore::new(config.quiet_period_secs);
    let dispatcher = Dispatcher::new(store, publisher, config.tick_interval);
    let dispatcher_handle = tokio::spawn(dispatcher.run(rx, cancel.clone()));

    let source = Arc::new(HttpEventSource::new(&config.stream_url, USER_AGENT)?);
    let mut consumer = StreamConsumer::new(
        source,
        EventFilter::default(),
        classifier,
        tx,
        config.buffer_exponent,
        config.buffer_exponent_max,
    );
    let consumer_cancel = cancel.clone();
    let consumer_handle = tokio::spawn(async move {
        let result = consumer.run(consumer_cancel).await;
        (result, consumer.stats())
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
            Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
        }
        signal_cancel.cancel();
    });

    info!("🔄 Press CTRL+C to shutdown gracefully");

    let (stream_result, stats) = consumer_handle.await?;
    // Also covers the consumer stopping on its own.
    cancel.cancel();

    let report = dispatcher_handle.await?;
    refresher_handle.await?;

    info!(
        "📊 Stream: {} subscriptions, {} frames, {} handed off, {} filtered, {} unattributed, {} malformed",
        stats.subscriptions,
        stats.frames,
        stats.handed_off,
        stats.filtered,
        stats.unclassified,
        stats.malformed
    );
    info!(
        "📊 Bursts: {} published, {} failed, {} dropped",
        report.bursts_published, report.publish_failures, report.dropped
    );

    // Only the buffer ceiling ends the consumer with an error.
    stream_result?;
    info!("✅ editwatch stopped");
    Ok(())
}

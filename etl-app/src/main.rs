//! Coinbase market-data ETL service
//!
//! Wires the feed connection, resync engine and broker producers together,
//! reads overrides from `ETL_*` environment variables and runs until the
//! feed closes or a shutdown signal arrives.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use coinbase_etl_core::{
    CoinbaseRestClient, Dispatcher, EtlConfig, EventBus, EventProducer, FeedConnection,
    ResyncEngine, TracingSink, WsTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let config = config_from_env()?;
    info!(
        product = %config.feed.product,
        url = %config.feed.url,
        "🚀 Starting Coinbase market-data ETL"
    );

    let bus = EventBus::default();

    // Producers drain the bus whether or not a broker is attached; with the
    // broker disabled the pipeline still runs end to end against a log sink.
    let mut producer_tasks = Vec::new();
    if config.broker.enabled {
        let match_producer = EventProducer::new(TracingSink, config.broker.match_topic.clone());
        let match_rx = bus.subscribe_matches();
        producer_tasks.push(tokio::spawn(async move {
            match_producer.run_matches(match_rx).await;
        }));

        let ticker_producer = EventProducer::new(TracingSink, config.broker.ticker_topic.clone());
        let ticker_rx = bus.subscribe_tickers();
        producer_tasks.push(tokio::spawn(async move {
            ticker_producer.run_tickers(ticker_rx).await;
        }));
        info!("✅ Broker producers started");
    } else {
        warn!("broker disabled, events stay on the internal bus");
    }

    let rest = CoinbaseRestClient::new(config.rest.base_url.clone());
    let resync = ResyncEngine::new(rest, &config.feed.product, bus.clone())
        .map_err(|e| anyhow!("invalid product {}: {}", config.feed.product, e))?;
    let mut dispatcher = Dispatcher::new(config.subscription(), bus.clone(), resync);

    let transport = WsTransport::new(&config.feed.url)
        .with_context(|| format!("invalid feed url {}", config.feed.url))?;
    let mut connection = FeedConnection::new(transport, config.feed.url.clone(), config.retry);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let reason = connection
        .run(&mut dispatcher, shutdown_rx)
        .await
        .context("feed connection failed")?;

    drop(bus);
    for task in producer_tasks {
        let _ = task.await;
    }

    if reason.is_normal() {
        info!("✅ Shutdown complete");
        Ok(())
    } else {
        Err(anyhow!("feed session ended abnormally: {}", reason))
    }
}

/// Build the runtime configuration from defaults and `ETL_*` overrides.
fn config_from_env() -> Result<EtlConfig> {
    let mut config = EtlConfig::default();
    if let Ok(url) = std::env::var("ETL_FEED_URL") {
        config.feed.url = url;
    }
    if let Ok(url) = std::env::var("ETL_REST_URL") {
        config.rest.base_url = url;
    }
    if let Ok(product) = std::env::var("ETL_PRODUCT") {
        config.feed.product = product;
    }
    if let Ok(enabled) = std::env::var("ETL_BROKER_ENABLED") {
        config.broker.enabled = enabled
            .parse()
            .context("ETL_BROKER_ENABLED must be true or false")?;
    }
    if let Ok(topic) = std::env::var("ETL_MATCH_TOPIC") {
        config.broker.match_topic = topic;
    }
    if let Ok(topic) = std::env::var("ETL_TICKER_TOPIC") {
        config.broker.ticker_topic = topic;
    }
    if let Ok(retries) = std::env::var("ETL_MAX_RETRIES") {
        config.retry.max_retries = retries.parse().context("ETL_MAX_RETRIES must be a number")?;
    }
    if let Ok(throttle) = std::env::var("ETL_RETRY_THROTTLE_MS") {
        let ms: u64 = throttle
            .parse()
            .context("ETL_RETRY_THROTTLE_MS must be a number of milliseconds")?;
        config.retry.throttle = Duration::from_millis(ms);
    }
    Ok(config)
}

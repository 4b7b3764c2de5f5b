use std::sync::Arc;

use relay_clients::{RelayConfigFile, TradeFeed, load_config, load_default_config};
use relay_stream::{Envelope, StreamError, StreamObserver};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Logs connection lifecycle events
struct LogObserver;

impl StreamObserver for LogObserver {
    fn on_connected(&self) {
        info!("trade feed session open");
    }

    fn on_disconnected(&self, reason: &StreamError) {
        warn!(%reason, "trade feed session closed");
    }

    fn on_error(&self, error: &StreamError) {
        error!(%error, "trade feed error");
    }
}

fn load(path: Option<String>) -> anyhow::Result<RelayConfigFile> {
    let config = match path {
        Some(path) => {
            info!(%path, "loading configuration");
            load_config(&path)?
        }
        None => load_default_config()?,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("relay=info".parse()?))
        .init();

    let config = load(std::env::args().nth(1))?;
    info!(url = %config.stream.url, wallets = config.stream.wallets.len(), "starting relay monitor");

    let feed = TradeFeed::new(config.stream.to_stream_config(), Arc::new(LogObserver))?;
    feed.on_trade(|trade| {
        info!(
            signature = %trade.signature,
            side = ?trade.side,
            token = %trade.token_address,
            value = %trade.value,
            "trade"
        );
    });
    feed.on_price_update(|update| {
        info!(token = %update.token_address, price = ?update.price, "price update");
    });
    feed.on_server_error(|envelope: &Envelope| {
        warn!(data = %envelope.data, "server reported an error");
    });

    for wallet in &config.stream.wallets {
        feed.follow_wallet(wallet)?;
    }
    feed.transport().connect()?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    feed.disconnect()?;

    // Let the close frame go out before the runtime stops
    let mut state = feed.transport().state_changes();
    let _ = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        state.wait_for(|s| !s.is_connected()),
    )
    .await;

    Ok(())
}

//! Custody rate monitor daemon
//!
//! Subscribes to the configured custody accounts and logs every derived
//! rate update until interrupted.

use anyhow::Result;
use custody_monitor::{Config, CustodyMonitor, SolanaLedgerClient};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    config.validate()?;

    info!("Connecting to RPC: {}", config.solana.rpc_url);

    let ledger = Arc::new(SolanaLedgerClient::new(
        config.solana.rpc_url.clone(),
        config.solana.ws_url.clone(),
        config.solana.commitment_config()?,
    ));
    let monitor = CustodyMonitor::new(ledger, config.custody.addresses()?);

    let _log_updates = monitor.on_rate_update(|asset, snapshot| {
        info!(
            asset = %asset,
            utilization = %snapshot.utilization,
            annual_rate = %snapshot.annual_rate,
            hourly_rate = %snapshot.hourly_rate,
            "rate update"
        );
    });

    monitor.start().await;
    info!("custody monitor running, ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    monitor.stop().await;

    Ok(())
}

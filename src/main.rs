use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Handle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use virtnet::api;
use virtnet::cli;
use virtnet::network::headless::{HeadlessProvisioner, LogTransport};
use virtnet::network::{Network, NetworkContext};
use virtnet::persistence::FileStateStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "virtnet=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse args and env vars
    let settings = cli::Cli::parse().into_settings();
    let socket_address = settings.socket_address().map_err(anyhow::Error::msg)?;

    let ctx = NetworkContext::new(
        settings.network.clone(),
        Arc::new(HeadlessProvisioner),
        Arc::new(LogTransport),
        Arc::new(FileStateStore::new(&settings.state_dir)?),
        Handle::current(),
    );

    let mut networks = BTreeMap::new();
    for id in &settings.networks {
        networks.insert(*id, Network::new_instance(ctx.clone(), *id)?);
    }
    let networks: api::SharedNetworks = Arc::new(networks);
    info!(
        "Node {} joined {} networks",
        settings.network.local_address,
        networks.len()
    );

    // Housekeeping
    let housekeeping = {
        let networks = networks.clone();
        let mut interval = tokio::time::interval(settings.clean_interval());
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                let networks = networks.clone();
                let cleaned = tokio::task::spawn_blocking(move || {
                    for network in networks.values() {
                        network.clean();
                        network.update_multicast_groups();
                    }
                })
                .await;
                if let Err(e) = cleaned {
                    error!("Housekeeping failed: {}", e);
                }
            }
        })
    };

    // Start server
    info!("Starting status API on {}", socket_address);
    axum::Server::bind(&socket_address)
        .serve(api::api(networks.clone()).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    housekeeping.abort();
    info!("Shutting down");
    // Last references go here; each network saves its state as it drops
    let _ = housekeeping.await;
    drop(networks);
    Ok(())
}

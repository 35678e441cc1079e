use std::net::IpAddr;

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::SharedNetworks;
use crate::error::{NetworkError, Result};
use crate::network::{Network, NetworkId, Status};

#[derive(Debug, Deserialize, Serialize)]
pub struct NetworkSummary {
    pub id: NetworkId,
    pub name: Option<String>,
    pub status: Status,
    pub mac: String,
    pub device: String,
    pub enabled: bool,
}

impl NetworkSummary {
    fn of(network: &Network) -> Self {
        Self {
            id: network.id(),
            name: network.config_opt().map(|c| c.name.clone()),
            status: network.status(),
            mac: network.mac().to_string(),
            device: network.tap_device_name(),
            enabled: network.enabled(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NetworkDetail {
    #[serde(flatten)]
    pub summary: NetworkSummary,
    pub controller: String,
    pub private: Option<bool>,
    pub config_timestamp: Option<u64>,
    pub last_config_update: u64,
    pub ips: Vec<IpAddr>,
    pub multicast_groups: Vec<String>,
}

#[instrument(skip(state), level = "debug")]
pub async fn list_networks(State(state): State<SharedNetworks>) -> axum::Json<Vec<NetworkSummary>> {
    axum::Json(
        state
            .values()
            .map(|network| NetworkSummary::of(network))
            .collect(),
    )
}

#[instrument(skip(state), level = "debug")]
pub async fn get_network(
    Path(nwid): Path<String>,
    State(state): State<SharedNetworks>,
) -> Result<axum::Json<NetworkDetail>> {
    let network = nwid
        .parse::<NetworkId>()
        .ok()
        .and_then(|id| state.get(&id))
        .ok_or(NetworkError::UnknownNetwork(nwid))?;
    let config = network.config_opt();
    Ok(axum::Json(NetworkDetail {
        summary: NetworkSummary::of(network),
        controller: network.controller().to_string(),
        private: config.as_ref().map(|c| c.private),
        config_timestamp: config.as_ref().map(|c| c.timestamp),
        last_config_update: network.last_config_update(),
        ips: network.ips().into_iter().collect(),
        multicast_groups: network
            .multicast_groups()
            .iter()
            .map(|g| g.to_string())
            .collect(),
    }))
}

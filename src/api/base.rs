use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::SharedNetworks;
use crate::network::{NetworkId, Status};
use crate::settings::{APP_NAME, APP_VERSION};

/// One-line node summary
pub async fn root(State(state): State<SharedNetworks>) -> String {
    let ok = state
        .values()
        .filter(|network| network.status() == Status::Ok)
        .count();
    format!(
        "{} {}: {} networks joined, {} configured",
        APP_NAME,
        APP_VERSION,
        state.len(),
        ok
    )
}

pub async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AboutResponse {
    pub name: String,
    pub version: String,
    pub networks: Vec<NetworkId>,
}

#[instrument(skip(state), level = "debug")]
pub async fn about(State(state): State<SharedNetworks>) -> axum::Json<AboutResponse> {
    axum::Json(AboutResponse {
        name: APP_NAME.to_string(),
        version: APP_VERSION.to_string(),
        networks: state.keys().copied().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_root_counts_joined_networks() {
        let line = root(State(SharedNetworks::default())).await;
        assert!(line.ends_with("0 networks joined, 0 configured"), "{line}");
    }

    #[tokio::test]
    async fn test_about_lists_networks() {
        let about = about(State(SharedNetworks::default())).await.0;
        assert_eq!(about.name, APP_NAME);
        assert!(about.networks.is_empty());
    }
}

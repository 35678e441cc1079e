mod base;
mod networks;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::Response, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub mod paths;

pub use networks::{NetworkDetail, NetworkSummary};

use crate::error::error_response;
use crate::network::{Network, NetworkId};

/// Every network this node has joined
pub type SharedNetworks = Arc<BTreeMap<NetworkId, Arc<Network>>>;

/// Read-only status API over the joined networks
pub fn api(networks: SharedNetworks) -> Router {
    Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        .route(paths::networks::LIST, routing::get(networks::list_networks))
        .route(paths::networks::DETAIL, routing::get(networks::get_network))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(networks)
}

/// Middleware failures get the same JSON shape as handler errors
async fn handle_error(error: BoxError) -> Response {
    if error.is::<tower::timeout::error::Elapsed>() {
        error_response(
            StatusCode::REQUEST_TIMEOUT,
            "timeout",
            "status query timed out".to_string(),
        )
    } else if error.is::<tower::load_shed::error::Overloaded>() {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "overloaded",
            "status API is busy".to_string(),
        )
    } else {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            error.to_string(),
        )
    }
}

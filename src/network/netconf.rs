//! Configuration state machine
//!
//! ```text
//! Initializing -> WaitingForFirstConfig -> Ok <-> AccessDenied | NotFound
//!      \-> InitializationFailed | NoMoreDevices   (terminal)
//! ```
//!
//! A sticky failure reported by the controller never discards a
//! configuration we already hold: traffic keeps flowing under the last good
//! configuration and `status()` keeps reporting `Ok` until a newer
//! configuration arrives.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::NetworkConfig;
use crate::error::TapError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Status {
    /// Creating the tap device and restoring state
    Initializing,
    /// Waiting for the first configuration from the controller
    WaitingForFirstConfig,
    Ok,
    /// Controller reported permission denied
    AccessDenied,
    /// Controller reported the network does not exist
    NotFound,
    /// Could not create the device (OS or installation problem)
    InitializationFailed,
    /// OS refused to create more devices
    NoMoreDevices,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Initializing => "INITIALIZING",
            Status::WaitingForFirstConfig => "WAITING_FOR_FIRST_AUTOCONF",
            Status::Ok => "OK",
            Status::AccessDenied => "ACCESS_DENIED",
            Status::NotFound => "NOT_FOUND",
            Status::InitializationFailed => "INITIALIZATION_FAILED",
            Status::NoMoreDevices => "NO_MORE_DEVICES",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure most recently reported by the network's controller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NetconfFailure {
    #[default]
    None,
    AccessDenied,
    NotFound,
}

/// Lifecycle of the tap device, as seen by status derivation
#[derive(Clone, Copy, Debug)]
pub enum TapState<'a> {
    Pending,
    Ready,
    Failed(&'a TapError),
}

/// Outcome of offering a configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adoption {
    /// Replaced the current configuration
    Accepted,
    /// Identical to the current configuration
    Unchanged,
    /// Issued before the current configuration
    Stale { current_timestamp: u64 },
}

#[derive(Clone, Debug, Default)]
pub struct ConfigState {
    config: Option<Arc<NetworkConfig>>,
    failure: NetconfFailure,
    /// Epoch ms when the current configuration was adopted, 0 if never
    last_update: u64,
}

impl ConfigState {
    pub fn config(&self) -> Option<&Arc<NetworkConfig>> {
        self.config.as_ref()
    }

    pub fn failure(&self) -> NetconfFailure {
        self.failure
    }

    pub fn last_update(&self) -> u64 {
        self.last_update
    }

    /// Offer a validated configuration.
    ///
    /// Configurations are ordered by their issue timestamp: a response
    /// issued before the one we hold is stale and never re-adopted. Any
    /// non-stale offer clears the failure reason.
    pub fn adopt(&mut self, config: NetworkConfig, now: u64) -> Adoption {
        if let Some(current) = &self.config {
            if config.timestamp < current.timestamp {
                return Adoption::Stale {
                    current_timestamp: current.timestamp,
                };
            }
            if **current == config {
                self.failure = NetconfFailure::None;
                self.last_update = now;
                return Adoption::Unchanged;
            }
        }
        self.config = Some(Arc::new(config));
        self.failure = NetconfFailure::None;
        self.last_update = now;
        Adoption::Accepted
    }

    /// Record a controller failure; the current configuration is kept.
    pub fn fail(&mut self, failure: NetconfFailure) {
        self.failure = failure;
    }

    pub fn status(&self, tap: TapState<'_>) -> Status {
        match tap {
            TapState::Failed(TapError::NoMoreDevices) => Status::NoMoreDevices,
            TapState::Failed(TapError::InitializationFailed(_)) => Status::InitializationFailed,
            TapState::Pending => Status::Initializing,
            TapState::Ready if self.config.is_some() => Status::Ok,
            TapState::Ready => match self.failure {
                NetconfFailure::None => Status::WaitingForFirstConfig,
                NetconfFailure::AccessDenied => Status::AccessDenied,
                NetconfFailure::NotFound => Status::NotFound,
            },
        }
    }
}

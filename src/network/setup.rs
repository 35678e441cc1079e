//! Asynchronous tap provisioning
//!
//! The tap handle is published exactly once through a `OnceLock`, so a
//! reader that sees it also sees a fully constructed device. Readers clone
//! the `Arc` before using it, which keeps the device alive for any call
//! already in flight when the network is torn down.
use std::sync::{Arc, OnceLock};

use tracing::{error, info};

use super::netconf::TapState;
use super::traits::{Tap, TapProvisioner};
use super::{Mac, NetworkId};
use crate::error::TapError;

#[derive(Default)]
pub(crate) struct TapSlot {
    tap: OnceLock<Arc<dyn Tap>>,
    failure: OnceLock<TapError>,
}

impl TapSlot {
    pub(crate) fn get(&self) -> Option<&Arc<dyn Tap>> {
        self.tap.get()
    }

    pub(crate) fn state(&self) -> TapState<'_> {
        if let Some(err) = self.failure.get() {
            TapState::Failed(err)
        } else if self.tap.get().is_some() {
            TapState::Ready
        } else {
            TapState::Pending
        }
    }

    /// Returns false if a device was already published
    pub(crate) fn publish(&self, tap: Arc<dyn Tap>) -> bool {
        self.tap.set(tap).is_ok()
    }

    pub(crate) fn fail(&self, err: TapError) {
        let _ = self.failure.set(err);
    }
}

impl std::fmt::Debug for TapSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TapSlot")
            .field("device", &self.tap.get().map(|t| t.device_name()))
            .field("failure", &self.failure.get())
            .finish()
    }
}

/// Create the device for `network_id`. Blocking; runs on the setup worker.
///
/// Failures are recorded on `slot` and are terminal. A created device is
/// handed back unpublished so the caller can restore state first.
pub(crate) fn provision(
    provisioner: &dyn TapProvisioner,
    network_id: NetworkId,
    mac: Mac,
    slot: &TapSlot,
) -> Option<Arc<dyn Tap>> {
    match provisioner.create(network_id, mac) {
        Ok(tap) => {
            info!(
                "[{}] Created device {} with MAC {}",
                network_id,
                tap.device_name(),
                mac
            );
            Some(tap)
        }
        Err(e) => {
            error!("[{}] Unable to create device: {}", network_id, e);
            slot.fail(e);
            None
        }
    }
}

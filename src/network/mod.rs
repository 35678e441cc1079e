//! A virtual LAN
//!
//! Networks are public or private. Each network id carries, in its top 40
//! bits, the address of the node that issues its configuration; the bottom
//! 24 bits are up to that controller.
//!
//! Public networks do not track membership and anyone may talk on them. On
//! private networks every peer must present a certificate of membership that
//! agrees with ours, and we push ours to the peers we talk to.
//!
//! All mutable state sits behind one mutex. The tap handle and the enabled
//! flag are read on the packet path without taking it.
use std::collections::BTreeSet;
use std::future::Future;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

pub mod bridge;
pub mod config;
pub mod headless;
pub mod membership;
pub mod netconf;
pub mod network_id;
mod setup;
pub mod traits;

pub use bridge::BridgeTable;
pub use config::{MulticastRate, NetworkConfig};
pub use membership::MembershipStore;
pub use netconf::{NetconfFailure, Status};
pub use network_id::{Address, Mac, MulticastGroup, NetworkId};
pub use traits::{ConfigTransport, StateStore, Tap, TapProvisioner};

use crate::certificate::{CertificateComparator, MembershipCertificate, QualifierComparator};
use crate::error::{NetworkError, Result};
use crate::limiters::MulticastLimiter;
use crate::persistence::PersistedState;
use crate::settings::NetworkSettings;
use netconf::{Adoption, ConfigState};
use setup::TapSlot;

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Everything a network needs from the node that owns it
#[derive(Clone)]
pub struct NetworkContext {
    pub settings: NetworkSettings,
    pub provisioner: Arc<dyn TapProvisioner>,
    pub transport: Arc<dyn ConfigTransport>,
    pub store: Arc<dyn StateStore>,
    pub comparator: Arc<dyn CertificateComparator>,
    /// Runtime that carries outbound transport calls
    pub runtime: Handle,
}

impl NetworkContext {
    pub fn new(
        settings: NetworkSettings,
        provisioner: Arc<dyn TapProvisioner>,
        transport: Arc<dyn ConfigTransport>,
        store: Arc<dyn StateStore>,
        runtime: Handle,
    ) -> Self {
        Self {
            settings,
            provisioner,
            transport,
            store,
            comparator: Arc::new(QualifierComparator),
            runtime,
        }
    }

    pub fn with_comparator(mut self, comparator: Arc<dyn CertificateComparator>) -> Self {
        self.comparator = comparator;
        self
    }
}

impl std::fmt::Debug for NetworkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkContext")
            .field("settings", &self.settings)
            .finish()
    }
}

#[derive(Debug)]
struct NetworkState {
    netconf: ConfigState,
    membership: MembershipStore,
    multicast: MulticastLimiter,
    bridges: BridgeTable,
    multicast_groups: BTreeSet<MulticastGroup>,
    /// Saved state has been loaded; until then we must not overwrite it
    restored: bool,
}

impl NetworkState {
    fn snapshot(&self) -> PersistedState {
        PersistedState {
            config: self.netconf.config().map(|c| NetworkConfig::clone(c)),
            certificates: self.membership.certificates().cloned().collect(),
        }
    }
}

pub struct Network {
    id: NetworkId,
    mac: Mac,
    ctx: NetworkContext,
    tap: TapSlot,
    enabled: AtomicBool,
    destroy_on_delete: AtomicBool,
    state: Mutex<NetworkState>,
    setup_worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("id", &self.id)
            .field("mac", &self.mac)
            .field("tap", &self.tap)
            .field("enabled", &self.enabled())
            .finish()
    }
}

impl Network {
    /// Join `id`: start creating its device on a dedicated worker and
    /// restore any saved state once the device exists.
    ///
    /// A network without saved state gets an empty record so it is
    /// remembered across restarts.
    pub fn new_instance(ctx: NetworkContext, id: NetworkId) -> Result<Arc<Network>> {
        if ctx.store.load(id)?.is_none() {
            ctx.store.save(id, &PersistedState::default().to_bytes()?)?;
        }
        let network = Arc::new(Network {
            id,
            mac: Mac::from_address(ctx.settings.local_address, id),
            state: Mutex::new(NetworkState {
                netconf: ConfigState::default(),
                membership: MembershipStore::new(id, ctx.settings.certificate_push_interval_ms),
                multicast: MulticastLimiter::new(),
                bridges: BridgeTable::new(),
                multicast_groups: BTreeSet::new(),
                restored: false,
            }),
            ctx,
            tap: TapSlot::default(),
            enabled: AtomicBool::new(true),
            destroy_on_delete: AtomicBool::new(false),
            setup_worker: Mutex::new(None),
        });

        let worker = thread::Builder::new()
            .name(format!("tap-setup-{}", id))
            .spawn({
                let network = network.clone();
                move || network.setup_main()
            })?;
        *network
            .setup_worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(worker);

        info!(
            "[{}] Joining network (controller {}, MAC {})",
            id,
            id.controller(),
            network.mac
        );
        Ok(network)
    }

    /// Setup worker body: create the device, restore, publish, then ask the
    /// controller for a fresh configuration.
    fn setup_main(self: Arc<Self>) {
        let Some(tap) = setup::provision(
            self.ctx.provisioner.as_ref(),
            self.id,
            self.mac,
            &self.tap,
        ) else {
            return;
        };
        self.restore_state();
        self.tap.publish(tap.clone());
        tap.set_enabled(self.enabled());
        self.request_configuration();
    }

    fn restore_state(&self) {
        let loaded = self
            .ctx
            .store
            .load(self.id)
            .and_then(|blob| blob.map(|b| PersistedState::from_bytes(&b)).transpose());
        let persisted = match loaded {
            Ok(persisted) => persisted.unwrap_or_default(),
            Err(e) => {
                warn!("[{}] Unable to restore saved state: {}", self.id, e);
                PersistedState::default()
            }
        };
        let certificates = persisted.certificates.len();
        if let Some(config) = persisted.config {
            self.apply_configuration(config, false);
        }
        let mut state = self.lock_state();
        for cert in persisted.certificates {
            state.membership.add(cert, self.ctx.comparator.as_ref());
        }
        state.restored = true;
        debug!(
            "[{}] Restored state ({} certificates)",
            self.id, certificates
        );
    }

    fn lock_state(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, snapshot: PersistedState) {
        let saved = snapshot
            .to_bytes()
            .and_then(|bytes| self.ctx.store.save(self.id, &bytes));
        if let Err(e) = saved {
            error!("[{}] Unable to save state: {}", self.id, e);
        }
    }

    /// Run a transport call on the runtime; failures only get logged.
    fn dispatch<F>(&self, what: &'static str, call: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = self.id;
        self.ctx.runtime.spawn(async move {
            if let Err(e) = call.await {
                debug!("[{}] {} failed: {}", id, what, e);
            }
        });
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    /// Address of the node that issues this network's configuration
    pub fn controller(&self) -> Address {
        self.id.controller()
    }

    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    /// Our Ethernet address on this network
    pub fn mac(&self) -> Mac {
        self.mac
    }

    pub fn status(&self) -> Status {
        let tap = self.tap.state();
        self.lock_state().netconf.status(tap)
    }

    pub fn status_string(status: Status) -> &'static str {
        status.as_str()
    }

    /// Adopt a configuration received from the controller.
    ///
    /// Refused while the device is still being created, when the
    /// configuration is malformed, or when it was issued before the one we
    /// already hold. Acceptance clears any controller failure.
    pub fn set_configuration(&self, config: NetworkConfig, persist: bool) -> bool {
        if self.tap.get().is_none() {
            debug!(
                "[{}] Ignoring configuration while {}",
                self.id,
                self.status()
            );
            return false;
        }
        self.apply_configuration(config, persist)
    }

    fn apply_configuration(&self, config: NetworkConfig, persist: bool) -> bool {
        if let Err(e) = config.validate(self.id) {
            warn!("[{}] Rejected configuration: {}", self.id, e);
            return false;
        }
        let timestamp = config.timestamp;
        let snapshot = {
            let mut state = self.lock_state();
            match state.netconf.adopt(config, now_ms()) {
                Adoption::Accepted => {
                    info!(
                        "[{}] Adopted configuration issued at {}",
                        self.id, timestamp
                    );
                }
                Adoption::Unchanged => return true,
                Adoption::Stale { current_timestamp } => {
                    debug!(
                        "[{}] Ignoring stale configuration issued at {} (have {})",
                        self.id, timestamp, current_timestamp
                    );
                    return false;
                }
            }
            persist.then(|| state.snapshot())
        };
        if let Some(snapshot) = snapshot {
            self.persist(snapshot);
        }
        true
    }

    /// Controller says we may not join. Any configuration we hold stays in use.
    pub fn set_access_denied(&self) {
        warn!("[{}] Controller denied access", self.id);
        self.lock_state().netconf.fail(NetconfFailure::AccessDenied);
    }

    /// Controller does not know this network. Any configuration we hold
    /// stays in use.
    pub fn set_not_found(&self) {
        warn!("[{}] Controller reports network not found", self.id);
        self.lock_state().netconf.fail(NetconfFailure::NotFound);
    }

    /// Ask the controller for a fresh configuration. Returns immediately;
    /// the answer arrives later through `set_configuration` or one of the
    /// failure setters.
    pub fn request_configuration(&self) {
        let controller = self.controller();
        debug!(
            "[{}] Requesting configuration from {}",
            self.id, controller
        );
        let transport = self.ctx.transport.clone();
        let id = self.id;
        self.dispatch("configuration request", async move {
            transport.request_config(id, controller).await
        });
    }

    /// Current configuration; an error if none has been adopted yet.
    /// Check `status()` first.
    pub fn config(&self) -> Result<Arc<NetworkConfig>> {
        self.config_opt()
            .ok_or(NetworkError::NoConfiguration(self.id))
    }

    pub fn config_opt(&self) -> Option<Arc<NetworkConfig>> {
        self.lock_state().netconf.config().cloned()
    }

    /// Epoch ms when the current configuration was adopted, 0 if never
    pub fn last_config_update(&self) -> u64 {
        self.lock_state().netconf.last_update()
    }

    /// File a peer's certificate. Signatures must already be checked.
    /// Certificates not newer than the one on file are ignored.
    pub fn add_membership_certificate(&self, cert: MembershipCertificate) {
        let mut state = self.lock_state();
        if state.membership.add(cert, self.ctx.comparator.as_ref()) {
            debug!(
                "[{}] Stored membership certificate ({} on file)",
                self.id,
                state.membership.len()
            );
        }
    }

    pub fn membership_certificate(&self, peer: Address) -> Option<MembershipCertificate> {
        self.lock_state().membership.get(&peer).cloned()
    }

    /// Send our certificate to `peer` unless we did so recently.
    ///
    /// Nothing is sent on public networks or without a certificate of our
    /// own. Returns whether a push was dispatched.
    pub fn push_membership_certificate(&self, peer: Address, force: bool, now: u64) -> bool {
        let certificate = {
            let mut guard = self.lock_state();
            let NetworkState {
                netconf,
                membership,
                ..
            } = &mut *guard;
            let Some(config) = netconf.config() else {
                return false;
            };
            let Some(com) = config.com().filter(|_| !config.is_public()) else {
                return false;
            };
            if !membership.should_push(peer, force, now) {
                return false;
            }
            com.clone()
        };
        debug!("[{}] Pushing membership certificate to {}", self.id, peer);
        let transport = self.ctx.transport.clone();
        let id = self.id;
        self.dispatch("certificate push", async move {
            transport.push_certificate(id, peer, certificate).await
        });
        true
    }

    /// May `peer` talk on this network? Always false without a configuration.
    pub fn is_allowed(&self, peer: Address) -> bool {
        let state = self.lock_state();
        let Some(config) = state.netconf.config() else {
            return false;
        };
        if config.is_public() {
            return true;
        }
        config.com().is_some_and(|local| {
            state
                .membership
                .is_member(&peer, local, self.ctx.comparator.as_ref())
        })
    }

    /// Charge `bytes` of multicast from `sender` to `group` against its
    /// budget; returns whether the packet may go out. Always false without
    /// a configuration.
    pub fn check_and_deduct_multicast(
        &self,
        sender: Address,
        group: &MulticastGroup,
        bytes: u32,
    ) -> bool {
        self.check_and_deduct_multicast_at(sender, group, bytes, Utc::now().timestamp_millis())
    }

    pub fn check_and_deduct_multicast_at(
        &self,
        sender: Address,
        group: &MulticastGroup,
        bytes: u32,
        now_ms: i64,
    ) -> bool {
        let mut guard = self.lock_state();
        let NetworkState {
            netconf, multicast, ..
        } = &mut *guard;
        let Some(config) = netconf.config() else {
            return false;
        };
        multicast.check_and_deduct(sender, group, bytes, now_ms, || {
            config.multicast_rate(group)
        })
    }

    /// Remaining multicast budget for (sender, group), if an account exists
    pub fn multicast_balance(&self, sender: Address, group: &MulticastGroup) -> Option<u32> {
        self.lock_state()
            .multicast
            .account(sender, group)
            .map(|a| a.balance())
    }

    /// False without a configuration
    pub fn permits_bridging(&self, peer: Address) -> bool {
        self.lock_state()
            .netconf
            .config()
            .is_some_and(|c| c.permits_bridging(peer))
    }

    pub fn learn_bridge_route(&self, mac: Mac, peer: Address) {
        self.lock_state().bridges.learn_route(mac, peer);
    }

    /// Peer behind which `mac` lives. May be our own address.
    pub fn find_bridge_to(&self, mac: &Mac) -> Option<Address> {
        self.lock_state().bridges.find_route(mac)
    }

    pub fn learn_bridged_multicast_group(&self, group: MulticastGroup) {
        self.lock_state()
            .bridges
            .learn_multicast_group(group, now_ms());
    }

    /// Rebuild our multicast subscriptions from the device, bridged groups
    /// and broadcast. Returns whether the set changed.
    pub fn update_multicast_groups(&self) -> bool {
        let mut groups = self
            .tap
            .get()
            .map(|tap| tap.scan_multicast_groups())
            .unwrap_or_default();
        groups.insert(MulticastGroup::BROADCAST);
        let mut state = self.lock_state();
        groups.extend(state.bridges.multicast_groups().copied());
        if groups == state.multicast_groups {
            return false;
        }
        state.multicast_groups = groups;
        true
    }

    pub fn multicast_groups(&self) -> BTreeSet<MulticastGroup> {
        self.lock_state().multicast_groups.clone()
    }

    /// Periodic housekeeping: expire bridged multicast groups, stale push
    /// times and refilled multicast accounts, drop bridge routes and
    /// certificates the configuration no longer sanctions, then save state.
    pub fn clean(&self) {
        let now = now_ms();
        let cutoff = now.saturating_sub(self.ctx.settings.bridged_multicast_retention_ms);
        let snapshot = {
            let mut guard = self.lock_state();
            let NetworkState {
                netconf,
                membership,
                multicast,
                bridges,
                restored,
                ..
            } = &mut *guard;
            let restored = *restored;
            let mut routes = 0;
            let mut certificates = 0;
            if let Some(config) = netconf.config() {
                let local = self.ctx.settings.local_address;
                routes =
                    bridges.prune_routes(|peer| peer == local || config.permits_bridging(peer));
                if let (false, Some(local)) = (config.is_public(), config.com()) {
                    certificates =
                        membership.prune_incompatible(local, self.ctx.comparator.as_ref());
                }
            }
            let groups = bridges.prune_multicast_groups(cutoff);
            let pushes = membership.prune_push_times(now);
            let accounts = multicast.prune_full(now as i64);
            if routes + certificates + groups + pushes + accounts > 0 {
                debug!(
                    "[{}] Cleaned {} bridge routes, {} certificates, {} bridged groups, {} push times, {} multicast accounts",
                    self.id, routes, certificates, groups, pushes, accounts
                );
            }
            restored.then(|| guard.snapshot())
        };
        if let Some(snapshot) = snapshot {
            self.persist(snapshot);
        }
    }

    /// Inject a frame into the device, if it exists and traffic is enabled
    pub fn put(&self, from: Mac, to: Mac, ether_type: u16, data: &[u8]) {
        if !self.enabled() {
            return;
        }
        if let Some(tap) = self.tap.get() {
            tap.put(from, to, ether_type, data);
        }
    }

    /// Empty while the device is being created
    pub fn tap_device_name(&self) -> String {
        self.tap
            .get()
            .map(|tap| tap.device_name())
            .unwrap_or_default()
    }

    /// Empty while the device is being created
    pub fn ips(&self) -> BTreeSet<IpAddr> {
        self.tap.get().map(|tap| tap.ips()).unwrap_or_default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if let Some(tap) = self.tap.get() {
            tap.set_enabled(enabled);
        }
    }

    /// Erase saved state instead of writing it when this network is dropped
    pub fn destroy_on_delete(&self) {
        self.destroy_on_delete.store(true, Ordering::Release);
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        let worker = self
            .setup_worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            // the worker holds a reference while it runs, so it may be the
            // one dropping us
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                warn!("[{}] Setup worker panicked", self.id);
            }
        }
        if let Some(tap) = self.tap.get() {
            tap.set_enabled(false);
        }

        if self.destroy_on_delete.load(Ordering::Acquire) {
            match self.ctx.store.erase(self.id) {
                Ok(()) => info!("[{}] Left network and erased saved state", self.id),
                Err(e) => error!("[{}] Unable to erase saved state: {}", self.id, e),
            }
            return;
        }
        let snapshot = {
            let state = self
                .state
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner);
            state.restored.then(|| state.snapshot())
        };
        if let Some(snapshot) = snapshot {
            self.persist(snapshot);
        }
    }
}

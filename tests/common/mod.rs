#![allow(dead_code)]
//! Fake collaborators shared by the integration tests
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use virtnet::certificate::MembershipCertificate;
use virtnet::error::{Result, TapError};
use virtnet::network::{
    Address, ConfigTransport, Mac, MulticastGroup, MulticastRate, Network, NetworkConfig,
    NetworkContext, NetworkId, Status, Tap, TapProvisioner,
};
use virtnet::persistence::MemoryStateStore;
use virtnet::settings::NetworkSettings;

pub const LOCAL: Address = Address::new(0x89e92ceee5);
pub const PEER: Address = Address::new(0x1122334455);
pub const OTHER_PEER: Address = Address::new(0x66778899aa);
pub const NWID: NetworkId = NetworkId::new(0x8056c2e21c000001);
/// Certificate timestamp agreement window
pub const WINDOW: u64 = 60_000;
pub const PUSH_INTERVAL_MS: u64 = 20_000;

pub fn cert(peer: Address, ts: u64) -> MembershipCertificate {
    MembershipCertificate::new(ts, WINDOW, NWID, peer)
}

pub fn public_config(ts: u64) -> NetworkConfig {
    NetworkConfig {
        network_id: NWID,
        timestamp: ts,
        issued_to: LOCAL,
        name: "lab".to_string(),
        description: String::new(),
        private: false,
        certificate_of_membership: None,
        allow_passive_bridging: false,
        active_bridges: BTreeSet::new(),
        multicast_rates: BTreeMap::new(),
        default_multicast_rate: MulticastRate::default(),
    }
}

pub fn private_config(ts: u64) -> NetworkConfig {
    NetworkConfig {
        private: true,
        certificate_of_membership: Some(cert(LOCAL, ts)),
        ..public_config(ts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub from: Mac,
    pub to: Mac,
    pub ether_type: u16,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct FakeTap {
    frames: Mutex<Vec<Frame>>,
    enabled: AtomicBool,
    groups: Mutex<BTreeSet<MulticastGroup>>,
    ips: Mutex<BTreeSet<IpAddr>>,
}

impl FakeTap {
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self, group: MulticastGroup) {
        self.groups.lock().unwrap().insert(group);
    }

    pub fn assign_ip(&self, ip: IpAddr) {
        self.ips.lock().unwrap().insert(ip);
    }
}

impl Tap for FakeTap {
    fn put(&self, from: Mac, to: Mac, ether_type: u16, data: &[u8]) {
        self.frames.lock().unwrap().push(Frame {
            from,
            to,
            ether_type,
            data: data.to_vec(),
        });
    }

    fn ips(&self) -> BTreeSet<IpAddr> {
        self.ips.lock().unwrap().clone()
    }

    fn device_name(&self) -> String {
        "vtest0".to_string()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn scan_multicast_groups(&self) -> BTreeSet<MulticastGroup> {
        self.groups.lock().unwrap().clone()
    }
}

enum Provision {
    Succeed,
    Fail(TapError),
    /// Blocks until the paired sender fires or is dropped
    Gated(Mutex<mpsc::Receiver<()>>),
}

pub struct FakeProvisioner {
    mode: Provision,
    created: Mutex<Option<Arc<FakeTap>>>,
}

impl FakeProvisioner {
    fn with_mode(mode: Provision) -> Arc<Self> {
        Arc::new(Self {
            mode,
            created: Mutex::new(None),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::with_mode(Provision::Succeed)
    }

    pub fn failing(err: TapError) -> Arc<Self> {
        Self::with_mode(Provision::Fail(err))
    }

    pub fn gated() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (Self::with_mode(Provision::Gated(Mutex::new(rx))), tx)
    }

    /// The device handed out, once created
    pub fn tap(&self) -> Option<Arc<FakeTap>> {
        self.created.lock().unwrap().clone()
    }
}

impl TapProvisioner for FakeProvisioner {
    fn create(&self, _network_id: NetworkId, _mac: Mac) -> std::result::Result<Arc<dyn Tap>, TapError> {
        match &self.mode {
            Provision::Succeed => {}
            Provision::Fail(err) => return Err(err.clone()),
            Provision::Gated(gate) => {
                let _ = gate.lock().unwrap().recv();
            }
        }
        let tap = Arc::new(FakeTap::default());
        *self.created.lock().unwrap() = Some(tap.clone());
        Ok(tap)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    RequestConfig {
        network_id: NetworkId,
        controller: Address,
    },
    PushCertificate {
        network_id: NetworkId,
        peer: Address,
        certificate: MembershipCertificate,
    },
}

pub struct RecordingTransport {
    calls: UnboundedSender<TransportCall>,
}

#[async_trait]
impl ConfigTransport for RecordingTransport {
    async fn request_config(&self, network_id: NetworkId, controller: Address) -> Result<()> {
        let _ = self.calls.send(TransportCall::RequestConfig {
            network_id,
            controller,
        });
        Ok(())
    }

    async fn push_certificate(
        &self,
        network_id: NetworkId,
        peer: Address,
        certificate: MembershipCertificate,
    ) -> Result<()> {
        let _ = self.calls.send(TransportCall::PushCertificate {
            network_id,
            peer,
            certificate,
        });
        Ok(())
    }
}

pub struct Harness {
    pub ctx: NetworkContext,
    pub store: Arc<MemoryStateStore>,
    pub provisioner: Arc<FakeProvisioner>,
    pub calls: UnboundedReceiver<TransportCall>,
}

impl Harness {
    /// Must be called from within a tokio runtime
    pub fn new() -> Self {
        Self::with(FakeProvisioner::ok(), Arc::new(MemoryStateStore::new()))
    }

    pub fn with(provisioner: Arc<FakeProvisioner>, store: Arc<MemoryStateStore>) -> Self {
        let (tx, calls) = unbounded_channel();
        let mut settings = NetworkSettings::new(LOCAL);
        settings.certificate_push_interval_ms = PUSH_INTERVAL_MS;
        let ctx = NetworkContext::new(
            settings,
            provisioner.clone(),
            Arc::new(RecordingTransport { calls: tx }),
            store.clone(),
            Handle::current(),
        );
        Self {
            ctx,
            store,
            provisioner,
            calls,
        }
    }

    /// Join the test network and wait for device setup to finish
    pub async fn join(&self) -> Arc<Network> {
        let network = Network::new_instance(self.ctx.clone(), NWID).unwrap();
        assert!(wait_for_setup(&network).await, "setup never finished");
        network
    }

    pub fn tap(&self) -> Arc<FakeTap> {
        self.provisioner.tap().expect("no device created")
    }

    pub async fn next_call(&mut self) -> Option<TransportCall> {
        tokio::time::timeout(Duration::from_secs(2), self.calls.recv())
            .await
            .ok()
            .flatten()
    }

    /// Let in-flight transport calls land, then collect them
    pub async fn drain_calls(&mut self) -> Vec<TransportCall> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut calls = vec![];
        while let Ok(call) = self.calls.try_recv() {
            calls.push(call);
        }
        calls
    }
}

pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

pub async fn wait_for_setup(network: &Network) -> bool {
    wait_until(|| network.status() != Status::Initializing).await
}

//! Scripted probes for driving the scanner without touching the network.
#![allow(dead_code)]

use async_trait::async_trait;
use netsweep::identity::{MacSource, NetBiosResolver, ReverseDns, VendorLookup};
use netsweep::models::{IdentityFragment, PingResult, PingStatus, PortState};
use netsweep::ping::Pinger;
use netsweep::scanner::{PortProbe, Probes};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

/// Sleeps for `delay` unless canceled first. Returns whether it slept in full.
async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = time::sleep(delay) => true,
    }
}

/// Answers ping for a fixed set of addresses after `delay`.
pub struct ScriptedPinger {
    pub up: HashSet<IpAddr>,
    pub delay: Duration,
}

#[async_trait]
impl Pinger for ScriptedPinger {
    async fn reach(&self, address: IpAddr, _: u32, cancel: &CancellationToken) -> PingResult {
        let mut result = PingResult::unknown(address);
        if !wait(self.delay, cancel).await {
            return result;
        }
        result.status = if self.up.contains(&address) {
            PingStatus::Success
        } else {
            PingStatus::TimedOut
        };
        result
    }
}

/// Opens a fixed set of (address, port) pairs and tracks how many probes run at once.
#[derive(Default)]
pub struct ScriptedPorts {
    pub open: HashSet<(IpAddr, u16)>,
    pub delay: Duration,
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PortProbe for ScriptedPorts {
    async fn probe(
        &self,
        address: IpAddr,
        port: u16,
        _: Duration,
        cancel: &CancellationToken,
    ) -> PortState {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let finished = wait(self.delay, cancel).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if finished && self.open.contains(&(address, port)) {
            PortState::Open
        } else {
            PortState::Closed
        }
    }
}

pub struct Silent;

#[async_trait]
impl NetBiosResolver for Silent {
    async fn resolve(&self, _: IpAddr, _: Duration, _: &CancellationToken) -> IdentityFragment {
        IdentityFragment::default()
    }
}

#[async_trait]
impl ReverseDns for Silent {
    async fn resolve_ptr(&self, _: IpAddr, _: &CancellationToken) -> Option<String> {
        None
    }
}

impl VendorLookup for Silent {
    fn vendor(&self, _: &str) -> Option<String> {
        None
    }
}

pub struct MacTable(pub HashMap<IpAddr, String>);

impl MacSource for MacTable {
    fn mac_address(&self, address: IpAddr) -> Option<String> {
        self.0.get(&address).cloned()
    }
}

pub fn probes(pinger: Arc<dyn Pinger>, ports: Arc<dyn PortProbe>) -> Probes {
    Probes {
        pinger,
        ports,
        netbios: Arc::new(Silent),
        dns: Arc::new(Silent),
        arp: Arc::new(MacTable(HashMap::new())),
        interfaces: Arc::new(MacTable(HashMap::new())),
        vendors: Arc::new(Silent),
    }
}

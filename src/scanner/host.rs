//! Everything the scanner learns about a single host.
use super::port::{PortProbe, PortRangeScanner, TcpConnector};
use crate::identity::{
    arp::ArpTable, dns::HickoryReverseDns, first_mac, first_name, interface::LocalInterfaces,
    netbios::UdpNetBiosResolver, oui::OuiVendors, MacSource, NetBiosResolver, ReverseDns,
    VendorLookup,
};
use crate::models::{HostRecord, HostTarget, IdentityFragment, ScanOptions};
use crate::ping::{reach_target, PingProbe, Pinger, DEFAULT_WAIT_TIME};
use hickory_resolver::TokioAsyncResolver;
use log::debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The collaborators a host probe talks to.
#[derive(Clone)]
pub struct Probes {
    pub pinger: Arc<dyn Pinger>,
    pub ports: Arc<dyn PortProbe>,
    pub netbios: Arc<dyn NetBiosResolver>,
    pub dns: Arc<dyn ReverseDns>,
    pub arp: Arc<dyn MacSource>,
    pub interfaces: Arc<dyn MacSource>,
    pub vendors: Arc<dyn VendorLookup>,
}

impl Probes {
    /// The real network-facing implementations. Takes a snapshot of the
    /// local interfaces, so build one per scan.
    pub fn system(options: &ScanOptions, resolver: TokioAsyncResolver) -> Self {
        let vendors: Arc<dyn VendorLookup> = Arc::new(OuiVendors);
        let pinger = PingProbe::new(
            DEFAULT_WAIT_TIME,
            options.icmp_timeout,
            options.icmp_ttl,
            options.icmp_dont_fragment,
        )
        .with_buffer_size(options.icmp_buffer_size);
        let interfaces = LocalInterfaces::snapshot();
        debug!("{} local interface addresses", interfaces.len());

        Self {
            pinger: Arc::new(pinger),
            ports: Arc::new(TcpConnector),
            netbios: Arc::new(UdpNetBiosResolver::new(Some(Arc::clone(&vendors)))),
            dns: Arc::new(HickoryReverseDns::new(resolver)),
            arp: Arc::new(ArpTable::default()),
            interfaces: Arc::new(interfaces),
            vendors,
        }
    }
}

/// Probes one host and merges the answers into a [`HostRecord`].
#[derive(Clone)]
pub struct HostProber {
    options: Arc<ScanOptions>,
    probes: Arc<Probes>,
    port_scanner: PortRangeScanner,
}

impl HostProber {
    pub fn new(options: Arc<ScanOptions>, probes: Arc<Probes>) -> Self {
        let port_scanner = PortRangeScanner::new(
            Arc::clone(&probes.ports),
            options.max_port_concurrency,
            options.port_scan_timeout,
            options.show_all_results,
        );
        Self {
            options,
            probes,
            port_scanner,
        }
    }

    /// Ping, port scan and NetBIOS run side by side; the merge waits for all three.
    ///
    /// Reverse DNS and MAC lookups only happen for hosts that will be
    /// reported. Cancellation yields an empty unreachable record, never an
    /// error.
    pub async fn probe(&self, target: HostTarget, cancel: &CancellationToken) -> HostRecord {
        let address = target.address;
        let options = &self.options;

        let ping = reach_target(
            self.probes.pinger.as_ref(),
            &target,
            options.icmp_attempts,
            cancel,
        );
        let ports = async {
            if options.port_scan_enabled {
                self.port_scanner.scan(address, &options.ports, cancel).await
            } else {
                Vec::new()
            }
        };
        let netbios = async {
            if options.netbios_enabled {
                self.probes
                    .netbios
                    .resolve(address, options.netbios_timeout, cancel)
                    .await
            } else {
                IdentityFragment::default()
            }
        };

        let (ping, ports, netbios) = tokio::join!(ping, ports, netbios);

        if cancel.is_cancelled() {
            return HostRecord::unreachable(target);
        }

        let is_any_port_open = ports.iter().any(|p| p.is_open());
        let is_reachable = ping.is_success() || is_any_port_open || netbios.is_reachable;

        let mut record = HostRecord {
            target,
            is_reachable,
            ping,
            hostname: String::new(),
            dns_hostname: None,
            is_any_port_open,
            ports,
            netbios,
            mac_address: None,
            vendor: None,
        };

        if !(is_reachable || options.show_all_results) {
            return record;
        }

        if options.resolve_hostname {
            record.dns_hostname = self.probes.dns.resolve_ptr(address, cancel).await;
        }
        record.hostname = first_name([
            record.dns_hostname.clone(),
            record.netbios.computer_name.clone(),
        ])
        .unwrap_or_default();

        // The ARP table is a file read, keep it off the async workers.
        let local_mac = if options.resolve_mac_address {
            let arp = Arc::clone(&self.probes.arp);
            let interfaces = Arc::clone(&self.probes.interfaces);
            tokio::task::spawn_blocking(move || {
                let sources: [&dyn MacSource; 2] = [arp.as_ref(), interfaces.as_ref()];
                first_mac(&sources, address)
            })
            .await
            .unwrap_or_else(|e| {
                debug!("MAC lookup for {address} failed: {e}");
                None
            })
        } else {
            None
        };
        match local_mac {
            Some(mac) => {
                record.vendor = self.probes.vendors.vendor(&mac);
                record.mac_address = Some(mac);
            }
            None if record.netbios.is_reachable => {
                record.mac_address.clone_from(&record.netbios.mac_address);
                record.vendor.clone_from(&record.netbios.vendor);
            }
            None => {}
        }

        if cancel.is_cancelled() {
            return HostRecord::unreachable(record.target);
        }

        record
    }
}

//! MAC addresses of this machine's own interfaces.
//!
//! The ARP table never lists the host's own addresses, so a scan that
//! includes them looks them up here instead.
use super::{normalize_mac, MacSource};
use log::debug;
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use std::collections::HashMap;
use std::net::IpAddr;

/// Interface addresses captured once, at the start of a scan.
#[derive(Debug, Clone, Default)]
pub struct LocalInterfaces {
    macs: HashMap<IpAddr, String>,
}

impl LocalInterfaces {
    pub fn snapshot() -> Self {
        match NetworkInterface::show() {
            Ok(interfaces) => Self::from_interfaces(&interfaces),
            Err(e) => {
                debug!("Could not enumerate network interfaces: {e}");
                Self::default()
            }
        }
    }

    fn from_interfaces(interfaces: &[NetworkInterface]) -> Self {
        let macs = interfaces
            .iter()
            .filter_map(|iface| {
                let mac = normalize_mac(iface.mac_addr.as_deref()?)?;
                Some(iface.addr.iter().map(move |addr| (addr.ip(), mac.clone())))
            })
            .flatten()
            .collect();

        Self { macs }
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (IpAddr, String)>) -> Self {
        Self {
            macs: pairs
                .into_iter()
                .filter_map(|(ip, mac)| Some((ip, normalize_mac(&mac)?)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.macs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macs.is_empty()
    }
}

impl MacSource for LocalInterfaces {
    fn mac_address(&self, address: IpAddr) -> Option<String> {
        self.macs.get(&address).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_normalized() {
        let local = LocalInterfaces::from_pairs([
            ("10.0.0.5".parse().unwrap(), "aa-bb-cc-dd-ee-ff".to_owned()),
            ("10.0.0.6".parse().unwrap(), "bogus".to_owned()),
        ]);

        assert_eq!(local.len(), 1);
        assert_eq!(
            local.mac_address("10.0.0.5".parse().unwrap()).as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
    }

    #[test]
    fn snapshot_does_not_panic() {
        let _ = LocalInterfaces::snapshot();
    }
}

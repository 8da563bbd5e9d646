//! Best-effort identity lookups: NetBIOS names, MAC addresses and vendors,
//! reverse DNS.
//!
//! Every lookup answers "unknown" rather than failing; the host prober only
//! ever sees an empty answer.
pub mod arp;
pub mod dns;
pub mod interface;
pub mod netbios;
pub mod oui;

use crate::models::IdentityFragment;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait NetBiosResolver: Send + Sync {
    async fn resolve(
        &self,
        address: IpAddr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> IdentityFragment;
}

#[async_trait]
pub trait ReverseDns: Send + Sync {
    /// The PTR name of `address`, without the trailing root dot.
    async fn resolve_ptr(&self, address: IpAddr, cancel: &CancellationToken) -> Option<String>;
}

/// A place a MAC address for an IP can be found without sending traffic.
pub trait MacSource: Send + Sync {
    fn mac_address(&self, address: IpAddr) -> Option<String>;
}

pub trait VendorLookup: Send + Sync {
    fn vendor(&self, mac_address: &str) -> Option<String>;
}

/// Brings a MAC address into `AA:BB:CC:DD:EE:FF` form.
///
/// Accepts `-`, `:` or `.` separators, or none at all. Returns `None` for
/// anything that is not 12 hex digits.
///
/// ```rust
/// # use netsweep::identity::normalize_mac;
/// assert_eq!(normalize_mac("00-1a-2B-3c-4d-5e").as_deref(), Some("00:1A:2B:3C:4D:5E"));
/// assert_eq!(normalize_mac("001a.2b3c.4d5e").as_deref(), Some("00:1A:2B:3C:4D:5E"));
/// assert_eq!(normalize_mac("not a mac"), None);
/// ```
pub fn normalize_mac(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ':' | '.'))
        .collect();

    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let digits = digits.to_ascii_uppercase();
    let pairs: Vec<&str> = (0..12).step_by(2).map(|i| &digits[i..i + 2]).collect();
    Some(pairs.join(":"))
}

/// Walks `sources` in order and returns the first MAC address any of them knows.
pub fn first_mac(sources: &[&dyn MacSource], address: IpAddr) -> Option<String> {
    sources
        .iter()
        .find_map(|source| source.mac_address(address))
        .filter(|mac| !mac.is_empty())
}

/// The first candidate that is present and not blank.
pub fn first_name<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_owned())
        .find(|name| !name.is_empty())
}

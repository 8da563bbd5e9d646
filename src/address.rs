//! Provides functions to parse host input: IP addresses, networks, ranges and hostnames.
//!
//! Every entry expands to a list of [`HostTarget`]s. Syntax problems are
//! errors; hostnames that do not resolve are handed back separately so the
//! caller can report them and scan the rest.
use crate::errors::{Result, ScanError};
use crate::models::HostTarget;
use cidr_utils::cidr::IpCidr;
use futures::stream::{self, StreamExt};
use hickory_resolver::TokioAsyncResolver;
use itertools::Itertools;
use log::debug;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio_util::sync::CancellationToken;

/// Largest number of addresses a single entry may expand to, as a power of two.
pub const MAX_EXPANSION_BITS: u32 = 20;

/// Hostname lookups in flight at once.
const LOOKUP_CONCURRENCY: usize = 10;

/// One entry of host input, after parsing and before any DNS lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostInput {
    /// `192.168.0.1` or `2001:db8::1`
    Address(IpAddr),
    /// `192.168.0.0/24` or `192.168.0.0/255.255.255.0`. Host bits are cleared.
    Network(IpCidr),
    /// `192.168.0.1-192.168.0.100`, both ends included.
    Range(Ipv4Addr, Ipv4Addr),
    /// `192.168.[0-1,5].[1-10]`, one sorted set of values per octet.
    Pattern([Vec<u8>; 4]),
    /// `example.com`
    Hostname(String),
    /// `example.com/24`, expanded around the hostname's IPv4 address.
    HostnameNetwork { hostname: String, prefix: u8 },
}

/// Splits user input such as `"10.0.0.1; example.com; 10.0.0.0/24"` into entries.
///
/// Whitespace is dropped entirely, so `10.0.0.1 - 10.0.0.9` is one entry.
///
/// ```rust
/// # use netsweep::address::create_list_from_input;
/// assert_eq!(
///     create_list_from_input(" 10.0.0.1; ;example.com "),
///     vec!["10.0.0.1".to_owned(), "example.com".to_owned()]
/// );
/// ```
pub fn create_list_from_input(hosts: &str) -> Vec<String> {
    hosts
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .split(';')
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Works out which form `input` is written in.
pub fn parse_host_input(input: &str) -> Result<HostInput> {
    let invalid = || ScanError::InvalidHostInput(input.to_owned());

    if let Ok(address) = input.parse::<IpAddr>() {
        return Ok(HostInput::Address(address));
    }

    if let Some((host, suffix)) = input.split_once('/') {
        if let Ok(address) = host.parse::<IpAddr>() {
            let prefix = parse_prefix(suffix, address.is_ipv4()).ok_or_else(invalid)?;
            check_size(input, host_bits(address, prefix))?;
            return network(address, prefix)
                .map(HostInput::Network)
                .ok_or_else(invalid);
        }
        if is_hostname(host) {
            let prefix = parse_prefix(suffix, true).ok_or_else(invalid)?;
            check_size(input, 32 - u32::from(prefix))?;
            return Ok(HostInput::HostnameNetwork {
                hostname: host.to_owned(),
                prefix,
            });
        }
        return Err(invalid());
    }

    if input.contains('[') {
        return parse_pattern(input);
    }

    if let Some((start, end)) = input.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.parse::<Ipv4Addr>(), end.parse::<Ipv4Addr>()) {
            if start > end {
                return Err(invalid());
            }
            let count = u128::from(u32::from(end) - u32::from(start)) + 1;
            if count > 1 << MAX_EXPANSION_BITS {
                return Err(too_large(input));
            }
            return Ok(HostInput::Range(start, end));
        }
    }

    if is_hostname(input) {
        return Ok(HostInput::Hostname(input.to_owned()));
    }

    Err(invalid())
}

impl HostInput {
    /// Every address this entry stands for, without touching DNS.
    ///
    /// Hostname forms expand to nothing; see [`resolve_hosts`].
    pub fn addresses(&self) -> Vec<IpAddr> {
        match self {
            Self::Address(address) => vec![*address],
            Self::Network(cidr) => cidr.iter().map(|c| c.address()).collect(),
            Self::Range(start, end) => (u32::from(*start)..=u32::from(*end))
                .map(|ip| IpAddr::V4(Ipv4Addr::from(ip)))
                .collect(),
            Self::Pattern(octets) => octets
                .iter()
                .multi_cartesian_product()
                .map(|o| IpAddr::V4(Ipv4Addr::new(*o[0], *o[1], *o[2], *o[3])))
                .collect(),
            Self::Hostname(_) | Self::HostnameNetwork { .. } => Vec::new(),
        }
    }
}

/// Expands and resolves every entry.
///
/// Returns the targets sorted by address, plus the hostnames that could not
/// be resolved. An entry that does not parse fails the whole call.
pub async fn resolve_hosts(
    inputs: &[String],
    resolver: &TokioAsyncResolver,
    prefer_ipv4: bool,
    cancel: &CancellationToken,
) -> Result<(Vec<HostTarget>, Vec<String>)> {
    let parsed = inputs
        .iter()
        .map(|input| parse_host_input(input))
        .collect::<Result<Vec<_>>>()?;

    let resolved = stream::iter(parsed)
        .map(|input| async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => Ok(Vec::new()),
                targets = expand(input, resolver, prefer_ipv4) => targets,
            }
        })
        .buffer_unordered(LOOKUP_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

    let mut targets = Vec::new();
    let mut unresolved = Vec::new();
    for entry in resolved {
        match entry {
            Ok(found) => targets.extend(found),
            Err(hostname) => unresolved.push(hostname),
        }
    }

    // Duplicates collapse onto the entry that carries a hostname.
    targets.sort_by_key(|target| (target.address, Reverse(target.hostname.is_some())));
    targets.dedup_by_key(|target| target.address);
    unresolved.sort();

    debug!("Resolved {} targets, {} unresolved", targets.len(), unresolved.len());
    Ok((targets, unresolved))
}

/// Turns one parsed entry into targets; `Err` carries the hostname that failed.
async fn expand(
    input: HostInput,
    resolver: &TokioAsyncResolver,
    prefer_ipv4: bool,
) -> std::result::Result<Vec<HostTarget>, String> {
    match input {
        HostInput::Hostname(hostname) => match lookup(resolver, &hostname, prefer_ipv4).await {
            Some(address) => Ok(vec![HostTarget::with_hostname(address, hostname)]),
            None => Err(hostname),
        },
        HostInput::HostnameNetwork { hostname, prefix } => {
            // Only IPv4 hosts can anchor a range.
            match lookup(resolver, &hostname, true).await {
                Some(address @ IpAddr::V4(_)) => Ok(network(address, prefix)
                    .map(|cidr| HostInput::Network(cidr).addresses())
                    .unwrap_or_default()
                    .into_iter()
                    .map(HostTarget::new)
                    .collect()),
                _ => Err(hostname),
            }
        }
        other => Ok(other.addresses().into_iter().map(HostTarget::new).collect()),
    }
}

/// A single address for `hostname`, picking the preferred family when both exist.
async fn lookup(resolver: &TokioAsyncResolver, hostname: &str, prefer_ipv4: bool) -> Option<IpAddr> {
    let addresses = match resolver.lookup_ip(hostname).await {
        Ok(lookup) => lookup.iter().collect_vec(),
        Err(e) => {
            debug!("Host {hostname:?} could not be resolved: {e}");
            return None;
        }
    };

    addresses
        .iter()
        .find(|address| address.is_ipv4() == prefer_ipv4)
        .or_else(|| addresses.first())
        .copied()
}

fn too_large(input: &str) -> ScanError {
    ScanError::RangeTooLarge {
        input: input.to_owned(),
        limit: 1 << MAX_EXPANSION_BITS,
    }
}

fn check_size(input: &str, host_bits: u32) -> Result<()> {
    if host_bits > MAX_EXPANSION_BITS {
        Err(too_large(input))
    } else {
        Ok(())
    }
}

fn host_bits(address: IpAddr, prefix: u8) -> u32 {
    let width = if address.is_ipv4() { 32 } else { 128 };
    width - u32::from(prefix)
}

/// Accepts `/24` style prefixes, and `/255.255.255.0` style masks for IPv4.
fn parse_prefix(suffix: &str, ipv4: bool) -> Option<u8> {
    let max = if ipv4 { 32 } else { 128 };
    if let Ok(prefix) = suffix.parse::<u8>() {
        return (prefix <= max).then_some(prefix);
    }
    if !ipv4 {
        return None;
    }

    let mask = u32::from(suffix.parse::<Ipv4Addr>().ok()?);
    let ones = mask.leading_ones();
    (ones + mask.trailing_zeros() >= 32)
        .then(|| u8::try_from(ones).ok())
        .flatten()
}

/// The network `address/prefix` belongs to, host bits cleared.
fn network(address: IpAddr, prefix: u8) -> Option<IpCidr> {
    let base = match address {
        IpAddr::V4(v4) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask))
        }
        IpAddr::V6(v6) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask))
        }
    };
    IpCidr::new(base, prefix).ok()
}

/// `192.168.[50-100,200].1`: four octets, each a number or a bracketed list.
fn parse_pattern(input: &str) -> Result<HostInput> {
    let invalid = || ScanError::InvalidHostInput(input.to_owned());

    let octets = input
        .split('.')
        .map(parse_octet)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(invalid)?;
    let octets: [Vec<u8>; 4] = octets.try_into().map_err(|_| invalid())?;

    let count: u128 = octets.iter().map(|o| o.len() as u128).product();
    if count > 1 << MAX_EXPANSION_BITS {
        return Err(too_large(input));
    }

    Ok(HostInput::Pattern(octets))
}

fn parse_octet(octet: &str) -> Option<Vec<u8>> {
    let Some(inner) = octet.strip_prefix('[').and_then(|o| o.strip_suffix(']')) else {
        return Some(vec![octet.parse().ok()?]);
    };

    let mut values = BTreeSet::new();
    for part in inner.split(',') {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (start.parse::<u8>().ok()?, end.parse::<u8>().ok()?);
                if start > end {
                    return None;
                }
                values.extend(start..=end);
            }
            None => {
                values.insert(part.parse::<u8>().ok()?);
            }
        }
    }
    Some(values.into_iter().collect())
}

/// RFC 1123 style names. At least one letter, so `300.10.1.1` is not a hostname.
fn is_hostname(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > 253 || !name.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

//! Data carried between the probes, the host prober and the scanner.
use crate::errors::{Result, ScanError};
use chrono::{DateTime, Local};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// A single address to scan, optionally with the hostname it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostTarget {
    pub address: IpAddr,
    pub hostname: Option<String>,
}

impl HostTarget {
    pub const fn new(address: IpAddr) -> Self {
        Self {
            address,
            hostname: None,
        }
    }

    pub fn with_hostname(address: IpAddr, hostname: impl Into<String>) -> Self {
        Self {
            address,
            hostname: Some(hostname.into()),
        }
    }
}

impl From<IpAddr> for HostTarget {
    fn from(address: IpAddr) -> Self {
        Self::new(address)
    }
}

/// Outcome of one ICMP echo attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingStatus {
    Success,
    TimedOut,
    TtlExpired,
    DestinationUnreachable,
    Unknown,
}

impl fmt::Display for PingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "Success",
            Self::TimedOut => "TimedOut",
            Self::TtlExpired => "TtlExpired",
            Self::DestinationUnreachable => "DestinationUnreachable",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// One ICMP echo attempt. Never mutated after the probe hands it out.
#[derive(Debug, Clone, PartialEq)]
pub struct PingResult {
    pub timestamp: DateTime<Local>,
    pub address: IpAddr,
    pub hostname: String,
    pub buffer_size: usize,
    /// Only meaningful when `status` is `Success` or `TtlExpired`.
    pub round_trip_time: Duration,
    pub ttl: u8,
    pub status: PingStatus,
}

impl PingResult {
    /// A result for an address that has not answered (yet).
    pub fn unknown(address: IpAddr) -> Self {
        Self {
            timestamp: Local::now(),
            address,
            hostname: String::new(),
            buffer_size: 0,
            round_trip_time: Duration::ZERO,
            ttl: 0,
            status: PingStatus::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PingStatus::Success
    }

    /// Formats the round trip time for display.
    ///
    /// Only replies carry a time; everything else renders as `-/-`. A
    /// sub-millisecond reply renders as `<1 ms` unless `disable_special_char`
    /// is set, for sinks that cannot carry a `<`.
    ///
    /// ```rust
    /// # use netsweep::models::{PingResult, PingStatus};
    /// # use std::time::Duration;
    /// let mut reply = PingResult::unknown("127.0.0.1".parse().unwrap());
    /// assert_eq!(reply.time_display(false), "-/-");
    /// reply.status = PingStatus::Success;
    /// assert_eq!(reply.time_display(false), "<1 ms");
    /// reply.round_trip_time = Duration::from_millis(12);
    /// assert_eq!(reply.time_display(false), "12 ms");
    /// ```
    pub fn time_display(&self, disable_special_char: bool) -> String {
        if !matches!(self.status, PingStatus::Success | PingStatus::TtlExpired) {
            return "-/-".to_owned();
        }

        let ms = self.round_trip_time.as_millis();
        if ms == 0 && !disable_special_char {
            "<1 ms".to_owned()
        } else {
            format!("{ms} ms")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortState {
    #[default]
    None,
    Open,
    Closed,
}

/// State of one port after a single connect attempt, plus its well-known service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortResult {
    pub port: u16,
    pub protocol: Protocol,
    pub service_name: String,
    pub description: String,
    pub state: PortState,
}

impl PortResult {
    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }
}

/// Whatever an identity resolver managed to learn about an address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFragment {
    pub computer_name: Option<String>,
    pub user_name: Option<String>,
    pub group_name: Option<String>,
    pub mac_address: Option<String>,
    pub vendor: Option<String>,
    pub dns_hostname: Option<String>,
    /// The resolver got an answer from the host.
    pub is_reachable: bool,
    pub error: Option<String>,
}

impl IdentityFragment {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// The merged view of one host. Built once, after every probe has finished.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRecord {
    pub target: HostTarget,
    pub is_reachable: bool,
    pub ping: PingResult,
    /// DNS name if one was found, otherwise the NetBIOS computer name, otherwise empty.
    pub hostname: String,
    pub dns_hostname: Option<String>,
    pub is_any_port_open: bool,
    /// Sorted ascending by port number.
    pub ports: Vec<PortResult>,
    pub netbios: IdentityFragment,
    pub mac_address: Option<String>,
    pub vendor: Option<String>,
}

impl HostRecord {
    /// An empty record for a host that gave no signal (or was never probed).
    pub fn unreachable(target: HostTarget) -> Self {
        let ping = PingResult::unknown(target.address);
        Self {
            target,
            is_reachable: false,
            ping,
            hostname: String::new(),
            dns_hostname: None,
            is_any_port_open: false,
            ports: Vec::new(),
            netbios: IdentityFragment::default(),
            mac_address: None,
            vendor: None,
        }
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &PortResult> {
        self.ports.iter().filter(|p| p.is_open())
    }
}

/// Snapshot of everything a scan needs to know. Fixed for the duration of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    pub max_host_concurrency: usize,
    /// Applies per host task, so up to `max_host_concurrency * max_port_concurrency`
    /// connects can be in flight.
    pub max_port_concurrency: usize,
    pub icmp_attempts: u32,
    pub icmp_timeout: Duration,
    pub icmp_buffer_size: usize,
    pub icmp_ttl: u8,
    pub icmp_dont_fragment: bool,
    pub port_scan_enabled: bool,
    pub ports: Vec<u16>,
    pub port_scan_timeout: Duration,
    pub netbios_enabled: bool,
    pub netbios_timeout: Duration,
    pub resolve_mac_address: bool,
    pub resolve_hostname: bool,
    pub show_all_results: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_host_concurrency: 256,
            max_port_concurrency: 5,
            icmp_attempts: 2,
            icmp_timeout: Duration::from_millis(4000),
            icmp_buffer_size: 32,
            icmp_ttl: 64,
            icmp_dont_fragment: true,
            port_scan_enabled: false,
            ports: vec![22, 53, 80, 139, 389, 443, 445, 636, 3389, 5900],
            port_scan_timeout: Duration::from_millis(4000),
            netbios_enabled: true,
            netbios_timeout: Duration::from_millis(4000),
            resolve_mac_address: true,
            resolve_hostname: true,
            show_all_results: false,
        }
    }
}

impl ScanOptions {
    /// Rejects option sets the scanner cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_host_concurrency == 0 {
            return Err(ScanError::InvalidOptions(
                "host concurrency must be at least 1".to_owned(),
            ));
        }
        if self.max_port_concurrency == 0 {
            return Err(ScanError::InvalidOptions(
                "port concurrency must be at least 1".to_owned(),
            ));
        }
        if self.icmp_timeout.is_zero() || self.port_scan_timeout.is_zero() || self.netbios_timeout.is_zero() {
            return Err(ScanError::InvalidOptions("timeouts must be non-zero".to_owned()));
        }
        if self.port_scan_enabled && self.ports.is_empty() {
            return Err(ScanError::InvalidOptions(
                "port scan enabled without any ports".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: PingStatus, ms: u64) -> PingResult {
        PingResult {
            status,
            round_trip_time: Duration::from_millis(ms),
            ..PingResult::unknown("10.0.0.1".parse().unwrap())
        }
    }

    #[test]
    fn time_display_follows_status() {
        assert_eq!(reply(PingStatus::Success, 0).time_display(false), "<1 ms");
        assert_eq!(reply(PingStatus::Success, 0).time_display(true), "0 ms");
        assert_eq!(reply(PingStatus::Success, 17).time_display(false), "17 ms");
        assert_eq!(reply(PingStatus::TtlExpired, 3).time_display(false), "3 ms");
        assert_eq!(reply(PingStatus::TimedOut, 3).time_display(false), "-/-");
        assert_eq!(reply(PingStatus::Unknown, 0).time_display(true), "-/-");
    }

    #[test]
    fn default_options_are_valid() {
        assert!(ScanOptions::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let options = ScanOptions {
            max_port_concurrency: 0,
            ..ScanOptions::default()
        };
        assert!(matches!(options.validate(), Err(ScanError::InvalidOptions(_))));
    }

    #[test]
    fn port_scan_without_ports_is_rejected() {
        let options = ScanOptions {
            port_scan_enabled: true,
            ports: vec![],
            ..ScanOptions::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn unreachable_record_is_empty() {
        let record = HostRecord::unreachable(HostTarget::new("10.0.0.9".parse().unwrap()));
        assert!(!record.is_reachable);
        assert!(record.ports.is_empty());
        assert!(record.hostname.is_empty());
        assert_eq!(record.ping.status, PingStatus::Unknown);
    }
}

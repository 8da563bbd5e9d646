//! Reads the kernel's neighbour table.
use super::{normalize_mac, MacSource};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const PROC_NET_ARP: &str = "/proc/net/arp";

/// How long a read of the table is reused before going back to the file.
const MAX_TABLE_AGE: Duration = Duration::from_secs(1);

const EMPTY_MAC: &str = "00:00:00:00:00:00";
const BROADCAST_MAC: &str = "FF:FF:FF:FF:FF:FF";

/// Parses the text table found in `/proc/net/arp`.
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         a0:b1:c2:d3:e4:f5     *        eth0
/// ```
///
/// Incomplete, all-zero and broadcast entries are dropped.
pub fn parse_arp_table(table: &str) -> HashMap<IpAddr, String> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let address = columns.next()?.parse::<IpAddr>().ok()?;
            let mac = normalize_mac(columns.nth(2)?)?;
            (mac != EMPTY_MAC && mac != BROADCAST_MAC).then_some((address, mac))
        })
        .collect()
}

type Entries = Arc<HashMap<IpAddr, String>>;

/// The system ARP table. One read serves every lookup for `max_age`, so
/// entries created by a scan's own probes show up shortly after.
#[derive(Debug)]
pub struct ArpTable {
    path: PathBuf,
    max_age: Duration,
    cached: Mutex<Option<(Instant, Entries)>>,
}

impl Default for ArpTable {
    fn default() -> Self {
        Self::from_path(PROC_NET_ARP)
    }
}

impl ArpTable {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: MAX_TABLE_AGE,
            cached: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn entries(&self) -> HashMap<IpAddr, String> {
        match fs::read_to_string(&self.path) {
            Ok(table) => parse_arp_table(&table),
            Err(e) => {
                debug!("Could not read ARP table {}: {e}", self.path.display());
                HashMap::new()
            }
        }
    }

    fn snapshot(&self) -> Entries {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((read_at, entries)) = cached.as_ref() {
            if read_at.elapsed() < self.max_age {
                return Arc::clone(entries);
            }
        }

        let entries = Arc::new(self.entries());
        *cached = Some((Instant::now(), Arc::clone(&entries)));
        entries
    }
}

impl MacSource for ArpTable {
    fn mac_address(&self, address: IpAddr) -> Option<String> {
        self.snapshot().get(&address).cloned()
    }
}

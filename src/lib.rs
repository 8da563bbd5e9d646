//! This crate exposes the internal functionality of the netsweep host scanner.
//!
//! netsweep sweeps a list of addresses and, for every host, runs an ICMP
//! echo, an optional TCP connect scan and a NetBIOS name query side by side.
//! Hosts that answer any of them are enriched with reverse DNS, MAC address
//! and vendor, then reported as they finish.
//!
//! ## Architecture Overview
//!
//! 1. **Input Processing**: [`address`] turns host input (IPs, CIDRs, ranges,
//!    octet patterns, hostnames) into [`HostTarget`](crate::models::HostTarget)s.
//! 2. **Host Probing**: [`HostProber`](crate::scanner::HostProber) fans out
//!    the probes of one host and merges their answers.
//! 3. **Orchestration**: [`Scanner`](crate::scanner::Scanner) bounds how many
//!    hosts run at once and reports [`ScanEvent`](crate::scanner::ScanEvent)s.
//!
//! Two limits apply independently: `max_host_concurrency` hosts at a time,
//! and `max_port_concurrency` ports at a time *within each host*. Up to
//! their product of connects can be in flight.
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use netsweep::identity::dns::build_resolver;
//! use netsweep::models::{HostTarget, ScanOptions};
//! use netsweep::scanner::{Probes, ScanEvent, Scanner};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let options = ScanOptions {
//!     port_scan_enabled: true,
//!     ..ScanOptions::default()
//! };
//! let probes = Probes::system(&options, build_resolver(None).await);
//! let scanner = Scanner::new(options, Arc::new(probes));
//!
//! let hosts = vec![HostTarget::new("192.168.1.1".parse().unwrap())];
//! let (_, mut events) = scanner.spawn(hosts, CancellationToken::new());
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         ScanEvent::HostScanned(record) => println!("{} is up", record.target.address),
//!         ScanEvent::Progress { completed, total } => println!("{completed}/{total}"),
//!         ScanEvent::Finished(outcome) => println!("{outcome:?}"),
//!     }
//! }
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Hosts that do not answer are not errors. Refused connects, ICMP timeouts
//! and malformed NetBIOS replies all fold into an unreachable result. Only
//! bad input and broken options surface as [`ScanError`](crate::errors::ScanError).
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod input;

pub mod scanner;

pub mod address;

pub mod errors;

pub mod identity;

pub mod models;

pub mod ping;

pub mod pool;

pub mod services;

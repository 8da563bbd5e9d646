//! ICMP echo probing.
//!
//! [`PingProbe`] has two modes. [`PingProbe::send`] is the interactive mode:
//! a fixed number of requests (or an endless run) separated by `wait_time`,
//! each reply handed to a callback. [`PingProbe::reach`] is what the host
//! scanner uses: stop at the first reply, never wait in between.
use crate::identity::ReverseDns;
use crate::models::{HostTarget, PingResult, PingStatus};
use crate::pool::Pool;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::debug;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence, SurgeError, ICMP};
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Consecutive transport failures after which a run gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Pause between requests of a [`PingProbe::send`] run.
pub const DEFAULT_WAIT_TIME: Duration = Duration::from_millis(1000);

/// Idle ICMP clients kept per address family.
const CLIENT_POOL_CAPACITY: usize = 16;

/// Anything that can tell whether an address answers ICMP echo.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Sends up to `attempts` requests and returns the first success, or the
    /// last attempt when nothing answered.
    async fn reach(&self, address: IpAddr, attempts: u32, cancel: &CancellationToken) -> PingResult;
}

/// How a [`PingProbe::send`] run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingEnd {
    Completed,
    Canceled,
    /// The transport gave no data at all several times in a row.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PingRun {
    pub results: Vec<PingResult>,
    pub end: PingEnd,
}

/// What a single echo request produced, before it becomes a [`PingResult`].
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Reply {
        source: IpAddr,
        round_trip_time: Duration,
        ttl: Option<u8>,
        size: usize,
    },
    TimedOut,
    /// No reply data at all, as opposed to an ICMP-level timeout.
    NoData(String),
}

/// The request was abandoned because the scan was canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canceled;

#[derive(Debug, Clone, Copy)]
pub struct EchoRequest {
    pub address: IpAddr,
    pub sequence: u16,
    pub timeout: Duration,
    pub ttl: u8,
    pub buffer_size: usize,
}

/// Sends a single ICMP echo request and waits for its answer.
#[async_trait]
pub trait EchoTransport: Send + Sync {
    async fn echo(&self, request: EchoRequest, cancel: &CancellationToken) -> Result<Attempt, Canceled>;
}

/// Echo requests over surge-ping, with ICMP clients pooled per address family.
pub struct IcmpTransport {
    v4_clients: Pool<Client>,
    v6_clients: Pool<Client>,
}

impl Default for IcmpTransport {
    fn default() -> Self {
        Self {
            v4_clients: Pool::new(CLIENT_POOL_CAPACITY),
            v6_clients: Pool::new(CLIENT_POOL_CAPACITY),
        }
    }
}

#[async_trait]
impl EchoTransport for IcmpTransport {
    async fn echo(&self, request: EchoRequest, cancel: &CancellationToken) -> Result<Attempt, Canceled> {
        let address = request.address;
        let (pool, kind) = match address {
            IpAddr::V4(_) => (&self.v4_clients, ICMP::V4),
            IpAddr::V6(_) => (&self.v6_clients, ICMP::V6),
        };

        let config = Config::builder().kind(kind).ttl(u32::from(request.ttl)).build();
        let client = match pool.acquire(|| Client::new(&config)) {
            Ok(client) => client,
            Err(e) => {
                debug!("Could not open ICMP socket for {address}: {e}");
                return Ok(Attempt::NoData(e.to_string()));
            }
        };

        let mut pinger = client.pinger(address, PingIdentifier(rand::random())).await;
        pinger.timeout(request.timeout);
        let payload = vec![0u8; request.buffer_size];

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Canceled),
            outcome = pinger.ping(PingSequence(request.sequence), &payload) => Ok(classify(outcome)),
        }
    }
}

pub struct PingProbe {
    pub wait_time: Duration,
    pub timeout: Duration,
    pub ttl: u8,
    pub buffer_size: usize,
    /// Not applied: the ICMP socket layer does not expose the DF bit.
    pub dont_fragment: bool,
    dns: Option<Arc<dyn ReverseDns>>,
    transport: Arc<dyn EchoTransport>,
}

impl std::fmt::Debug for PingProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingProbe")
            .field("wait_time", &self.wait_time)
            .field("timeout", &self.timeout)
            .field("ttl", &self.ttl)
            .field("buffer_size", &self.buffer_size)
            .field("dont_fragment", &self.dont_fragment)
            .finish_non_exhaustive()
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_TIME, Duration::from_millis(4000), 64, true)
    }
}

impl PingProbe {
    pub fn new(wait_time: Duration, timeout: Duration, ttl: u8, dont_fragment: bool) -> Self {
        Self {
            wait_time,
            timeout,
            ttl,
            buffer_size: 32,
            dont_fragment,
            dns: None,
            transport: Arc::new(IcmpTransport::default()),
        }
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn EchoTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Resolver used by [`send`](Self::send) to name the pinged host.
    #[must_use]
    pub fn with_reverse_dns(mut self, dns: Arc<dyn ReverseDns>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// Pings `address` `attempts` times (`0` runs until `cancel` fires),
    /// waiting `wait_time` between requests.
    ///
    /// When `resolve_hostname` is set the first successful reply triggers one
    /// PTR lookup; the name is reused for every later result of the run.
    pub async fn send<F>(
        &self,
        address: IpAddr,
        attempts: u32,
        resolve_hostname: bool,
        cancel: &CancellationToken,
        mut on_reply: F,
    ) -> PingRun
    where
        F: FnMut(&PingResult) + Send,
    {
        let mut results = Vec::new();
        let mut hostname = String::new();
        let mut lookup_pending = resolve_hostname && self.dns.is_some();
        let mut errors = 0;
        let mut sequence: u16 = 0;
        let mut sent: u32 = 0;

        let end = loop {
            if cancel.is_cancelled() {
                break PingEnd::Canceled;
            }

            let timestamp = Local::now();
            let Ok(attempt) = self.send_one(address, sequence, cancel).await else {
                break PingEnd::Canceled;
            };
            sequence = sequence.wrapping_add(1);
            sent += 1;

            if let Attempt::NoData(reason) = &attempt {
                errors += 1;
                debug!("No ICMP data from {address} ({errors} in a row): {reason}");
                if errors == MAX_CONSECUTIVE_ERRORS {
                    break PingEnd::Failed("No data received".to_owned());
                }
            } else {
                errors = 0;
            }

            if lookup_pending && matches!(attempt, Attempt::Reply { .. }) {
                lookup_pending = false;
                if let Some(dns) = &self.dns {
                    if let Some(name) = dns.resolve_ptr(address, cancel).await {
                        hostname = name;
                    }
                }
            }

            let result = self.to_result(address, timestamp, &hostname, attempt);
            on_reply(&result);
            results.push(result);

            if attempts > 0 && sent >= attempts {
                break PingEnd::Completed;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break PingEnd::Canceled,
                () = time::sleep(self.wait_time) => {}
            }
        };

        PingRun { results, end }
    }

    async fn send_one(
        &self,
        address: IpAddr,
        sequence: u16,
        cancel: &CancellationToken,
    ) -> Result<Attempt, Canceled> {
        let request = EchoRequest {
            address,
            sequence,
            timeout: self.timeout,
            ttl: self.ttl,
            buffer_size: self.buffer_size,
        };
        self.transport.echo(request, cancel).await
    }

    fn to_result(
        &self,
        address: IpAddr,
        timestamp: DateTime<Local>,
        hostname: &str,
        attempt: Attempt,
    ) -> PingResult {
        match attempt {
            Attempt::Reply {
                source,
                round_trip_time,
                ttl,
                size,
            } => PingResult {
                timestamp,
                address: source,
                hostname: hostname.to_owned(),
                buffer_size: size,
                round_trip_time,
                ttl: ttl.unwrap_or(self.ttl),
                status: PingStatus::Success,
            },
            Attempt::TimedOut => self.silent(address, timestamp, hostname, PingStatus::TimedOut),
            Attempt::NoData(_) => self.silent(address, timestamp, hostname, PingStatus::Unknown),
        }
    }

    /// Non-replies report the requested address and the configured TTL.
    fn silent(
        &self,
        address: IpAddr,
        timestamp: DateTime<Local>,
        hostname: &str,
        status: PingStatus,
    ) -> PingResult {
        PingResult {
            timestamp,
            address,
            hostname: hostname.to_owned(),
            buffer_size: self.buffer_size,
            round_trip_time: Duration::ZERO,
            ttl: self.ttl,
            status,
        }
    }
}

#[async_trait]
impl Pinger for PingProbe {
    async fn reach(&self, address: IpAddr, attempts: u32, cancel: &CancellationToken) -> PingResult {
        let mut last = PingResult::unknown(address);

        let attempts = u16::try_from(attempts.max(1)).unwrap_or(u16::MAX);
        for sequence in 0..attempts {
            let timestamp = Local::now();
            let Ok(attempt) = self.send_one(address, sequence, cancel).await else {
                break;
            };
            last = self.to_result(address, timestamp, "", attempt);
            if last.is_success() {
                break;
            }
        }

        last
    }
}

fn classify(outcome: Result<(IcmpPacket, Duration), SurgeError>) -> Attempt {
    match outcome {
        Ok((IcmpPacket::V4(packet), round_trip_time)) => Attempt::Reply {
            source: IpAddr::V4(packet.get_source()),
            round_trip_time,
            ttl: packet.get_ttl().into(),
            size: packet.get_size(),
        },
        Ok((IcmpPacket::V6(packet), round_trip_time)) => Attempt::Reply {
            source: IpAddr::V6(packet.get_source()),
            round_trip_time,
            ttl: None,
            size: packet.get_size(),
        },
        Err(SurgeError::Timeout { .. }) => Attempt::TimedOut,
        Err(e) => Attempt::NoData(e.to_string()),
    }
}

/// Pings a scan target, labelling the result with the target's own hostname if it has one.
pub async fn reach_target(
    pinger: &dyn Pinger,
    target: &HostTarget,
    attempts: u32,
    cancel: &CancellationToken,
) -> PingResult {
    let mut result = pinger.reach(target.address, attempts, cancel).await;
    if let Some(hostname) = &target.hostname {
        result.hostname.clone_from(hostname);
    }
    result
}

//! TCP connect probing of one host's ports.
use crate::models::{PortResult, PortState, Protocol};
use crate::services;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::{io::AsyncWriteExt, net::TcpStream, time};
use tokio_util::sync::CancellationToken;

/// A single connect attempt against one port.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn probe(
        &self,
        address: IpAddr,
        port: u16,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> PortState;
}

/// Plain TCP handshake. One socket per attempt, never reused.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    /// Performs the connection to the socket with timeout.
    async fn connect(socket: SocketAddr, timeout: Duration) -> std::io::Result<TcpStream> {
        time::timeout(timeout, TcpStream::connect(socket)).await?
    }
}

#[async_trait]
impl PortProbe for TcpConnector {
    /// Tries the handshake exactly once.
    ///
    /// The pending connect is dropped (closing its socket) as soon as
    /// `cancel` fires, so cancellation never waits for `timeout`.
    async fn probe(
        &self,
        address: IpAddr,
        port: u16,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> PortState {
        let socket = SocketAddr::new(address, port);

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => return PortState::Closed,
            connected = Self::connect(socket, timeout) => connected,
        };

        match connected {
            Ok(mut stream) => {
                debug!("Connection was successful, shutting down stream {socket}");
                if let Err(e) = stream.shutdown().await {
                    debug!("Shutdown stream error {e}");
                }
                PortState::Open
            }
            Err(e) => {
                if e.to_string().to_lowercase().contains("too many open files") {
                    warn!("Too many open files while probing {socket}, lower the port or host concurrency");
                } else {
                    debug!("{socket} closed: {e}");
                }
                PortState::Closed
            }
        }
    }
}

/// Probes a set of ports on one host, at most `max_concurrency` at a time.
#[derive(Clone)]
pub struct PortRangeScanner {
    probe: Arc<dyn PortProbe>,
    max_concurrency: usize,
    timeout: Duration,
    show_all_results: bool,
}

impl PortRangeScanner {
    pub fn new(
        probe: Arc<dyn PortProbe>,
        max_concurrency: usize,
        timeout: Duration,
        show_all_results: bool,
    ) -> Self {
        Self {
            probe,
            max_concurrency: max_concurrency.max(1),
            timeout,
            show_all_results,
        }
    }

    /// Returns the results sorted by port number. Closed ports are dropped
    /// unless `show_all_results` is set.
    pub async fn scan(
        &self,
        address: IpAddr,
        ports: &[u16],
        cancel: &CancellationToken,
    ) -> Vec<PortResult> {
        let mut results = stream::iter(ports.iter().copied())
            .map(|port| async move {
                let state = self.probe.probe(address, port, self.timeout, cancel).await;
                port_result(port, state)
            })
            .buffer_unordered(self.max_concurrency)
            .filter(|result| {
                let keep = self.show_all_results || result.is_open();
                async move { keep }
            })
            .collect::<Vec<_>>()
            .await;

        results.sort_unstable_by_key(|result| result.port);

        debug!(
            "Scanned {} ports on {address}, {} open",
            ports.len(),
            results.iter().filter(|r| r.is_open()).count()
        );
        results
    }
}

fn port_result(port: u16, state: PortState) -> PortResult {
    let service = services::lookup(port, Protocol::Tcp);
    PortResult {
        port,
        protocol: Protocol::Tcp,
        service_name: service.map(|s| s.name.to_owned()).unwrap_or_default(),
        description: service.map(|s| s.description.to_owned()).unwrap_or_default(),
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tokio::net::TcpListener;

    /// Opens exactly the given ports and finishes them in reverse port order.
    struct Scripted {
        open: HashSet<u16>,
    }

    #[async_trait]
    impl PortProbe for Scripted {
        async fn probe(&self, _: IpAddr, port: u16, _: Duration, _: &CancellationToken) -> PortState {
            time::sleep(Duration::from_millis(u64::from(100 - port % 100))).await;
            if self.open.contains(&port) {
                PortState::Open
            } else {
                PortState::Closed
            }
        }
    }

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[tokio::test]
    async fn results_are_sorted_regardless_of_completion_order() {
        let probe = Arc::new(Scripted {
            open: HashSet::from([3, 7, 42]),
        });
        let scanner = PortRangeScanner::new(probe, 8, Duration::from_secs(1), true);
        let ports: Vec<u16> = (1..=50).rev().collect();

        let results = scanner.scan(localhost(), &ports, &CancellationToken::new()).await;

        assert_eq!(results.len(), 50);
        assert!(results.windows(2).all(|w| w[0].port < w[1].port));
    }

    #[tokio::test]
    async fn closed_ports_are_dropped_unless_showing_all() {
        let probe = Arc::new(Scripted {
            open: HashSet::from([22, 80]),
        });
        let scanner = PortRangeScanner::new(probe, 4, Duration::from_secs(1), false);

        let results = scanner
            .scan(localhost(), &[443, 80, 8080, 22], &CancellationToken::new())
            .await;

        let ports: Vec<u16> = results.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![22, 80]);
        assert_eq!(results[1].service_name, "http");
    }

    #[tokio::test]
    async fn real_listener_is_open_and_closed_port_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let cancel = CancellationToken::new();
        let timeout = Duration::from_millis(500);
        for _ in 0..3 {
            assert_eq!(TcpConnector.probe(localhost(), open, timeout, &cancel).await, PortState::Open);
            assert_eq!(TcpConnector.probe(localhost(), closed, timeout, &cancel).await, PortState::Closed);
        }
    }

    #[tokio::test]
    async fn canceled_probe_does_not_wait_for_timeout() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = std::time::Instant::now();
        // TEST-NET-1 is never routed, so only cancellation can end this early.
        let state = TcpConnector
            .probe("192.0.2.1".parse().unwrap(), 80, Duration::from_secs(30), &cancel)
            .await;

        assert_eq!(state, PortState::Closed);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

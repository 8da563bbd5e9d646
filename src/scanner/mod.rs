//! Core functionality for actual scanning behaviour.
//!
//! A [`Scanner`] sweeps a list of [`HostTarget`]s, at most
//! `max_host_concurrency` hosts at a time, and reports through one stream of
//! [`ScanEvent`]s that always ends with exactly one [`ScanEvent::Finished`].
pub mod host;
pub mod port;

pub use host::{HostProber, Probes};
pub use port::{PortProbe, PortRangeScanner, TcpConnector};

use crate::models::{HostRecord, HostTarget, ScanOptions};
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the channel created by [`Scanner::spawn`].
const EVENT_BUFFER: usize = 256;

/// How a scan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every host was attempted.
    Completed,
    UserCanceled,
    /// The scan itself broke, as opposed to a single host failing.
    Faulted(String),
}

/// Event emitted during a scan.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// A host worth reporting finished. Completion ordered, not input ordered.
    HostScanned(Box<HostRecord>),
    /// One more host was attempted, reported or not.
    Progress { completed: usize, total: usize },
    /// Always the last event of a scan.
    Finished(ScanOutcome),
}

/// Hosts attempted so far. The only state host tasks share.
#[derive(Debug)]
pub struct ScanProgress {
    completed: AtomicUsize,
    total: usize,
}

impl ScanProgress {
    pub const fn new(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total,
        }
    }

    /// Counts one more host and returns the new count.
    pub fn increment(&self) -> usize {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub const fn total(&self) -> usize {
        self.total
    }
}

/// Sweeps hosts with a fixed set of options and probes.
#[derive(Clone)]
pub struct Scanner {
    options: Arc<ScanOptions>,
    probes: Arc<Probes>,
}

impl Scanner {
    pub fn new(options: ScanOptions, probes: Arc<Probes>) -> Self {
        Self {
            options: Arc::new(options),
            probes,
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Runs the scan on its own task and hands back the event stream.
    pub fn spawn(
        &self,
        hosts: Vec<HostTarget>,
        cancel: CancellationToken,
    ) -> (JoinHandle<ScanOutcome>, mpsc::Receiver<ScanEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let scanner = self.clone();
        let handle = tokio::spawn(async move { scanner.run(hosts, tx, cancel).await });
        (handle, rx)
    }

    /// Scans `hosts` and sends events to `events`.
    ///
    /// Events are sent best-effort: a dropped receiver does not stop the
    /// scan, and a receiver that stops reading does not hold up
    /// cancellation. [`ScanEvent::Finished`] is sent on every path, and the
    /// same outcome is returned.
    pub async fn run(
        &self,
        hosts: Vec<HostTarget>,
        events: mpsc::Sender<ScanEvent>,
        cancel: CancellationToken,
    ) -> ScanOutcome {
        let outcome = match self.options.validate() {
            Ok(()) => self.scan_hosts(hosts, &events, &cancel).await,
            Err(e) => ScanOutcome::Faulted(e.to_string()),
        };
        debug!("Scan finished: {outcome:?}");

        finish(&events, outcome.clone());
        outcome
    }

    async fn scan_hosts(
        &self,
        hosts: Vec<HostTarget>,
        events: &mpsc::Sender<ScanEvent>,
        cancel: &CancellationToken,
    ) -> ScanOutcome {
        let progress = ScanProgress::new(hosts.len());
        let prober = HostProber::new(Arc::clone(&self.options), Arc::clone(&self.probes));

        debug!(
            "Start scanning hosts.\nHost concurrency {}\nPort concurrency {}\nNumber of hosts {}",
            self.options.max_host_concurrency,
            self.options.max_port_concurrency,
            progress.total()
        );

        // Each host runs on its own task so a panic stays with that host.
        let mut finished = stream::iter(hosts)
            .map(|target| {
                let prober = prober.clone();
                let cancel = cancel.clone();
                let fallback = target.clone();
                async move {
                    let joined =
                        tokio::spawn(async move { prober.probe(target, &cancel).await }).await;
                    (fallback, joined)
                }
            })
            .buffer_unordered(self.options.max_host_concurrency);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = finished.next() => next,
            };
            let Some((target, joined)) = next else {
                break;
            };

            let record = match joined {
                Ok(record) => record,
                Err(e) if e.is_panic() => {
                    warn!("Probing {} panicked, reporting it as unreachable", target.address);
                    HostRecord::unreachable(target)
                }
                Err(e) => return ScanOutcome::Faulted(format!("host task failed: {e}")),
            };

            // Anything finishing after cancellation is partial.
            if cancel.is_cancelled() {
                break;
            }

            let completed = progress.increment();
            if (record.is_reachable || self.options.show_all_results)
                && !emit(events, ScanEvent::HostScanned(Box::new(record)), cancel).await
            {
                break;
            }
            let update = ScanEvent::Progress {
                completed,
                total: progress.total(),
            };
            if !emit(events, update, cancel).await {
                break;
            }
        }

        if cancel.is_cancelled() {
            debug!("Scan canceled after {} of {} hosts", progress.completed(), progress.total());
            ScanOutcome::UserCanceled
        } else {
            ScanOutcome::Completed
        }
    }
}

/// Sends `event` unless `cancel` fires first. Returns `false` when canceled.
async fn emit(events: &mpsc::Sender<ScanEvent>, event: ScanEvent, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        _ = events.send(event) => true,
    }
}

/// Queues the terminal event without waiting on a full channel; a stalled
/// receiver gets it once it reads again.
fn finish(events: &mpsc::Sender<ScanEvent>, outcome: ScanOutcome) {
    match events.try_send(ScanEvent::Finished(outcome)) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(event)) => {
            let events = events.clone();
            tokio::spawn(async move {
                let _ = events.send(event).await;
            });
        }
    }
}

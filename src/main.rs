//! netsweep command line entry point.
use anyhow::Context;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use netsweep::address::{create_list_from_input, resolve_hosts};
use netsweep::identity::dns::build_resolver;
use netsweep::input::{Config, Opts};
use netsweep::models::HostRecord;
use netsweep::scanner::{Probes, ScanEvent, ScanOutcome, Scanner};
use netsweep::{detail, output, warning};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Common default soft limit for open files.
#[cfg(unix)]
const AVERAGE_FILE_LIMIT: usize = 1024;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut opts: Opts = Opts::read();
    let config = Config::read(opts.config_path.clone()).context("Could not load the configuration file")?;
    opts.merge(&config);

    debug!("Main() `opts` arguments are {opts:?}");

    let inputs: Vec<String> = opts
        .addresses
        .iter()
        .flat_map(|entry| create_list_from_input(entry))
        .collect();
    if inputs.is_empty() {
        warning!("No hosts given, nothing to scan.", opts.greppable, opts.accessible);
        std::process::exit(1);
    }

    #[cfg(unix)]
    warn_on_file_limit(&opts, adjust_ulimit_size(&opts));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let resolver = build_resolver(opts.resolver.as_deref()).await;
    let (hosts, unresolved) = resolve_hosts(&inputs, &resolver, !opts.prefer_ipv6, &cancel)
        .await
        .context("Could not parse the host list")?;

    for hostname in &unresolved {
        warning!(
            format!("Host {hostname:?} could not be resolved."),
            opts.greppable,
            opts.accessible
        );
    }
    if hosts.is_empty() {
        warning!("No hosts could be resolved, aborting scan.", opts.greppable, opts.accessible);
        std::process::exit(1);
    }

    let options = opts.scan_options();
    detail!(
        format!(
            "Scanning {} hosts ({} at a time{})",
            hosts.len(),
            options.max_host_concurrency,
            if options.port_scan_enabled {
                format!(", {} ports each", options.ports.len())
            } else {
                String::new()
            }
        ),
        opts.greppable,
        opts.accessible
    );

    let probes = Arc::new(Probes::system(&options, resolver));
    let scanner = Scanner::new(options, probes);

    let progress = progress_bar(&opts, hosts.len());
    let (handle, mut events) = scanner.spawn(hosts, cancel);

    let mut reachable = 0usize;
    while let Some(event) = events.recv().await {
        match event {
            ScanEvent::HostScanned(record) => {
                if record.is_reachable {
                    reachable += 1;
                }
                print_line(&progress, &format_record(&record, &opts));
            }
            ScanEvent::Progress { completed, .. } => progress.set_position(completed as u64),
            ScanEvent::Finished(_) => progress.finish_and_clear(),
        }
    }

    let outcome = handle.await.context("The scan task stopped unexpectedly")?;
    match outcome {
        ScanOutcome::Completed if reachable == 0 => {
            warning!("No reachable hosts found.", opts.greppable, opts.accessible);
        }
        ScanOutcome::Completed => {
            output!(
                format!("Scan complete, {reachable} hosts reachable."),
                opts.greppable,
                opts.accessible
            );
        }
        ScanOutcome::UserCanceled => {
            warning!("Scan canceled by user.", opts.greppable, opts.accessible);
        }
        ScanOutcome::Faulted(reason) => {
            warning!(format!("Scan failed: {reason}"), opts.greppable, opts.accessible);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn progress_bar(opts: &Opts, total: usize) -> ProgressBar {
    if opts.greppable || opts.accessible {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new(total as u64);
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.green/black} {pos}/{len} hosts")
    {
        progress.set_style(style.progress_chars("##-"));
    }
    progress
}

/// Prints above the progress bar, or straight to stdout when there is none.
fn print_line(progress: &ProgressBar, line: &str) {
    if progress.is_hidden() {
        println!("{line}");
    } else {
        progress.println(line);
    }
}

fn format_record(record: &HostRecord, opts: &Opts) -> String {
    let address = record.target.address;
    let open_ports: Vec<String> = record
        .open_ports()
        .map(|p| {
            if p.service_name.is_empty() {
                p.port.to_string()
            } else {
                format!("{}/{}", p.port, p.service_name)
            }
        })
        .collect();

    if opts.greppable {
        let ports: Vec<String> = record.open_ports().map(|p| p.port.to_string()).collect();
        return format!("{address} -> [{}]", ports.join(","));
    }

    let mut fields = vec![format!("ping {}", record.ping.time_display(false))];
    if !record.hostname.is_empty() {
        fields.push(record.hostname.clone());
    }
    if let Some(mac) = &record.mac_address {
        match &record.vendor {
            Some(vendor) => fields.push(format!("{mac} ({vendor})")),
            None => fields.push(mac.clone()),
        }
    }
    if !open_ports.is_empty() {
        fields.push(format!("open: {}", open_ports.join(", ")));
    }

    let status = if record.is_reachable { "up" } else { "down" };
    if opts.accessible {
        format!("{address} {status} {}", fields.join(" | "))
    } else {
        let status = if record.is_reachable {
            status.green()
        } else {
            status.red()
        };
        format!("{} {status} {}", address.to_string().bold(), fields.join(" | "))
    }
}

/// Tells the user when both concurrency limits together could exhaust file descriptors.
#[cfg(unix)]
fn warn_on_file_limit(opts: &Opts, ulimit: usize) {
    let sockets = opts.host_concurrency.saturating_mul(opts.port_concurrency.max(1) + 1);
    if sockets <= ulimit {
        return;
    }

    warning!(
        format!("File limit {ulimit} is lower than the {sockets} sockets this scan may open."),
        opts.greppable,
        opts.accessible
    );
    if ulimit < AVERAGE_FILE_LIMIT {
        detail!(
            "Lower --host-concurrency or --port-concurrency, or raise the limit with --ulimit.",
            opts.greppable,
            opts.accessible
        );
    }
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> usize {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable,
                opts.accessible
            );
        }
    }

    Resource::NOFILE
        .get()
        .ok()
        .and_then(|(soft, _)| usize::try_from(soft).ok())
        .unwrap_or(usize::MAX)
}

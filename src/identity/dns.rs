//! DNS plumbing shared by target resolution and reverse lookups.
use super::ReverseDns;
use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use log::debug;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use tokio::{fs, io};
use tokio_util::sync::CancellationToken;

/// Derive a DNS resolver.
///
/// 1. if the `resolver` parameter has been set:
///     1. assume the parameter is a path and attempt to read IPs.
///     2. parse the input as a comma-separated list of IPs.
/// 2. if `resolver` is not set:
///    1. attempt to derive a resolver from the system config. (e.g.
///       `/etc/resolv.conf` on *nix).
///    2. finally, build a CloudFlare-based resolver.
pub async fn build_resolver(resolver: Option<&str>) -> TokioAsyncResolver {
    match resolver {
        Some(r) => {
            let mut config = ResolverConfig::new();
            let resolver_ips = match read_resolver_from_file(r).await {
                Ok(ips) => ips,
                Err(_) => r
                    .split(',')
                    .filter_map(|r| IpAddr::from_str(r.trim()).ok())
                    .collect::<Vec<_>>(),
            };
            for ip in resolver_ips {
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(ip, 53),
                    Protocol::Udp,
                ));
            }
            TokioAsyncResolver::tokio(config, ResolverOpts::default())
        }
        None => TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::cloudflare_tls(), ResolverOpts::default())
        }),
    }
}

/// Parses an input file of resolver IPs, one per line.
async fn read_resolver_from_file(path: &str) -> io::Result<Vec<IpAddr>> {
    let ips = fs::read_to_string(path)
        .await?
        .lines()
        .filter_map(|line| IpAddr::from_str(line.trim()).ok())
        .collect();

    Ok(ips)
}

/// PTR lookups through a hickory resolver.
pub struct HickoryReverseDns {
    resolver: TokioAsyncResolver,
}

impl HickoryReverseDns {
    pub const fn new(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl ReverseDns for HickoryReverseDns {
    async fn resolve_ptr(&self, address: IpAddr, cancel: &CancellationToken) -> Option<String> {
        let lookup = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            lookup = self.resolver.reverse_lookup(address) => lookup,
        };

        match lookup {
            Ok(names) => names
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_owned())
                .filter(|name| !name.is_empty()),
            Err(e) => {
                debug!("No PTR record for {address}: {e}");
                None
            }
        }
    }
}

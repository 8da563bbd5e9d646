//! NetBIOS node status (NBSTAT) queries over UDP/137.
//!
//! The request is the fixed wildcard-name status query and the reply is read
//! with the legacy name-table layout: a 57 byte header ending in the name
//! count, then one 18 byte block per name (15 name bytes, a type byte, two
//! flag bytes), then the 6 byte unit ID which carries the MAC address.
use super::{normalize_mac, NetBiosResolver, VendorLookup};
use crate::models::IdentityFragment;
use async_trait::async_trait;
use log::debug;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time;
use tokio_util::sync::CancellationToken;

pub const NETBIOS_PORT: u16 = 137;

const RESPONSE_TYPE_POS: usize = 47;
const RESPONSE_TYPE_NBSTAT: u8 = 0x21;
const RESPONSE_BASE_LEN: usize = 57;
const RESPONSE_NAME_LEN: usize = 15;
const RESPONSE_BLOCK_LEN: usize = 18;
const MAC_LEN: usize = 6;

const GROUP_NAME_FLAG: u8 = 0x80;
const NAME_TYPE_DOMAIN: u8 = 0x00;
const NAME_TYPE_MESSENGER: u8 = 0x03;

/// Node status request for the wildcard name `*`.
pub const REQUEST: [u8; 50] = [
    0x80, 0x94, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x43, 0x4b,
    0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41,
    0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41, 0x41,
    0x00, 0x00, 0x21, 0x00, 0x01,
];

/// Names decoded from a node status reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub computer_name: String,
    pub user_name: Option<String>,
    pub group_name: Option<String>,
    pub mac_address: String,
}

/// Decodes a node status reply. `None` means the reply is not a status
/// reply or is shorter than its own name count says.
pub fn parse_node_status(reply: &[u8]) -> Option<NodeStatus> {
    if reply.len() < RESPONSE_BASE_LEN || reply[RESPONSE_TYPE_POS] != RESPONSE_TYPE_NBSTAT {
        return None;
    }

    let count = usize::from(reply[RESPONSE_BASE_LEN - 1]);
    if count == 0 || reply.len() < RESPONSE_BASE_LEN + RESPONSE_BLOCK_LEN * count + MAC_LEN {
        return None;
    }

    let block = |i: usize| &reply[RESPONSE_BASE_LEN + RESPONSE_BLOCK_LEN * i..];
    let name = |i: usize| {
        String::from_utf8_lossy(&block(i)[..RESPONSE_NAME_LEN])
            .trim()
            .to_owned()
    };
    let name_type = |i: usize| block(i)[RESPONSE_NAME_LEN];
    let flags = |i: usize| block(i)[RESPONSE_NAME_LEN + 1];

    let group_name = (1..count)
        .find(|&i| name_type(i) == NAME_TYPE_DOMAIN && flags(i) & GROUP_NAME_FLAG != 0)
        .map(name);

    let user_name = (1..count)
        .rev()
        .find(|&i| name_type(i) == NAME_TYPE_MESSENGER)
        .map(name);

    let mac = &block(count)[..MAC_LEN];
    let mac_address = mac
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":");

    Some(NodeStatus {
        computer_name: name(0),
        user_name,
        group_name,
        mac_address,
    })
}

/// Sends one status query per lookup and waits for a single reply.
pub struct UdpNetBiosResolver {
    vendors: Option<Arc<dyn VendorLookup>>,
    port: u16,
}

impl UdpNetBiosResolver {
    pub fn new(vendors: Option<Arc<dyn VendorLookup>>) -> Self {
        Self {
            vendors,
            port: NETBIOS_PORT,
        }
    }

    /// Queries a different UDP port, for talking to test responders.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    async fn query(&self, address: IpAddr, timeout: Duration) -> std::io::Result<Option<Vec<u8>>> {
        let local: SocketAddr = match address {
            IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect((address, self.port)).await?;
        socket.send(&REQUEST).await?;

        let mut buf = [0u8; 1024];
        match time::timeout(timeout, socket.recv(&mut buf)).await {
            Ok(Ok(size)) => Ok(Some(buf[..size].to_vec())),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl NetBiosResolver for UdpNetBiosResolver {
    async fn resolve(
        &self,
        address: IpAddr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> IdentityFragment {
        let reply = tokio::select! {
            biased;
            () = cancel.cancelled() => return IdentityFragment::default(),
            reply = self.query(address, timeout) => reply,
        };

        let reply = match reply {
            Ok(Some(reply)) => reply,
            Ok(None) => return IdentityFragment::default(),
            Err(e) => {
                debug!("NetBIOS query to {address} failed: {e}");
                return IdentityFragment::failed(e.to_string());
            }
        };

        let Some(status) = parse_node_status(&reply) else {
            debug!("Malformed NetBIOS reply from {address} ({} bytes)", reply.len());
            return IdentityFragment::failed("malformed node status reply");
        };

        let mac_address = normalize_mac(&status.mac_address);
        let vendor = match (&self.vendors, &mac_address) {
            (Some(vendors), Some(mac)) => vendors.vendor(mac),
            _ => None,
        };

        IdentityFragment {
            computer_name: Some(status.computer_name).filter(|n| !n.is_empty()),
            user_name: status.user_name,
            group_name: status.group_name,
            mac_address,
            vendor,
            dns_hostname: None,
            is_reachable: true,
            error: None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn block(name: &str, name_type: u8, flags: u8) -> Vec<u8> {
        let mut b = format!("{name:<15}").into_bytes();
        b.push(name_type);
        b.push(flags);
        b.push(0);
        b
    }

    /// Builds a node status reply with the given name table and unit ID.
    pub(crate) fn reply(names: &[(&str, u8, u8)], mac: [u8; 6]) -> Vec<u8> {
        let mut r = vec![0u8; RESPONSE_BASE_LEN];
        r[RESPONSE_TYPE_POS] = RESPONSE_TYPE_NBSTAT;
        r[RESPONSE_BASE_LEN - 1] = u8::try_from(names.len()).unwrap();
        for &(name, t, f) in names {
            r.extend(block(name, t, f));
        }
        r.extend(mac);
        r
    }

    #[test]
    fn request_is_fifty_bytes_and_asks_for_nbstat() {
        assert_eq!(REQUEST.len(), 50);
        assert_eq!(&REQUEST[46..50], &[0x00, 0x21, 0x00, 0x01]);
    }

    #[test]
    fn decodes_full_name_table() {
        let r = reply(
            &[
                ("DESKTOP-01", 0x00, 0x04),
                ("WORKGROUP", 0x00, 0x84),
                ("DESKTOP-01", 0x20, 0x04),
                ("ALICE", 0x03, 0x04),
            ],
            [0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e],
        );

        let status = parse_node_status(&r).unwrap();
        assert_eq!(status.computer_name, "DESKTOP-01");
        assert_eq!(status.group_name.as_deref(), Some("WORKGROUP"));
        assert_eq!(status.user_name.as_deref(), Some("ALICE"));
        assert_eq!(status.mac_address, "00:1A:2B:3C:4D:5E");
    }

    #[test]
    fn first_entry_is_never_the_user() {
        let r = reply(&[("SERVER", 0x03, 0x04)], [0; 6]);
        let status = parse_node_status(&r).unwrap();
        assert_eq!(status.user_name, None);
        assert_eq!(status.group_name, None);
    }

    #[test]
    fn short_reply_is_rejected() {
        assert_eq!(parse_node_status(&[0u8; 20]), None);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let mut r = reply(&[("HOST", 0x00, 0x04)], [0; 6]);
        r[RESPONSE_TYPE_POS] = 0x20;
        assert_eq!(parse_node_status(&r), None);
    }

    #[test]
    fn truncated_name_table_is_rejected() {
        let mut r = reply(&[("HOST", 0x00, 0x04), ("GROUP", 0x00, 0x84)], [0; 6]);
        r.truncate(RESPONSE_BASE_LEN + RESPONSE_BLOCK_LEN + 3);
        assert_eq!(parse_node_status(&r), None);
    }

    #[tokio::test]
    async fn resolves_against_local_responder() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = responder.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            let (n, peer) = responder.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], &REQUEST[..]);
            let r = reply(&[("NAS", 0x00, 0x04)], [0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
            responder.send_to(&r, peer).await.unwrap();
        });

        let resolver = UdpNetBiosResolver::new(None).with_port(port);
        let fragment = resolver
            .resolve(
                "127.0.0.1".parse().unwrap(),
                Duration::from_secs(2),
                &CancellationToken::new(),
            )
            .await;

        assert!(fragment.is_reachable);
        assert_eq!(fragment.computer_name.as_deref(), Some("NAS"));
        assert_eq!(fragment.mac_address.as_deref(), Some("DE:AD:BE:EF:00:01"));
    }

    #[tokio::test]
    async fn silent_host_is_unreachable() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let resolver = UdpNetBiosResolver::new(None).with_port(port);
        let fragment = resolver
            .resolve(
                "127.0.0.1".parse().unwrap(),
                Duration::from_millis(100),
                &CancellationToken::new(),
            )
            .await;

        assert!(!fragment.is_reachable);
        drop(silent);
    }
}

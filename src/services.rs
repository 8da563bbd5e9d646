//! Well-known service names for port results.
use crate::models::Protocol;
use once_cell::sync::Lazy;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub description: &'static str,
}

// (port, protocol, name, description)
const WELL_KNOWN: &[(u16, Protocol, &str, &str)] = &[
    (20, Protocol::Tcp, "ftp-data", "File Transfer [Default Data]"),
    (21, Protocol::Tcp, "ftp", "File Transfer [Control]"),
    (22, Protocol::Tcp, "ssh", "Secure Shell"),
    (23, Protocol::Tcp, "telnet", "Telnet"),
    (25, Protocol::Tcp, "smtp", "Simple Mail Transfer"),
    (53, Protocol::Tcp, "domain", "Domain Name Server"),
    (53, Protocol::Udp, "domain", "Domain Name Server"),
    (67, Protocol::Udp, "bootps", "Bootstrap Protocol Server"),
    (69, Protocol::Udp, "tftp", "Trivial File Transfer"),
    (80, Protocol::Tcp, "http", "World Wide Web HTTP"),
    (88, Protocol::Tcp, "kerberos", "Kerberos"),
    (110, Protocol::Tcp, "pop3", "Post Office Protocol - Version 3"),
    (111, Protocol::Tcp, "sunrpc", "SUN Remote Procedure Call"),
    (123, Protocol::Udp, "ntp", "Network Time Protocol"),
    (135, Protocol::Tcp, "msrpc", "Microsoft RPC services"),
    (137, Protocol::Udp, "netbios-ns", "NETBIOS Name Service"),
    (138, Protocol::Udp, "netbios-dgm", "NETBIOS Datagram Service"),
    (139, Protocol::Tcp, "netbios-ssn", "NETBIOS Session Service"),
    (143, Protocol::Tcp, "imap", "Internet Message Access Protocol"),
    (161, Protocol::Udp, "snmp", "SNMP"),
    (389, Protocol::Tcp, "ldap", "Lightweight Directory Access Protocol"),
    (443, Protocol::Tcp, "https", "http protocol over TLS/SSL"),
    (445, Protocol::Tcp, "microsoft-ds", "Microsoft-DS"),
    (465, Protocol::Tcp, "submissions", "Message Submission over TLS"),
    (514, Protocol::Udp, "syslog", "Syslog"),
    (587, Protocol::Tcp, "submission", "Message Submission"),
    (636, Protocol::Tcp, "ldaps", "ldap protocol over TLS/SSL"),
    (993, Protocol::Tcp, "imaps", "imap4 protocol over TLS/SSL"),
    (995, Protocol::Tcp, "pop3s", "pop3 protocol over TLS/SSL"),
    (1433, Protocol::Tcp, "ms-sql-s", "Microsoft-SQL-Server"),
    (1521, Protocol::Tcp, "oracle", "Oracle Database Listener"),
    (2049, Protocol::Tcp, "nfs", "Network File System"),
    (3306, Protocol::Tcp, "mysql", "MySQL"),
    (3389, Protocol::Tcp, "ms-wbt-server", "MS WBT Server"),
    (5432, Protocol::Tcp, "postgresql", "PostgreSQL Database"),
    (5900, Protocol::Tcp, "rfb", "Remote Framebuffer"),
    (5985, Protocol::Tcp, "wsman", "WBEM WS-Management HTTP"),
    (5986, Protocol::Tcp, "wsmans", "WBEM WS-Management HTTP over TLS/SSL"),
    (6379, Protocol::Tcp, "redis", "Redis key-value store"),
    (8080, Protocol::Tcp, "http-alt", "HTTP Alternate"),
    (8443, Protocol::Tcp, "pcsync-https", "PCsync HTTPS"),
    (9100, Protocol::Tcp, "jetdirect", "HP JetDirect printing"),
];

static SERVICES: Lazy<HashMap<(u16, Protocol), ServiceInfo>> = Lazy::new(|| {
    WELL_KNOWN
        .iter()
        .map(|&(port, protocol, name, description)| {
            ((port, protocol), ServiceInfo { name, description })
        })
        .collect()
});

/// Looks up the registered service for a port and protocol.
pub fn lookup(port: u16, protocol: Protocol) -> Option<ServiceInfo> {
    SERVICES.get(&(port, protocol)).copied()
}

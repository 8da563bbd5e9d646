//! Provides a means to read, parse and hold configuration options for scans.
use crate::errors::Result;
use crate::models::ScanOptions;
use clap::Parser;
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const LOWEST_PORT_NUMBER: u16 = 1;
const TOP_PORT_NUMBER: u16 = 65535;

const CONFIG_FILE_NAME: &str = ".netsweep.toml";

pub type Ports = Vec<u16>;

#[cfg(not(tarpaulin_include))]
pub fn parse_ports_and_ranges(input: &str) -> std::result::Result<Ports, String> {
    let mut ports = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part.contains('-') {
            let range_ports = parse_port_range(part)?;
            ports.extend(range_ports);
        } else {
            let port = parse_single_port(part)?;
            ports.push(port);
        }
    }

    if ports.is_empty() {
        return Err(String::from("No valid ports or ranges provided"));
    }

    ports.sort_unstable();
    ports.dedup();

    Ok(ports)
}

fn parse_port_range(range_str: &str) -> std::result::Result<Vec<u16>, String> {
    let range_parts: Vec<&str> = range_str.split('-').collect();
    if range_parts.len() != 2 {
        return Err(format!(
            "Invalid range format '{range_str}'. Expected 'start-end'. Example: 1-1000.",
        ));
    }

    let start: u16 = range_parts[0].parse().map_err(|_| {
        format!(
            "Invalid start port '{}' in range '{range_str}'",
            range_parts[0]
        )
    })?;
    let end: u16 = range_parts[1].parse().map_err(|_| {
        format!(
            "Invalid end port '{}' in range '{range_str}'",
            range_parts[1]
        )
    })?;

    if start > end {
        return Err(format!(
            "Start port {start} is greater than end port {end} in range '{range_str}'",
        ));
    }

    if start < LOWEST_PORT_NUMBER {
        return Err(format!(
            "Ports in range '{range_str}' must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}",
        ));
    }

    Ok((start..=end).collect())
}

fn parse_single_port(port_str: &str) -> std::result::Result<u16, String> {
    let port: u16 = port_str
        .parse()
        .map_err(|_| format!("Invalid port number '{port_str}'"))?;

    if port < LOWEST_PORT_NUMBER {
        return Err(format!(
            "Port {port} must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}",
        ));
    }

    Ok(port)
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "netsweep",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Sweeps address ranges for live hosts: ping, TCP ports, NetBIOS, ARP and reverse DNS.
/// Only scan networks you are allowed to scan.
pub struct Opts {
    /// A semicolon-delimited list of hosts: IPs, CIDRs, masks, ranges
    /// (10.0.0.1-10.0.0.9), octet patterns (10.0.[0-2].[1,5]) or hostnames.
    #[arg(short, long, value_delimiter = ';')]
    pub addresses: Vec<String>,

    /// Enables the port scan with these ports. Examples: 80,443,8080 or 1-1000 or 1-1000,8080
    #[arg(short, long, value_parser = parse_ports_and_ranges)]
    pub ports: Option<Ports>,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Greppable mode. Only print reachable hosts, one per line, no progress bar.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// A comma-delimited list or file of DNS resolvers.
    #[arg(long)]
    pub resolver: Option<String>,

    /// How many hosts are probed at the same time.
    #[arg(long, default_value = "256")]
    pub host_concurrency: usize,

    /// How many ports of one host are probed at the same time.
    #[arg(long, default_value = "5")]
    pub port_concurrency: usize,

    /// The timeout in milliseconds before a port is assumed to be closed.
    #[arg(short, long, default_value = "4000")]
    pub timeout: u64,

    /// ICMP echo requests sent before a host counts as not answering ping.
    #[arg(long, default_value = "2")]
    pub ping_attempts: u32,

    /// The timeout in milliseconds of one ICMP echo request.
    #[arg(long, default_value = "4000")]
    pub ping_timeout: u64,

    /// ICMP payload size in bytes.
    #[arg(long, default_value = "32")]
    pub ping_buffer_size: usize,

    /// TTL of ICMP echo requests.
    #[arg(long, default_value = "64")]
    pub ttl: u8,

    /// The timeout in milliseconds of the NetBIOS name query.
    #[arg(long, default_value = "4000")]
    pub netbios_timeout: u64,

    /// Skip the NetBIOS name query.
    #[arg(long)]
    pub no_netbios: bool,

    /// Skip MAC address and vendor lookup.
    #[arg(long)]
    pub no_mac: bool,

    /// Skip reverse DNS lookup of reachable hosts.
    #[arg(long)]
    pub no_dns: bool,

    /// Report hosts that did not answer too.
    #[arg(short, long)]
    pub show_all: bool,

    /// Use a hostname's IPv6 address when it has both.
    #[arg(long)]
    pub prefer_ipv6: bool,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        Self::parse()
    }

    /// Reads the command line arguments into an Opts struct and merge
    /// values found within the user configuration file.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            addresses,
            greppable,
            accessible,
            host_concurrency,
            port_concurrency,
            timeout,
            ping_attempts,
            ping_timeout,
            ping_buffer_size,
            ttl,
            netbios_timeout,
            no_netbios,
            no_mac,
            no_dns,
            show_all,
            prefer_ipv6
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(ports, resolver, ulimit);
    }

    /// The library view of these options. A port list turns the port scan on.
    pub fn scan_options(&self) -> ScanOptions {
        let defaults = ScanOptions::default();
        ScanOptions {
            max_host_concurrency: self.host_concurrency,
            max_port_concurrency: self.port_concurrency,
            icmp_attempts: self.ping_attempts,
            icmp_timeout: Duration::from_millis(self.ping_timeout),
            icmp_buffer_size: self.ping_buffer_size,
            icmp_ttl: self.ttl,
            icmp_dont_fragment: defaults.icmp_dont_fragment,
            port_scan_enabled: self.ports.is_some(),
            ports: self.ports.clone().unwrap_or(defaults.ports),
            port_scan_timeout: Duration::from_millis(self.timeout),
            netbios_enabled: !self.no_netbios,
            netbios_timeout: Duration::from_millis(self.netbios_timeout),
            resolve_mac_address: !self.no_mac,
            resolve_hostname: !self.no_dns,
            show_all_results: self.show_all,
        }
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            addresses: vec![],
            ports: None,
            no_config: true,
            config_path: None,
            greppable: true,
            accessible: false,
            resolver: None,
            host_concurrency: 256,
            port_concurrency: 5,
            timeout: 4000,
            ping_attempts: 2,
            ping_timeout: 4000,
            ping_buffer_size: 32,
            ttl: 64,
            netbios_timeout: 4000,
            no_netbios: false,
            no_mac: false,
            no_dns: false,
            show_all: false,
            prefer_ipv6: false,
            ulimit: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    addresses: Option<Vec<String>>,
    ports: Option<Vec<u16>>,
    greppable: Option<bool>,
    accessible: Option<bool>,
    resolver: Option<String>,
    host_concurrency: Option<usize>,
    port_concurrency: Option<usize>,
    timeout: Option<u64>,
    ping_attempts: Option<u32>,
    ping_timeout: Option<u64>,
    ping_buffer_size: Option<usize>,
    ttl: Option<u8>,
    netbios_timeout: Option<u64>,
    no_netbios: Option<bool>,
    no_mac: Option<bool>,
    no_dns: Option<bool>,
    show_all: Option<bool>,
    prefer_ipv6: Option<bool>,
    ulimit: Option<u64>,
}

#[cfg(not(tarpaulin_include))]
#[allow(clippy::doc_link_with_quotes)]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file is an empty configuration.
    ///
    /// # Format
    ///
    /// addresses = ["192.168.178.0/24", "printer.lan"]
    /// ports = [22, 80, 443]
    /// host_concurrency = 128
    /// show_all = false
    /// no_netbios = true
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Result<Self> {
        let config_path = custom_config_path.unwrap_or_else(default_config_path);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> PathBuf {
    let mut config_path = dirs::home_dir().unwrap_or_default();
    config_path.push(CONFIG_FILE_NAME);
    config_path
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use parameterized::parameterized;
    use std::time::Duration;

    use super::{parse_ports_and_ranges, Config, Opts};

    fn config() -> Config {
        Config {
            addresses: Some(vec!["10.0.0.0/24".to_owned()]),
            greppable: Some(false),
            accessible: Some(true),
            host_concurrency: Some(64),
            timeout: Some(1_000),
            no_netbios: Some(true),
            show_all: Some(true),
            ..Config::default()
        }
    }

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[parameterized(input = {
        vec!["netsweep", "--addresses", "10.0.0.1"],
        vec!["netsweep", "-a", "10.0.0.1;printer.lan"],
        vec!["netsweep", "-a", "10.0.[0-1].[1,5];10.0.1.0/24", "-p", "22,80"],
    }, addresses = {
        vec!["10.0.0.1".to_owned()],
        vec!["10.0.0.1".to_owned(), "printer.lan".to_owned()],
        vec!["10.0.[0-1].[1,5]".to_owned(), "10.0.1.0/24".to_owned()],
    })]
    fn addresses_split_on_semicolons(input: Vec<&str>, addresses: Vec<String>) {
        let opts = Opts::parse_from(input);

        assert_eq!(addresses, opts.addresses);
    }

    #[test]
    fn opts_no_merge_when_config_is_ignored() {
        let mut opts = Opts::default();
        let config = config();

        opts.merge(&config);

        assert_eq!(opts.addresses, vec![] as Vec<String>);
        assert!(opts.greppable);
        assert!(!opts.accessible);
        assert_eq!(opts.timeout, 4000);
        assert!(!opts.show_all);
    }

    #[test]
    fn opts_merge_required_arguments() {
        let mut opts = Opts::default();
        let config = config();

        opts.merge_required(&config);

        assert_eq!(opts.addresses, config.addresses.unwrap());
        assert_eq!(opts.greppable, config.greppable.unwrap());
        assert_eq!(opts.accessible, config.accessible.unwrap());
        assert_eq!(opts.host_concurrency, 64);
        assert_eq!(opts.port_concurrency, 5);
        assert_eq!(opts.timeout, config.timeout.unwrap());
        assert!(opts.no_netbios);
        assert!(opts.show_all);
    }

    #[test]
    fn opts_merge_optional_arguments() {
        let mut opts = Opts::default();
        let mut config = config();
        config.ports = Some(vec![22, 80]);
        config.ulimit = Some(1_000);
        config.resolver = Some("1.1.1.1".to_owned());

        opts.merge_optional(&config);

        assert_eq!(opts.ports, Some(vec![22, 80]));
        assert_eq!(opts.ulimit, config.ulimit);
        assert_eq!(opts.resolver, config.resolver);
    }

    #[test]
    fn config_parses_from_toml() {
        let config = Config::parse("ports = [22, 80]\nshow_all = true\nttl = 32\n").unwrap();

        assert_eq!(config.ports, Some(vec![22, 80]));
        assert_eq!(config.show_all, Some(true));
        assert_eq!(config.ttl, Some(32));
        assert!(config.addresses.is_none());
    }

    #[test]
    fn config_rejects_bad_toml() {
        assert!(Config::parse("ports = \"all of them\"").is_err());
    }

    #[test]
    fn missing_config_file_is_empty() {
        let config = Config::read(Some("/nonexistent/netsweep.toml".into())).unwrap();
        assert!(config.ports.is_none());
    }

    #[test]
    fn ports_enable_the_port_scan() {
        let opts = Opts::parse_from(["netsweep", "-a", "10.0.0.1", "-p", "443,22", "-t", "250"]);
        let options = opts.scan_options();

        assert!(options.port_scan_enabled);
        assert_eq!(options.ports, vec![22, 443]);
        assert_eq!(options.port_scan_timeout, Duration::from_millis(250));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn defaults_match_library_defaults() {
        let opts = Opts::parse_from(["netsweep", "-a", "10.0.0.1"]);
        assert_eq!(opts.scan_options(), crate::models::ScanOptions::default());
    }

    #[test]
    fn switches_turn_lookups_off() {
        let opts = Opts::parse_from(["netsweep", "-a", "10.0.0.1", "--no-netbios", "--no-mac", "--no-dns", "-s"]);
        let options = opts.scan_options();

        assert!(!options.netbios_enabled);
        assert!(!options.resolve_mac_address);
        assert!(!options.resolve_hostname);
        assert!(options.show_all_results);
    }

    #[test]
    fn test_parse_ports_and_ranges_single_port() {
        let result = parse_ports_and_ranges("80");
        assert_eq!(result, Ok(vec![80]));
    }

    #[test]
    fn test_parse_ports_and_ranges_multiple_ports() {
        let result = parse_ports_and_ranges("80,443,8080");
        assert_eq!(result, Ok(vec![80, 443, 8080]));
    }

    #[test]
    fn test_parse_ports_and_ranges_single_range() {
        let result = parse_ports_and_ranges("1-5");
        assert_eq!(result, Ok(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_parse_ports_and_ranges_mixed_ports_and_ranges() {
        let result = parse_ports_and_ranges("80,443,1-3,8080");
        assert_eq!(result, Ok(vec![1, 2, 3, 80, 443, 8080]));
    }

    #[test]
    fn test_parse_ports_and_ranges_with_spaces() {
        let result = parse_ports_and_ranges("80, 443, 1-3, 8080");
        assert_eq!(result, Ok(vec![1, 2, 3, 80, 443, 8080]));
    }

    #[test]
    fn test_parse_ports_and_ranges_duplicates() {
        let result = parse_ports_and_ranges("80,443,80,443");
        assert_eq!(result, Ok(vec![80, 443]));
    }

    #[test]
    fn test_parse_ports_and_ranges_empty_input() {
        let result = parse_ports_and_ranges("");
        assert!(result
            .unwrap_err()
            .contains("No valid ports or ranges provided"));
    }

    #[parameterized(input = {
        "80,abc,443",
        "80,1-abc,443",
        "80,1-2-3,443",
        "80,5-1,443",
        "80,70000,443",
        "80,0,443",
    }, message = {
        "Invalid port number 'abc'",
        "Invalid end port 'abc' in range '1-abc'",
        "Invalid range format '1-2-3'. Expected 'start-end'",
        "Start port 5 is greater than end port 1 in range '5-1'",
        "Invalid port number '70000'",
        "Port 0 must be between 1 and 65535",
    })]
    fn test_parse_ports_and_ranges_errors(input: &str, message: &str) {
        let error = parse_ports_and_ranges(input).unwrap_err();
        assert!(error.contains(message), "{error}");
    }

    #[test]
    fn test_parse_ports_and_ranges_complex_mixed() {
        let result = parse_ports_and_ranges("1,80,443,1-5,8080,9090,10-12");
        assert_eq!(
            result,
            Ok(vec![1, 2, 3, 4, 5, 10, 11, 12, 80, 443, 8080, 9090])
        );
    }
}

//! Static IP directive for the kernel command line
//!
//! Serialized as `ip=<host>::<dns>:<netmask>:<hostname>:<interface>:off`.
//! The hostname field is reused across runs so the directive stays stable.

use crate::board::cmdline::BootCmdline;
use crate::utils::NetworkProbe;
use chrono::{DateTime, Local};
use std::fmt;
use std::net::Ipv4Addr;

pub const IP_KEY: &str = "ip";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIpDescriptor {
    pub host_ip: String,
    pub dns_ip: String,
    pub netmask: String,
    pub hostname: String,
    pub interface: String,
    pub autoconf: bool,
}

impl fmt::Display for StaticIpDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}:{}:{}:{}:{}",
            self.host_ip,
            self.dns_ip,
            self.netmask,
            self.hostname,
            self.interface,
            if self.autoconf { "on" } else { "off" }
        )
    }
}

impl StaticIpDescriptor {
    /// Parse the value of an existing `ip=` directive written by us
    pub fn parse(value: &str) -> Option<Self> {
        let fields: Vec<&str> = value.split(':').collect();
        if fields.len() != 7 {
            return None;
        }
        Some(Self {
            host_ip: fields[0].to_string(),
            dns_ip: fields[2].to_string(),
            netmask: fields[3].to_string(),
            hostname: fields[4].to_string(),
            interface: fields[5].to_string(),
            autoconf: fields[6] != "off",
        })
    }
}

/// Hostname token from an `ip=` directive already present on the command line
pub fn existing_hostname(cmdline: &BootCmdline) -> Option<String> {
    cmdline
        .get(IP_KEY)
        .and_then(StaticIpDescriptor::parse)
        .map(|d| d.hostname)
        .filter(|h| !h.is_empty())
}

/// Build a fresh node hostname: `<user>-<computer>-<timestamp>-<uuid8>`
pub fn generate_hostname(user: &str, computer: &str, now: DateTime<Local>, id: &uuid::Uuid) -> String {
    let raw = format!(
        "{}-{}-{}-{}",
        user,
        computer,
        now.format("%-d-%-m-%Y-%-Hh%-Mm%-Ss"),
        &id.simple().to_string()[..8]
    );
    sanitize_hostname(&raw)
}

/// Keep only characters that survive both the cmdline and k3s node names
fn sanitize_hostname(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

fn is_ipv4(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

/// Compile a complete descriptor from live host state.
///
/// Fails with the name of the first unresolved field if the host IP or the
/// DNS server is not an IPv4 address, or the hostname is empty; a partial
/// directive is never produced.
/// `new_hostname` is only
/// called when the command line carries no reusable hostname.
pub fn compile<N, F>(
    network: &N,
    cmdline: &BootCmdline,
    netmask: &str,
    new_hostname: F,
) -> Result<StaticIpDescriptor, &'static str>
where
    N: NetworkProbe,
    F: FnOnce() -> String,
{
    let host_ip = network.local_ip().filter(|ip| is_ipv4(ip)).ok_or("host ip")?;
    let dns_ip = network.dns_server().filter(|ip| is_ipv4(ip)).ok_or("dns server")?;
    let hostname = existing_hostname(cmdline)
        .unwrap_or_else(new_hostname);
    if hostname.is_empty() {
        return Err("hostname");
    }
    let interface = network.interface_for(&host_ip).unwrap_or_default();

    Ok(StaticIpDescriptor {
        host_ip,
        dns_ip,
        netmask: netmask.to_string(),
        hostname,
        interface,
        autoconf: false,
    })
}

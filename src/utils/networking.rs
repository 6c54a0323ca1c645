use crate::exec::CommandExecutor;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Live network facts used to compile a static-IP directive
pub trait NetworkProbe {
    /// Primary IPv4 address of this host
    fn local_ip(&self) -> Option<String>;

    /// First IPv4 nameserver from the resolver configuration
    fn dns_server(&self) -> Option<String>;

    /// Name of the interface carrying `ip`
    fn interface_for(&self, ip: &str) -> Option<String>;
}

/// Probe backed by `hostname -I`, the resolver file and the interface table
pub struct SystemNetwork<'a, E: CommandExecutor> {
    exec: &'a E,
    resolv_conf: PathBuf,
}

impl<'a, E: CommandExecutor> SystemNetwork<'a, E> {
    pub fn new(exec: &'a E, resolv_conf: impl Into<PathBuf>) -> Self {
        Self {
            exec,
            resolv_conf: resolv_conf.into(),
        }
    }
}

impl<E: CommandExecutor> NetworkProbe for SystemNetwork<'_, E> {
    fn local_ip(&self) -> Option<String> {
        if let Ok(output) = self.exec.capture("hostname", &["-I"]) {
            if output.success() {
                if let Some(ip) = first_ipv4(&output.stdout) {
                    return Some(ip);
                }
            }
        }

        // hostname -I is Linux-only; fall back to the interface table
        let addrs = if_addrs::get_if_addrs().ok()?;
        addrs
            .into_iter()
            .find(|iface| !iface.is_loopback() && iface.ip().is_ipv4())
            .map(|iface| iface.ip().to_string())
    }

    fn dns_server(&self) -> Option<String> {
        let content = self.exec.read_file(&self.resolv_conf).ok()?;
        parse_nameserver(&content)
    }

    fn interface_for(&self, ip: &str) -> Option<String> {
        let addrs = if_addrs::get_if_addrs().ok()?;
        let table: Vec<(String, String)> = addrs
            .into_iter()
            .map(|iface| (iface.name.clone(), iface.ip().to_string()))
            .collect();
        interface_matching(&table, ip)
    }
}

/// First IPv4 token of `hostname -I` output
fn first_ipv4(addresses: &str) -> Option<String> {
    addresses
        .split_whitespace()
        .find(|token| token.parse::<Ipv4Addr>().is_ok())
        .map(str::to_string)
}

/// First IPv4 nameserver. IPv6 entries are skipped since the kernel `ip=`
/// directive is colon-delimited.
pub fn parse_nameserver(resolv_conf: &str) -> Option<String> {
    match resolv_conf::Config::parse(resolv_conf) {
        Ok(parsed) => parsed.nameservers.iter().find_map(|ns| match ns {
            resolv_conf::ScopedIp::V4(addr) => Some(addr.to_string()),
            _ => None,
        }),
        Err(err) => {
            tracing::debug!(error = %err, "unparseable resolver configuration");
            None
        }
    }
}

fn interface_matching(table: &[(String, String)], ip: &str) -> Option<String> {
    table
        .iter()
        .find(|(_, addr)| addr == ip)
        .map(|(name, _)| name.clone())
}

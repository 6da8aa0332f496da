//! Link-layer (ARP) and naming (reverse DNS) lookups.
//!
//! Both are pure reads of OS facilities and never fail the caller: an
//! unavailable neighbor table yields an empty map, a failed lookup yields `None`.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dns_lookup::lookup_addr;
use futures::stream::{self, StreamExt};
use tokio::process::Command;

/// Runs an external command and returns its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommand;

#[async_trait]
impl CommandRunner for SystemCommand {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<String> {
        let output = Command::new(program).args(args).output().await?;
        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{program} exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

type NeighborCommand = (&'static str, &'static [&'static str]);

const WINDOWS_NEIGHBOR: &[NeighborCommand] = &[("arp", &["-a"])];
const LINUX_NEIGHBOR: &[NeighborCommand] = &[
    ("ip", &["neigh", "show"]),
    ("arp", &["-e"]),
    ("arp", &["-an"]),
];
const BSD_NEIGHBOR: &[NeighborCommand] = &[("arp", &["-an"])];

/// Neighbor-table commands to try, in order, for the current platform.
fn neighbor_commands() -> &'static [NeighborCommand] {
    if cfg!(target_os = "windows") {
        WINDOWS_NEIGHBOR
    } else if cfg!(target_os = "linux") {
        LINUX_NEIGHBOR
    } else {
        BSD_NEIGHBOR
    }
}

pub struct ArpResolver {
    runner: Arc<dyn CommandRunner>,
}

impl Default for ArpResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemCommand))
    }
}

impl ArpResolver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Read the OS neighbor table as IP -> colon-separated lowercase MAC.
    pub async fn resolve_arp_table(&self) -> HashMap<Ipv4Addr, String> {
        for &(program, args) in neighbor_commands() {
            match self.runner.run(program, args).await {
                Ok(stdout) => return parse_arp_output(&stdout),
                Err(e) => {
                    tracing::debug!(program, error = %e, "neighbor table command failed");
                }
            }
        }
        tracing::warn!("no neighbor table facility available");
        HashMap::new()
    }
}

/// Parse neighbor-table output in either hyphen-separated (`aa-bb-cc-dd-ee-ff`)
/// or colon-separated (`aa:bb:cc:dd:ee:ff`) form.
///
/// Each line contributes at most one entry: the first IPv4 token and the
/// first MAC-shaped token after it. Incomplete and all-zero entries are skipped.
pub fn parse_arp_output(output: &str) -> HashMap<Ipv4Addr, String> {
    let mut table = HashMap::new();
    for line in output.lines() {
        let mut ip = None;
        let mut mac = None;
        for token in line.split_whitespace() {
            let token = token.trim_matches(&['(', ')'][..]);
            if ip.is_none() {
                ip = token.parse::<Ipv4Addr>().ok();
                continue;
            }
            if let Some(m) = normalize_mac(token) {
                mac = Some(m);
                break;
            }
        }
        if let (Some(ip), Some(mac)) = (ip, mac) {
            if mac != "00:00:00:00:00:00" {
                table.insert(ip, mac);
            }
        }
    }
    table
}

/// Six hex groups separated by `-` or `:`, rewritten as zero-padded
/// lowercase colon form.
pub fn normalize_mac(token: &str) -> Option<String> {
    let sep = if token.contains('-') { '-' } else { ':' };
    let groups: Vec<&str> = token.split(sep).collect();
    if groups.len() != 6 {
        return None;
    }
    let mut out = Vec::with_capacity(6);
    for g in groups {
        if g.is_empty() || g.len() > 2 {
            return None;
        }
        let byte = u8::from_str_radix(g, 16).ok()?;
        out.push(format!("{byte:02x}"));
    }
    Some(out.join(":"))
}

/// Address -> name lookup.
#[async_trait]
pub trait ReverseLookup: Send + Sync {
    async fn lookup(&self, ip: Ipv4Addr) -> Option<String>;
}

/// System resolver via `getnameinfo`, run on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl ReverseLookup for SystemResolver {
    async fn lookup(&self, ip: Ipv4Addr) -> Option<String> {
        match tokio::task::spawn_blocking(move || lookup_addr(&IpAddr::V4(ip))).await {
            // Don't return if hostname is just the IP address
            Ok(Ok(hostname)) if hostname != ip.to_string() => Some(hostname),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                tracing::debug!(address = %ip, error = %e, "reverse lookup failed");
                None
            }
            Err(e) => {
                tracing::warn!(address = %ip, error = %e, "DNS worker join failed");
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct NameResolver {
    lookup: Arc<dyn ReverseLookup>,
    timeout: Duration,
    concurrency: usize,
}

impl NameResolver {
    pub fn new(lookup: Arc<dyn ReverseLookup>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            lookup,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn reverse_lookup(&self, ip: Ipv4Addr) -> Option<String> {
        tokio::time::timeout(self.timeout, self.lookup.lookup(ip))
            .await
            .unwrap_or_else(|_| {
                tracing::debug!(address = %ip, "reverse lookup timed out");
                None
            })
    }

    /// Resolve many addresses concurrently. Every input address appears in the
    /// result; failures are recorded as `None`.
    pub async fn batch_reverse_lookup(&self, ips: &[Ipv4Addr]) -> HashMap<Ipv4Addr, Option<String>> {
        let results: HashMap<Ipv4Addr, Option<String>> = stream::iter(ips.iter().copied())
            .map(|ip| async move { (ip, self.reverse_lookup(ip).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        tracing::info!(
            requested = ips.len(),
            resolved = results.values().filter(|n| n.is_some()).count(),
            "reverse lookups complete"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_normalization() {
        assert_eq!(normalize_mac("AA-BB-CC-0D-EE-FF").as_deref(), Some("aa:bb:cc:0d:ee:ff"));
        assert_eq!(normalize_mac("0:1b:2c:3d:4e:5f").as_deref(), Some("00:1b:2c:3d:4e:5f"));
        assert_eq!(normalize_mac("dynamic"), None);
        assert_eq!(normalize_mac("aa:bb:cc"), None);
        assert_eq!(normalize_mac("zz:bb:cc:dd:ee:ff"), None);
    }

    struct Failing;

    #[async_trait]
    impl CommandRunner for Failing {
        async fn run(&self, program: &str, _args: &[&str]) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::NotFound, program.to_string()))
        }
    }

    #[tokio::test]
    async fn unavailable_table_is_empty() {
        let arp = ArpResolver::new(Arc::new(Failing));
        assert!(arp.resolve_arp_table().await.is_empty());
    }
}

//! IPv4 address-space arithmetic: dotted-quad conversion, inclusive ranges,
//! CIDR membership and pool x subnet intersection.
//!
//! All arithmetic is unsigned 32-bit. Range iteration is built on
//! `RangeInclusive<u32>` so `255.255.255.255` terminates instead of wrapping.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;

use crate::error::{Result, ScanError};

/// Parse a strict dotted quad: exactly four decimal octets, each 0..=255.
pub fn parse_ipv4(ip: &str) -> Result<Ipv4Addr> {
    let invalid = || ScanError::InvalidAddress(ip.to_string());
    let mut octets = [0u8; 4];
    let mut parts = ip.trim().split('.');
    for slot in octets.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let value: u16 = part.parse().map_err(|_| invalid())?;
        *slot = u8::try_from(value).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(Ipv4Addr::from(octets))
}

pub fn ip_to_integer(ip: &str) -> Result<u32> {
    parse_ipv4(ip).map(u32::from)
}

pub fn integer_to_ip(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}

/// Inclusive IPv4 range, `start <= end` by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl AddressRange {
    /// Build a range from a pool's start/end strings. An inverted range is
    /// rejected rather than treated as empty.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_ipv4(start)?, parse_ipv4(end)?)
    }

    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        if u32::from(start) > u32::from(end) {
            return Err(ScanError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.end)) - u64::from(u32::from(self.start)) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        (u32::from(self.start)..=u32::from(self.end)).contains(&u32::from(ip))
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        (u32::from(self.start)..=u32::from(self.end)).map(Ipv4Addr::from)
    }

    /// Addresses of this range that fall inside `cidr`, computed from bounds.
    pub fn intersect(&self, cidr: &CidrBlock) -> Option<AddressRange> {
        let lo = u32::from(self.start).max(u32::from(cidr.first()));
        let hi = u32::from(self.end).min(u32::from(cidr.last()));
        (lo <= hi).then(|| AddressRange {
            start: Ipv4Addr::from(lo),
            end: Ipv4Addr::from(hi),
        })
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Enumerate every address from `start` to `end` inclusive, in order.
pub fn enumerate_range(start: &str, end: &str) -> Result<Vec<String>> {
    let range = AddressRange::parse(start, end)?;
    Ok(range.iter().map(|ip| ip.to_string()).collect())
}

/// A normalized `network/prefix` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrBlock {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl CidrBlock {
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(ScanError::InvalidCidr(format!("{addr}/{prefix_len}")));
        }
        let network = Ipv4Addr::from(u32::from(addr) & prefix_mask(prefix_len));
        Ok(Self {
            network,
            prefix_len,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn mask(&self) -> u32 {
        prefix_mask(self.prefix_len)
    }

    pub fn first(&self) -> Ipv4Addr {
        self.network
    }

    pub fn last(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !self.mask())
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == u32::from(self.network)
    }

    pub fn as_range(&self) -> AddressRange {
        AddressRange {
            start: self.first(),
            end: self.last(),
        }
    }
}

/// `~(2^(32-n) - 1)`; all-zero for /0, all-ones for /32.
fn prefix_mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n.min(32))),
    }
}

impl FromStr for CidrBlock {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScanError::InvalidCidr(s.to_string());
        let (addr, bits) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr = parse_ipv4(addr).map_err(|_| invalid())?;
        if bits.is_empty() || bits.len() > 2 || !bits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let prefix_len: u8 = bits.parse().map_err(|_| invalid())?;
        Self::new(addr, prefix_len).map_err(|_| invalid())
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl From<Ipv4Net> for CidrBlock {
    fn from(net: Ipv4Net) -> Self {
        Self {
            network: net.network(),
            prefix_len: net.prefix_len(),
        }
    }
}

pub fn is_in_cidr(ip: &str, cidr: &str) -> Result<bool> {
    let block: CidrBlock = cidr.parse()?;
    Ok(block.contains(parse_ipv4(ip)?))
}

/// The concrete address set of a campaign: the pool range clipped to the
/// subnet block. `None` when the two do not overlap.
pub fn campaign_range(start: &str, end: &str, cidr: &str) -> Result<Option<AddressRange>> {
    let range = AddressRange::parse(start, end)?;
    let block: CidrBlock = cidr.parse()?;
    Ok(range.intersect(&block))
}

/// A scan target: a single address, a `network/prefix` block, or a
/// `start-end` range.
pub fn parse_target(target: &str) -> Result<AddressRange> {
    let target = target.trim();
    if target.contains('/') {
        return Ok(target.parse::<CidrBlock>()?.as_range());
    }
    if let Some((start, end)) = target.split_once('-') {
        return AddressRange::parse(start.trim(), end.trim());
    }
    let ip = parse_ipv4(target)?;
    AddressRange::new(ip, ip)
}

/// A parsed target list, walked lazily so a `/8` never materializes.
///
/// Iteration follows target order; an address covered by an earlier
/// target is skipped, so each address is yielded once.
#[derive(Debug, Clone, Default)]
pub struct Targets {
    ranges: Vec<AddressRange>,
}

impl Targets {
    /// Parse targets, skipping malformed ones with a warning.
    pub fn parse<S: AsRef<str>>(targets: &[S]) -> Self {
        let ranges = targets
            .iter()
            .filter_map(|target| match parse_target(target.as_ref()) {
                Ok(range) => Some(range),
                Err(e) => {
                    tracing::warn!(target = target.as_ref(), error = %e, "skipping invalid target");
                    None
                }
            })
            .collect();
        Self { ranges }
    }

    /// Number of distinct addresses, from range bounds alone.
    pub fn len(&self) -> u64 {
        let mut bounds: Vec<(u32, u32)> = self
            .ranges
            .iter()
            .map(|r| (u32::from(r.start()), u32::from(r.end())))
            .collect();
        bounds.sort_unstable();
        let mut total = 0u64;
        let mut covered: Option<u32> = None;
        for (lo, hi) in bounds {
            let lo = match covered {
                Some(c) if c >= hi => continue,
                Some(c) if c >= lo => c + 1,
                _ => lo,
            };
            total += u64::from(hi - lo) + 1;
            covered = Some(hi);
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.ranges.iter().enumerate().flat_map(move |(i, range)| {
            let earlier = &self.ranges[..i];
            range.iter().filter(move |ip| !earlier.iter().any(|r| r.contains(*ip)))
        })
    }
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 block.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_cidrs() -> Result<Vec<CidrBlock>> {
    let mut set = HashSet::<CidrBlock>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_cidr(v4.ip));
        }
    }
    let mut cidrs: Vec<CidrBlock> = set.into_iter().collect();
    // Sort for stable output
    cidrs.sort_by_key(|c| (u32::from(c.network()), c.prefix_len()));
    Ok(cidrs)
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> CidrBlock {
    let net = Ipv4Net::new(ip, 24)
        .map(|n| n.trunc())
        .unwrap_or_else(|_| Ipv4Net::from(ip));
    CidrBlock::from(net)
}

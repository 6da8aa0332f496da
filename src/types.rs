use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use ::time::{format_description::well_known, OffsetDateTime};
use serde::{Deserialize, Serialize};

/// The three independent campaign kinds. Each has its own single-flight flag.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Reachability,
    PortScan,
    SnmpDiscovery,
}

impl CampaignKind {
    pub const ALL: [CampaignKind; 3] = [
        CampaignKind::Reachability,
        CampaignKind::PortScan,
        CampaignKind::SnmpDiscovery,
    ];
}

impl fmt::Display for CampaignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reachability => "reachability",
            Self::PortScan => "port_scan",
            Self::SnmpDiscovery => "snmp_discovery",
        };
        f.write_str(s)
    }
}

/// How a campaign ended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignOutcome {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// One echo round-trip of a reachability probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingAttempt {
    pub status: DeviceStatus,
    pub latency_ms: Option<u64>,
}

impl PingAttempt {
    pub fn online(latency_ms: u64) -> Self {
        Self {
            status: DeviceStatus::Online,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn offline() -> Self {
        Self {
            status: DeviceStatus::Offline,
            latency_ms: None,
        }
    }
}

/// All attempts made against one address during a reachability campaign.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostReachability {
    pub address: Ipv4Addr,
    pub attempts: Vec<PingAttempt>,
    pub timestamp: String,
}

impl HostReachability {
    /// A host counts as online when any attempt came back.
    pub fn status(&self) -> DeviceStatus {
        if self
            .attempts
            .iter()
            .any(|a| a.status == DeviceStatus::Online)
        {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    Open,
    Closed,
    Filtered,
    Error,
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Filtered => "filtered",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of probing one TCP port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortScanEntry {
    pub port: u16,
    pub status: PortStatus,
    pub service: Option<String>,
}

/// Port states collected for one address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostPorts {
    pub address: Ipv4Addr,
    pub ports: Vec<PortScanEntry>,
    pub timestamp: String,
}

impl HostPorts {
    pub fn open_ports(&self) -> impl Iterator<Item = &PortScanEntry> {
        self.ports.iter().filter(|p| p.status == PortStatus::Open)
    }
}

/// A responder found by an SNMP discovery campaign, correlated to inventory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SnmpDiscovery {
    pub address: Ipv4Addr,
    pub manufacturer_id: Option<String>,
    pub model_id: Option<String>,
    pub product_id: Option<String>,
    pub oids: BTreeMap<String, String>,
}

/// Per-address results handed to a progress sink.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeResult {
    /// A single round-trip, delivered as soon as it completes.
    Ping {
        address: Ipv4Addr,
        attempt: PingAttempt,
    },
    Host(HostReachability),
    Ports(HostPorts),
    Snmp(SnmpDiscovery),
}

impl ProbeResult {
    pub fn address(&self) -> Ipv4Addr {
        match self {
            Self::Ping { address, .. } => *address,
            Self::Host(h) => h.address,
            Self::Ports(p) => p.address,
            Self::Snmp(s) => s.address,
        }
    }

    pub fn kind(&self) -> CampaignKind {
        match self {
            Self::Ping { .. } | Self::Host(_) => CampaignKind::Reachability,
            Self::Ports(_) => CampaignKind::PortScan,
            Self::Snmp(_) => CampaignKind::SnmpDiscovery,
        }
    }
}

/// Events published by a running campaign, in start, results, stop order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Started {
        kind: CampaignKind,
    },
    Progress {
        kind: CampaignKind,
        fraction: f64,
    },
    Result(ProbeResult),
    Stopped {
        kind: CampaignKind,
        outcome: CampaignOutcome,
    },
}

/// Aggregate counters for a finished SNMP discovery campaign.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub scanned: u64,
    pub responded: u64,
    pub unregistered: u64,
    pub failed: u64,
    pub discoveries: Vec<SnmpDiscovery>,
}

/// A discovered host annotated with link-layer and naming information.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: Ipv4Addr,
    pub hostname: Option<String>,
    pub mac_address: Option<String>,
}

/// One OID row ready for the external store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OidRecord {
    pub name: String,
    pub oid: String,
    pub description: String,
}

// Value objects read from the external configuration store.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    #[serde(default)]
    pub id: String,
    pub cidr: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    #[serde(default)]
    pub id: String,
    pub start_ip: String,
    pub end_ip: String,
    #[serde(default)]
    pub subnet_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IpAddressRecord {
    pub address: String,
    #[serde(default)]
    pub network_inventory_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    pub id: String,
    #[serde(default)]
    pub mac_address: String,
    pub manufacturer_id: String,
    pub model_id: String,
    pub product_id: String,
}

pub(crate) fn now_iso_like() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_online_if_any_attempt_answers() {
        let host = HostReachability {
            address: Ipv4Addr::new(10, 0, 0, 1),
            attempts: vec![PingAttempt::offline(), PingAttempt::online(3)],
            timestamp: now_iso_like(),
        };
        assert_eq!(host.status(), DeviceStatus::Online);
    }

    #[test]
    fn events_serialize_with_tags() {
        let ev = ScanEvent::Progress {
            kind: CampaignKind::PortScan,
            fraction: 0.5,
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(
            json,
            r#"{"event":"progress","kind":"port_scan","fraction":0.5}"#
        );
    }
}

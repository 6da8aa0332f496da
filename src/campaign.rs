//! Campaign orchestration.
//!
//! An [`Engine`] owns the probes and one single-flight flag per
//! [`CampaignKind`]. A campaign walks its address set in order, hands every
//! per-address result to a [`ProgressSink`] as soon as it exists, and checks
//! for cancellation at each address boundary. Kinds are independent: a port
//! scan may run while an SNMP discovery is in progress, but never two port
//! scans.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::address::{parse_ipv4, AddressRange, CidrBlock, Targets};
use crate::config::EngineConfig;
use crate::error::{Result, ScanError};
use crate::mib::MibIndex;
use crate::ping::{default_prober, EchoProber, ReachabilityProbe};
use crate::resolve::{ArpResolver, CommandRunner, NameResolver, ReverseLookup, SystemCommand, SystemResolver};
use crate::scanner::{Connector, PortScanner, TcpConnector};
use crate::snmp::{SessionFactory, Snmp2Factory, SnmpCredential, SnmpTransport, VarBind};
use crate::types::{
    now_iso_like, CampaignKind, CampaignOutcome, DiscoveredDevice, DiscoverySummary, HostPorts,
    HostReachability, InventoryItem, IpAddressRecord, OidRecord, PingAttempt, Pool, ProbeResult,
    ScanEvent, SnmpDiscovery, Subnet,
};

/// Receives campaign events. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ScanEvent);
}

impl ProgressSink for mpsc::UnboundedSender<ScanEvent> {
    fn emit(&self, event: ScanEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ScanEvent) {}
}

/// Adapts a closure.
pub struct CallbackSink<F>(pub F);

impl<F> ProgressSink for CallbackSink<F>
where
    F: Fn(ScanEvent) + Send + Sync,
{
    fn emit(&self, event: ScanEvent) {
        (self.0)(event)
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct Collector {
    events: Mutex<Vec<ScanEvent>>,
}

impl Collector {
    pub fn events(&self) -> Vec<ScanEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn results(&self) -> Vec<ProbeResult> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::Result(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for Collector {
    fn emit(&self, event: ScanEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[derive(Debug, Default)]
struct Flags {
    next_generation: u64,
    running: HashMap<CampaignKind, (u64, CancellationToken)>,
}

fn lock_flags(flags: &Mutex<Flags>) -> MutexGuard<'_, Flags> {
    flags.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Proof that a campaign of one kind holds its single-flight flag.
///
/// Dropping the ticket clears the flag, unless [`Engine::stop`] already did
/// and a newer campaign of the same kind has taken it since.
pub struct CampaignTicket {
    flags: Arc<Mutex<Flags>>,
    kind: CampaignKind,
    generation: u64,
    cancel: CancellationToken,
    released: bool,
}

impl CampaignTicket {
    pub fn kind(&self) -> CampaignKind {
        self.kind
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Distinguishes this run from earlier and later runs of the same kind.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut flags = lock_flags(&self.flags);
        if matches!(flags.running.get(&self.kind), Some((g, _)) if *g == self.generation) {
            flags.running.remove(&self.kind);
        }
    }
}

impl Drop for CampaignTicket {
    fn drop(&mut self) {
        self.release();
    }
}

/// Brackets a campaign with `Started` and exactly one `Stopped` event.
/// Leaving scope without [`CampaignRun::finish`] reports `Failed`.
struct CampaignRun<'s> {
    ticket: CampaignTicket,
    sink: &'s dyn ProgressSink,
    outcome: Option<CampaignOutcome>,
}

impl<'s> CampaignRun<'s> {
    fn new(ticket: CampaignTicket, sink: &'s dyn ProgressSink) -> Self {
        tracing::info!(kind = %ticket.kind, "campaign started");
        sink.emit(ScanEvent::Started { kind: ticket.kind });
        Self {
            ticket,
            sink,
            outcome: None,
        }
    }

    fn kind(&self) -> CampaignKind {
        self.ticket.kind
    }

    fn is_cancelled(&self) -> bool {
        self.ticket.is_cancelled()
    }

    fn progress(&self, fraction: f64) {
        self.sink.emit(ScanEvent::Progress {
            kind: self.kind(),
            fraction: fraction.clamp(0.0, 1.0),
        });
    }

    fn result(&self, result: ProbeResult) {
        self.sink.emit(ScanEvent::Result(result));
    }

    fn finish(mut self, outcome: CampaignOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for CampaignRun<'_> {
    fn drop(&mut self) {
        // Release first so a listener reacting to `Stopped` can start again.
        self.ticket.release();
        let outcome = self.outcome.unwrap_or(CampaignOutcome::Failed);
        tracing::info!(kind = %self.ticket.kind, outcome = ?outcome, "campaign stopped");
        self.sink.emit(ScanEvent::Stopped {
            kind: self.ticket.kind,
            outcome,
        });
    }
}

/// Inputs of an SNMP discovery campaign, as read from the configuration store.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryRequest {
    pub subnet: Subnet,
    pub pool: Pool,
    pub credentials: Vec<SnmpCredential>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddressRecord>,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
}

/// Pool range clipped to the subnet block.
///
/// Malformed input fails with `InvalidAddress`/`InvalidCidr`/`InvertedRange`.
/// A pool that belongs to another subnet, or does not overlap its block,
/// fails with `SubnetNotFound`.
pub fn address_set(subnet: &Subnet, pool: &Pool) -> Result<AddressRange> {
    let range = AddressRange::parse(&pool.start_ip, &pool.end_ip)?;
    let block: CidrBlock = subnet.cidr.parse()?;
    if !pool.subnet_id.is_empty() && !subnet.id.is_empty() && pool.subnet_id != subnet.id {
        return Err(ScanError::SubnetNotFound(format!(
            "pool {} belongs to subnet {}, not {}",
            pool.id, pool.subnet_id, subnet.id
        )));
    }
    range
        .intersect(&block)
        .ok_or_else(|| ScanError::SubnetNotFound(format!("{range} does not overlap {block}")))
}

/// Store rows for one discovery, named through `index` where possible.
pub fn oid_records(index: &MibIndex, discovery: &SnmpDiscovery) -> Vec<OidRecord> {
    discovery
        .oids
        .iter()
        .map(|(oid, value)| OidRecord {
            name: index.display_name(oid),
            oid: oid.clone(),
            description: value.clone(),
        })
        .collect()
}

/// Collects adapters for an [`Engine`]. Anything not supplied uses the
/// operating system.
pub struct EngineBuilder {
    config: EngineConfig,
    echo: Option<Arc<dyn EchoProber>>,
    connector: Option<Arc<dyn Connector>>,
    sessions: Option<Arc<dyn SessionFactory>>,
    commands: Option<Arc<dyn CommandRunner>>,
    lookup: Option<Arc<dyn ReverseLookup>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            echo: None,
            connector: None,
            sessions: None,
            commands: None,
            lookup: None,
        }
    }

    pub fn echo(mut self, echo: Arc<dyn EchoProber>) -> Self {
        self.echo = Some(echo);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn SessionFactory>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn commands(mut self, commands: Arc<dyn CommandRunner>) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn reverse_lookup(mut self, lookup: Arc<dyn ReverseLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config;
        let echo = self.echo.unwrap_or_else(default_prober);
        let connector = self.connector.unwrap_or_else(|| Arc::new(TcpConnector));
        let sessions = self.sessions.unwrap_or_else(|| Arc::new(Snmp2Factory));
        let commands = self.commands.unwrap_or_else(|| Arc::new(SystemCommand));
        let lookup = self.lookup.unwrap_or_else(|| Arc::new(SystemResolver));

        Engine {
            reachability: ReachabilityProbe::new(echo, config.ping_timeout()),
            scanner: PortScanner::with_connector(
                connector,
                config.port_timeout(),
                config.port_concurrency,
            ),
            snmp: SnmpTransport::new(sessions, &config),
            arp: ArpResolver::new(commands),
            names: NameResolver::new(lookup, config.dns_timeout(), config.dns_concurrency),
            flags: Arc::new(Mutex::new(Flags::default())),
            config,
        }
    }
}

pub struct Engine {
    config: EngineConfig,
    reachability: ReachabilityProbe,
    scanner: PortScanner,
    snmp: SnmpTransport,
    arp: ArpResolver,
    names: NameResolver,
    flags: Arc<Mutex<Flags>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snmp(&self) -> &SnmpTransport {
        &self.snmp
    }

    pub fn arp(&self) -> &ArpResolver {
        &self.arp
    }

    pub fn names(&self) -> &NameResolver {
        &self.names
    }

    /// Claim the flag for `kind`, failing fast if a campaign of that kind
    /// is already running.
    pub fn start(&self, kind: CampaignKind) -> Result<CampaignTicket> {
        let mut flags = lock_flags(&self.flags);
        if flags.running.contains_key(&kind) {
            return Err(ScanError::AlreadyInProgress(kind));
        }
        flags.next_generation += 1;
        let generation = flags.next_generation;
        let cancel = CancellationToken::new();
        flags.running.insert(kind, (generation, cancel.clone()));
        Ok(CampaignTicket {
            flags: self.flags.clone(),
            kind,
            generation,
            cancel,
            released: false,
        })
    }

    /// Signal the running campaign of `kind` to stop and clear its flag at
    /// once. Returns false when nothing of that kind was running.
    pub fn stop(&self, kind: CampaignKind) -> bool {
        let removed = lock_flags(&self.flags).running.remove(&kind);
        match removed {
            Some((_, cancel)) => {
                cancel.cancel();
                tracing::info!(kind = %kind, "campaign stop requested");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, kind: CampaignKind) -> bool {
        lock_flags(&self.flags).running.contains_key(&kind)
    }

    fn check_ticket(ticket: &CampaignTicket, kind: CampaignKind) -> Result<()> {
        if ticket.kind != kind {
            return Err(ScanError::Config(format!(
                "a {} ticket cannot run a {kind} campaign",
                ticket.kind
            )));
        }
        Ok(())
    }

    /// Echo `address` `attempts` times. Shares the reachability flag with
    /// [`Engine::run_reachability`].
    pub async fn ping_host(
        &self,
        address: Ipv4Addr,
        attempts: u32,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PingAttempt>> {
        let ticket = self.start(CampaignKind::Reachability)?;
        self.ping_host_with(ticket, address, attempts, sink).await
    }

    /// [`Engine::ping_host`] under a ticket the caller already holds.
    pub async fn ping_host_with(
        &self,
        ticket: CampaignTicket,
        address: Ipv4Addr,
        attempts: u32,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<PingAttempt>> {
        Self::check_ticket(&ticket, CampaignKind::Reachability)?;
        let run = CampaignRun::new(ticket, sink);
        let out = self
            .reachability
            .probe(address, attempts, |attempt, fraction| {
                run.progress(fraction);
                run.result(ProbeResult::Ping {
                    address,
                    attempt: attempt.clone(),
                });
            })
            .await;
        run.finish(CampaignOutcome::Completed);
        Ok(out)
    }

    pub async fn run_reachability(
        &self,
        subnet: &Subnet,
        pool: &Pool,
        attempts: u32,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<HostReachability>> {
        let ticket = self.start(CampaignKind::Reachability)?;
        self.reachability_with(ticket, subnet, pool, attempts, sink)
            .await
    }

    /// Reachability sweep under an already claimed ticket.
    pub async fn reachability_with(
        &self,
        ticket: CampaignTicket,
        subnet: &Subnet,
        pool: &Pool,
        attempts: u32,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<HostReachability>> {
        Self::check_ticket(&ticket, CampaignKind::Reachability)?;
        let run = CampaignRun::new(ticket, sink);
        let Some(range) = campaign_addresses(subnet, pool)? else {
            run.finish(CampaignOutcome::Completed);
            return Ok(Vec::new());
        };

        let total = range.len() as f64;
        let mut hosts = Vec::new();
        for (i, address) in range.iter().enumerate() {
            if run.is_cancelled() {
                run.finish(CampaignOutcome::Cancelled);
                return Ok(hosts);
            }
            let attempts = self
                .reachability
                .probe(address, attempts, |attempt, fraction| {
                    run.progress((i as f64 + fraction) / total);
                    run.result(ProbeResult::Ping {
                        address,
                        attempt: attempt.clone(),
                    });
                })
                .await;
            let host = HostReachability {
                address,
                attempts,
                timestamp: now_iso_like(),
            };
            tracing::debug!(address = %address, status = ?host.status(), "host probed");
            run.result(ProbeResult::Host(host.clone()));
            hosts.push(host);
        }
        run.finish(CampaignOutcome::Completed);
        Ok(hosts)
    }

    /// TCP connect scan over `targets` (addresses, `a-b` ranges or CIDR
    /// blocks). Malformed targets are skipped with a warning.
    pub async fn run_port_scan<S: AsRef<str>>(
        &self,
        targets: &[S],
        ports: &[u16],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<HostPorts>> {
        let ticket = self.start(CampaignKind::PortScan)?;
        self.port_scan_with(ticket, targets, ports, sink).await
    }

    pub async fn port_scan_with<S: AsRef<str>>(
        &self,
        ticket: CampaignTicket,
        targets: &[S],
        ports: &[u16],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<HostPorts>> {
        Self::check_ticket(&ticket, CampaignKind::PortScan)?;
        let cancel = ticket.cancel.clone();
        let run = CampaignRun::new(ticket, sink);
        let targets = Targets::parse(targets);
        let total = targets.len().max(1) as f64;

        let mut hosts = Vec::new();
        for (i, address) in targets.iter().enumerate() {
            if run.is_cancelled() {
                run.finish(CampaignOutcome::Cancelled);
                return Ok(hosts);
            }
            let host = self.scanner.scan_host(address, ports, &cancel).await;
            tracing::debug!(address = %address, open = host.open_ports().count(), "host scanned");
            run.result(ProbeResult::Ports(host.clone()));
            run.progress((i + 1) as f64 / total);
            hosts.push(host);
        }
        run.finish(CampaignOutcome::Completed);
        Ok(hosts)
    }

    /// Port scan over a pool's full range.
    pub async fn run_pool_port_scan(
        &self,
        pool: &Pool,
        ports: &[u16],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<HostPorts>> {
        let range = AddressRange::parse(&pool.start_ip, &pool.end_ip)?;
        self.run_port_scan(&[range.to_string()], ports, sink).await
    }

    pub async fn run_snmp_discovery(
        &self,
        request: &DiscoveryRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DiscoverySummary> {
        let ticket = self.start(CampaignKind::SnmpDiscovery)?;
        self.snmp_discovery_with(ticket, request, sink).await
    }

    pub async fn snmp_discovery_with(
        &self,
        ticket: CampaignTicket,
        request: &DiscoveryRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DiscoverySummary> {
        Self::check_ticket(&ticket, CampaignKind::SnmpDiscovery)?;
        let run = CampaignRun::new(ticket, sink);
        let mut summary = DiscoverySummary::default();
        let Some(range) = campaign_addresses(&request.subnet, &request.pool)? else {
            run.finish(CampaignOutcome::Completed);
            return Ok(summary);
        };
        let correlate = Correlation::new(&request.ip_addresses, &request.inventory);

        let total = range.len() as f64;
        for (i, address) in range.iter().enumerate() {
            if run.is_cancelled() {
                run.finish(CampaignOutcome::Cancelled);
                return Ok(summary);
            }
            summary.scanned += 1;

            match self.walk_first_credential(address, &request.credentials).await {
                Some(bindings) => {
                    summary.responded += 1;
                    let oids: BTreeMap<String, String> = bindings
                        .into_iter()
                        .map(|b| (b.oid, b.value.to_string()))
                        .collect();
                    let item = correlate.lookup(address);
                    if item.is_none() {
                        summary.unregistered += 1;
                    }
                    if item.is_some() || self.config.report_unregistered {
                        let discovery = SnmpDiscovery {
                            address,
                            manufacturer_id: item.map(|i| i.manufacturer_id.clone()),
                            model_id: item.map(|i| i.model_id.clone()),
                            product_id: item.map(|i| i.product_id.clone()),
                            oids,
                        };
                        run.result(ProbeResult::Snmp(discovery.clone()));
                        summary.discoveries.push(discovery);
                    } else {
                        tracing::debug!(address = %address, "responder not in inventory, dropped");
                    }
                }
                None => {
                    summary.failed += 1;
                    tracing::warn!(address = %address, "no credential succeeded");
                }
            }
            run.progress((i + 1) as f64 / total);
        }

        tracing::info!(
            scanned = summary.scanned,
            responded = summary.responded,
            unregistered = summary.unregistered,
            failed = summary.failed,
            "discovery summary"
        );
        run.finish(CampaignOutcome::Completed);
        Ok(summary)
    }

    /// Walk the discovery root with each credential in turn; the first one
    /// that answers wins.
    async fn walk_first_credential(
        &self,
        address: Ipv4Addr,
        credentials: &[SnmpCredential],
    ) -> Option<Vec<VarBind>> {
        for (n, credential) in credentials.iter().enumerate() {
            match self
                .snmp
                .get_subtree(address, credential, &self.config.snmp_walk_root)
                .await
            {
                Ok(bindings) => return Some(bindings),
                Err(e) => {
                    tracing::debug!(address = %address, credential = n, error = %e, "credential failed");
                }
            }
        }
        None
    }

    /// Annotate addresses with the neighbor table and reverse DNS.
    pub async fn describe_devices(&self, addresses: &[Ipv4Addr]) -> Vec<DiscoveredDevice> {
        let arp = self.arp.resolve_arp_table().await;
        let mut names = self.names.batch_reverse_lookup(addresses).await;
        addresses
            .iter()
            .map(|&address| DiscoveredDevice {
                address,
                hostname: names.remove(&address).flatten(),
                mac_address: arp.get(&address).cloned(),
            })
            .collect()
    }
}

/// `address_set`, with a non-overlapping pool reported as an empty campaign.
fn campaign_addresses(subnet: &Subnet, pool: &Pool) -> Result<Option<AddressRange>> {
    match address_set(subnet, pool) {
        Ok(range) => Ok(Some(range)),
        Err(ScanError::SubnetNotFound(reason)) => {
            tracing::warn!(subnet = %subnet.cidr, reason, "no addresses to scan");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Address -> inventory item through the store's IP address records.
///
/// The first record for an address decides, even when it carries no
/// inventory id.
struct Correlation<'a> {
    by_address: HashMap<Ipv4Addr, Option<&'a InventoryItem>>,
}

impl<'a> Correlation<'a> {
    fn new(records: &[IpAddressRecord], inventory: &'a [InventoryItem]) -> Self {
        let items: HashMap<&str, &InventoryItem> =
            inventory.iter().map(|item| (item.id.as_str(), item)).collect();
        let mut by_address = HashMap::new();
        for record in records {
            let Ok(address) = parse_ipv4(&record.address) else {
                continue;
            };
            let item = record
                .network_inventory_id
                .as_deref()
                .and_then(|id| items.get(id).copied());
            by_address.entry(address).or_insert(item);
        }
        Self { by_address }
    }

    fn lookup(&self, address: Ipv4Addr) -> Option<&'a InventoryItem> {
        self.by_address.get(&address).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(cidr: &str) -> Subnet {
        Subnet {
            id: "s1".into(),
            cidr: cidr.into(),
            name: String::new(),
        }
    }

    fn pool(start: &str, end: &str) -> Pool {
        Pool {
            id: "p1".into(),
            start_ip: start.into(),
            end_ip: end.into(),
            subnet_id: "s1".into(),
        }
    }

    #[test]
    fn address_set_clips_and_rejects() {
        let range = address_set(&subnet("10.0.0.0/30"), &pool("10.0.0.2", "10.0.0.9")).unwrap();
        assert_eq!(range.to_string(), "10.0.0.2-10.0.0.3");
        assert!(matches!(
            address_set(&subnet("10.0.1.0/24"), &pool("10.0.0.2", "10.0.0.9")),
            Err(ScanError::SubnetNotFound(_))
        ));
        assert!(matches!(
            address_set(&subnet("10.0.0.0/24"), &pool("10.0.0.9", "10.0.0.2")),
            Err(ScanError::InvertedRange { .. })
        ));
        let mut other = pool("10.0.0.1", "10.0.0.2");
        other.subnet_id = "s2".into();
        assert!(matches!(
            address_set(&subnet("10.0.0.0/24"), &other),
            Err(ScanError::SubnetNotFound(_))
        ));
    }

    #[test]
    fn stop_clears_flag_and_old_ticket_leaves_new_one() {
        let engine = Engine::builder(EngineConfig::default())
            .echo(Arc::new(crate::ping::SystemPing))
            .build();
        let first = engine.start(CampaignKind::PortScan).unwrap();
        assert!(matches!(
            engine.start(CampaignKind::PortScan),
            Err(ScanError::AlreadyInProgress(CampaignKind::PortScan))
        ));
        assert!(engine.start(CampaignKind::SnmpDiscovery).is_ok());

        assert!(engine.stop(CampaignKind::PortScan));
        assert!(first.is_cancelled());
        let second = engine.start(CampaignKind::PortScan).unwrap();
        drop(first);
        assert!(engine.is_running(CampaignKind::PortScan));
        drop(second);
        assert!(!engine.is_running(CampaignKind::PortScan));
        assert!(!engine.stop(CampaignKind::PortScan));
    }

    #[test]
    fn correlation_by_inventory_id() {
        let records = vec![
            IpAddressRecord {
                address: "10.0.0.1".into(),
                network_inventory_id: Some("inv-1".into()),
            },
            IpAddressRecord {
                address: "10.0.0.2".into(),
                network_inventory_id: None,
            },
        ];
        let inventory = vec![InventoryItem {
            id: "inv-1".into(),
            mac_address: String::new(),
            manufacturer_id: "m".into(),
            model_id: "md".into(),
            product_id: "pr".into(),
        }];
        let correlate = Correlation::new(&records, &inventory);
        assert_eq!(
            correlate.lookup(Ipv4Addr::new(10, 0, 0, 1)).map(|i| i.model_id.as_str()),
            Some("md")
        );
        assert!(correlate.lookup(Ipv4Addr::new(10, 0, 0, 2)).is_none());
    }

    #[test]
    fn first_record_for_an_address_decides() {
        let record = |address: &str, id: Option<&str>| IpAddressRecord {
            address: address.into(),
            network_inventory_id: id.map(str::to_string),
        };
        let item = |id: &str, model: &str| InventoryItem {
            id: id.into(),
            mac_address: String::new(),
            manufacturer_id: "m".into(),
            model_id: model.into(),
            product_id: "pr".into(),
        };
        let records = vec![
            record("10.0.0.1", Some("inv-1")),
            record("10.0.0.1", Some("inv-2")),
            record("10.0.0.2", None),
            record("10.0.0.2", Some("inv-2")),
        ];
        let inventory = vec![item("inv-1", "first"), item("inv-2", "second")];
        let correlate = Correlation::new(&records, &inventory);
        assert_eq!(
            correlate.lookup(Ipv4Addr::new(10, 0, 0, 1)).map(|i| i.model_id.as_str()),
            Some("first")
        );
        assert!(correlate.lookup(Ipv4Addr::new(10, 0, 0, 2)).is_none());
    }
}

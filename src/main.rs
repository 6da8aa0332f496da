use std::fs::File;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

use netdisco_rs::address::{self, CidrBlock};
use netdisco_rs::campaign::{oid_records, CallbackSink, DiscoveryRequest, Engine, NullSink};
use netdisco_rs::config::EngineConfig;
use netdisco_rs::mib::MibIndex;
use netdisco_rs::ports;
use netdisco_rs::server::{self, AppState};
use netdisco_rs::snmp::SnmpCredential;
use netdisco_rs::types::{
    CampaignKind, DeviceStatus, HostPorts, InventoryItem, IpAddressRecord, OidRecord, Pool,
    ProbeResult, ScanEvent, Subnet,
};

/// netdisco-rs: ICMP sweeps, TCP connect scans, SNMP discovery and MIB lookups.
#[derive(Debug, Parser)]
#[command(name = "netdisco-rs", version, long_about = None)]
struct Cli {
    /// Config file prefix; `<prefix>.toml` is read when present.
    #[arg(short, long, default_value = "netdisco", global = true)]
    config: String,

    /// Write results as pretty JSON to this path.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// A subnet block and the pool range inside it. Both default to the
/// first detected local /24.
#[derive(Debug, Clone, Args)]
struct PoolArgs {
    /// Subnet CIDR, e.g. 192.168.1.0/24.
    #[arg(long)]
    subnet: Option<String>,

    /// First pool address; defaults to the start of the subnet.
    #[arg(long)]
    start: Option<String>,

    /// Last pool address; defaults to the end of the subnet.
    #[arg(long)]
    end: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Echo one address.
    Ping {
        address: Ipv4Addr,
        #[arg(short, long)]
        attempts: Option<u32>,
    },
    /// Reachability sweep over a pool.
    Sweep {
        #[command(flatten)]
        pool: PoolArgs,
        #[arg(short, long)]
        attempts: Option<u32>,
    },
    /// TCP connect scan.
    Ports {
        /// Addresses, `a-b` ranges or CIDR blocks. Defaults to the local /24s.
        #[arg(long, num_args = 1..)]
        targets: Vec<String>,

        /// Port list such as `22,80,8000-8010`.
        #[arg(long)]
        ports: Option<String>,

        /// Path to ports list file (one port or range per line).
        #[arg(long)]
        ports_file: Option<PathBuf>,

        /// Max concurrent TCP connect attempts per host.
        #[arg(long)]
        concurrency: Option<usize>,

        /// Socket connect timeout in milliseconds.
        #[arg(long = "timeout-ms")]
        timeout_ms: Option<u64>,
    },
    /// SNMP discovery over a pool.
    Discover {
        #[command(flatten)]
        pool: PoolArgs,

        /// v2c read community; repeat to try several in order.
        #[arg(long)]
        community: Vec<String>,

        /// JSON file with a list of credentials, tried after `--community`.
        #[arg(long)]
        credentials: Option<PathBuf>,

        /// JSON file with `ip_addresses` and `inventory` for correlation.
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// MIB files used to name discovered OIDs.
        #[arg(long)]
        mib: Vec<PathBuf>,
    },
    /// Print the neighbor (ARP) table.
    Arp,
    /// Reverse-resolve addresses.
    Rdns {
        #[arg(required = true)]
        addresses: Vec<Ipv4Addr>,
    },
    /// Load a MIB file and query it.
    Mib {
        file: PathBuf,
        /// Print the name path for this OID.
        #[arg(long)]
        translate: Option<String>,
        /// Print the OID following this one.
        #[arg(long)]
        next: Option<String>,
    },
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    ip_addresses: Vec<IpAddressRecord>,
    #[serde(default)]
    inventory: Vec<InventoryItem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let mut config = EngineConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config))?;
    if let Command::Ports {
        concurrency,
        timeout_ms,
        ..
    } = &cli.command
    {
        if let Some(c) = concurrency {
            config.port_concurrency = *c;
        }
        if let Some(t) = timeout_ms {
            config.port_timeout_ms = *t;
        }
    }

    let engine = Arc::new(Engine::new(config));
    stop_on_ctrl_c(engine.clone());
    let output = cli.output.as_deref();

    match cli.command {
        Command::Ping { address, attempts } => {
            let attempts = attempts.unwrap_or(engine.config().ping_attempts);
            let sink = CallbackSink(|event: ScanEvent| {
                if let ScanEvent::Result(ProbeResult::Ping { attempt, .. }) = event {
                    match attempt.latency_ms {
                        Some(ms) => println!("{address}: online {ms} ms"),
                        None => println!("{address}: offline"),
                    }
                }
            });
            let out = engine.ping_host(address, attempts, &sink).await?;
            write_output(output, &out)?;
        }
        Command::Sweep { pool, attempts } => {
            let (subnet, pool) = resolve_pool(&pool)?;
            let attempts = attempts.unwrap_or(engine.config().ping_attempts);
            let hosts = engine
                .run_reachability(&subnet, &pool, attempts, &NullSink)
                .await?;
            let online: Vec<Ipv4Addr> = hosts
                .iter()
                .filter(|h| h.status() == DeviceStatus::Online)
                .map(|h| h.address)
                .collect();
            println!("Online: {} of {}", online.len(), hosts.len());
            for device in engine.describe_devices(&online).await {
                println!(
                    "  {:<15}  {:<17}  {}",
                    device.address,
                    device.mac_address.as_deref().unwrap_or("-"),
                    device.hostname.as_deref().unwrap_or("-")
                );
            }
            write_output(output, &hosts)?;
        }
        Command::Ports {
            targets,
            ports: port_spec,
            ports_file,
            ..
        } => {
            let targets = if targets.is_empty() {
                local_cidrs()?.iter().map(ToString::to_string).collect()
            } else {
                targets
            };
            let port_list = match (port_spec, ports_file) {
                (Some(spec), _) => ports::parse_ports_str(&spec)?,
                (None, Some(path)) => ports::load_ports_from_path(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                (None, None) => ports::full_range(),
            };
            let hosts = engine
                .run_port_scan(&targets, &port_list, &NullSink)
                .await?;
            print_results_table(&hosts);
            write_output(output, &hosts)?;
        }
        Command::Discover {
            pool,
            community,
            credentials,
            inventory,
            mib,
        } => {
            let (subnet, pool) = resolve_pool(&pool)?;
            let mut creds: Vec<SnmpCredential> =
                community.iter().map(|c| SnmpCredential::community(c)).collect();
            if let Some(path) = credentials {
                creds.extend(read_json::<Vec<SnmpCredential>>(&path)?);
            }
            if creds.is_empty() {
                creds.push(SnmpCredential::community("public"));
            }
            let inventory: InventoryFile = match inventory {
                Some(path) => read_json(&path)?,
                None => InventoryFile::default(),
            };
            let mut index = MibIndex::new();
            for path in &mib {
                load_mib(&mut index, path)?;
            }

            let request = DiscoveryRequest {
                subnet,
                pool,
                credentials: creds,
                ip_addresses: inventory.ip_addresses,
                inventory: inventory.inventory,
            };
            let sink = CallbackSink(|event: ScanEvent| {
                if let ScanEvent::Result(ProbeResult::Snmp(d)) = event {
                    println!("{}: {} OIDs", d.address, d.oids.len());
                }
            });
            let summary = engine.run_snmp_discovery(&request, &sink).await?;
            println!(
                "Scanned {}, responded {}, unregistered {}, failed {}",
                summary.scanned, summary.responded, summary.unregistered, summary.failed
            );
            let records: Vec<OidRecord> = summary
                .discoveries
                .iter()
                .flat_map(|d| oid_records(&index, d))
                .collect();
            write_output(output, &records)?;
        }
        Command::Arp => {
            let table = engine.arp().resolve_arp_table().await;
            let mut rows: Vec<_> = table.iter().collect();
            rows.sort();
            for (ip, mac) in rows {
                println!("{ip:<15}  {mac}");
            }
            write_output(output, &table)?;
        }
        Command::Rdns { addresses } => {
            let names = engine.names().batch_reverse_lookup(&addresses).await;
            for ip in &addresses {
                let name = names.get(ip).cloned().flatten();
                println!("{ip:<15}  {}", name.as_deref().unwrap_or("-"));
            }
            write_output(output, &names)?;
        }
        Command::Mib {
            file,
            translate,
            next,
        } => {
            let mut index = MibIndex::new();
            let set = load_mib(&mut index, &file)?;
            if let Some(oid) = translate {
                println!("{}", index.translate(&oid));
            }
            if let Some(oid) = next {
                println!("{}", index.get_next_oid(&oid).unwrap_or_default());
            }
            write_output(output, &index.records(&set))?;
        }
        Command::Serve { bind } => {
            server::spawn_server(&bind, AppState::new(engine)).await?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// First Ctrl-C stops whatever is running; the campaign winds down at its
/// next address boundary.
fn stop_on_ctrl_c(engine: Arc<Engine>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            for kind in CampaignKind::ALL {
                engine.stop(kind);
            }
        }
    });
}

fn local_cidrs() -> Result<Vec<CidrBlock>> {
    let cidrs = address::detect_local_cidrs()?;
    if cidrs.is_empty() {
        bail!("no local IPv4 network detected; pass a subnet explicitly");
    }
    for cidr in &cidrs {
        tracing::info!(cidr = %cidr, "detected local network");
    }
    Ok(cidrs)
}

fn resolve_pool(args: &PoolArgs) -> Result<(Subnet, Pool)> {
    let block = match args.subnet.as_deref() {
        Some(cidr) => cidr.parse::<CidrBlock>()?,
        None => local_cidrs()?[0],
    };
    let range = block.as_range();
    let subnet = Subnet {
        id: String::new(),
        cidr: block.to_string(),
        name: String::new(),
    };
    let pool = Pool {
        id: String::new(),
        start_ip: args.start.clone().unwrap_or_else(|| range.start().to_string()),
        end_ip: args.end.clone().unwrap_or_else(|| range.end().to_string()),
        subnet_id: String::new(),
    };
    Ok((subnet, pool))
}

fn load_mib(index: &mut MibIndex, path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let set = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let report = index.load(&set, &text);
    if !report.unresolved.is_empty() {
        tracing::warn!(set = %set, unresolved = ?report.unresolved, "MIB has unresolved parents");
    }
    Ok(set)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))
}

fn print_results_table(hosts: &[HostPorts]) {
    let ip_w = 15usize;
    let port_w = 5usize;
    let status_w = 8usize;
    let open: usize = hosts.iter().map(|h| h.open_ports().count()).sum();

    println!("\nOpen ports: {} (hosts scanned: {})", open, hosts.len());
    println!(
        "{:<ip_w$}  {:>port_w$}  {:<status_w$}  {}",
        "ip", "port", "status", "service"
    );
    println!("{:-<ip_w$}  {:-<port_w$}  {:-<status_w$}  {:-<7}", "", "", "", "");
    for host in hosts {
        for e in host.open_ports() {
            println!(
                "{:<ip_w$}  {:>port_w$}  {:<status_w$}  {}",
                host.address.to_string(),
                e.port,
                e.status.to_string(),
                e.service.as_deref().unwrap_or("")
            );
        }
    }
}

fn write_output<T: Serialize>(path: Option<&Path>, results: &T) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, results)?;
    tracing::info!(path = %path.display(), "wrote JSON results");
    Ok(())
}

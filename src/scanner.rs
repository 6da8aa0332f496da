use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::ports::service_name;
use crate::types::{now_iso_like, HostPorts, PortScanEntry, PortStatus};

/// Opens a TCP connection and reports how the attempt ended.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: SocketAddr, timeout: Duration) -> PortStatus;
}

/// Plain `tokio::net::TcpStream` connect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddr, timeout: Duration) -> PortStatus {
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            // The stream is dropped here, which closes the socket.
            Ok(Ok(_stream)) => PortStatus::Open,
            Ok(Err(e)) => classify_connect_error(&e),
            Err(_) => PortStatus::Filtered,
        }
    }
}

/// Refused means closed, a kernel-level timeout means filtered, anything else is an error.
pub fn classify_connect_error(e: &io::Error) -> PortStatus {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => PortStatus::Closed,
        io::ErrorKind::TimedOut => PortStatus::Filtered,
        _ => PortStatus::Error,
    }
}

/// TCP connect scanner for a single host.
///
/// - Limits concurrent socket attempts using a `Semaphore`.
/// - Uses `tokio::time::timeout` to bound connect time per socket.
/// - Results come back sorted by port with a best-known service name attached.
#[derive(Clone)]
pub struct PortScanner {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    concurrency: usize,
}

impl PortScanner {
    pub fn new(timeout: Duration, concurrency: usize) -> Self {
        Self::with_connector(Arc::new(TcpConnector), timeout, concurrency)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            connector,
            timeout,
            concurrency: concurrency.clamp(1, 5_000),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn scan_ports(&self, ip: Ipv4Addr, ports: &[u16]) -> Vec<PortScanEntry> {
        self.scan_ports_with_cancel(ip, ports, &CancellationToken::new())
            .await
    }

    /// Probe `ports` on `ip`. Ports not yet dispatched when `cancel` fires are
    /// left out of the result.
    pub async fn scan_ports_with_cancel(
        &self,
        ip: Ipv4Addr,
        ports: &[u16],
        cancel: &CancellationToken,
    ) -> Vec<PortScanEntry> {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for &port in ports {
            if cancel.is_cancelled() {
                break;
            }
            let Ok(permit) = sem.clone().acquire_owned().await else {
                break;
            };
            let connector = self.connector.clone();
            let timeout = self.timeout;

            set.spawn(async move {
                let _permit = permit; // keep permit until task completes
                let addr = SocketAddr::new(ip.into(), port);
                let status = connector.connect(addr, timeout).await;
                tracing::trace!(address = %ip, port, status = %status, "port probed");
                PortScanEntry {
                    port,
                    status,
                    service: service_name(port).map(str::to_string),
                }
            });
        }

        let mut entries = Vec::with_capacity(ports.len());
        while let Some(res) = set.join_next().await {
            match res {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(address = %ip, error = %e, "port probe task failed"),
            }
        }
        entries.sort_by_key(|e| e.port);
        entries
    }

    pub async fn scan_host(&self, ip: Ipv4Addr, ports: &[u16], cancel: &CancellationToken) -> HostPorts {
        let ports = self.scan_ports_with_cancel(ip, ports, cancel).await;
        HostPorts {
            address: ip,
            ports,
            timestamp: now_iso_like(),
        }
    }
}

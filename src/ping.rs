//! Reachability probing: sequential echo round-trips against one address.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::process::Command;

use crate::error::{Result, ScanError};
use crate::types::PingAttempt;

/// One echo request/reply exchange. Returns the measured round-trip.
#[async_trait]
pub trait EchoProber: Send + Sync {
    async fn echo(&self, ip: Ipv4Addr, seq: u16, timeout: Duration) -> Result<Duration>;
}

/// Raw ICMP echo through `surge-ping`.
pub struct IcmpEcho {
    client: Client,
    identifier: u16,
}

impl IcmpEcho {
    pub fn new() -> Result<Self> {
        let client = Client::new(&Config::default())?;
        Ok(Self {
            client,
            identifier: rand_id(),
        })
    }
}

#[async_trait]
impl EchoProber for IcmpEcho {
    async fn echo(&self, ip: Ipv4Addr, seq: u16, timeout: Duration) -> Result<Duration> {
        let payload = [0u8; 56];
        let mut pinger = self
            .client
            .pinger(IpAddr::V4(ip), PingIdentifier(self.identifier))
            .await;
        pinger.timeout(timeout);
        match pinger.ping(PingSequence(seq), &payload).await {
            Ok((_packet, rtt)) => Ok(rtt),
            Err(surge_ping::SurgeError::Timeout { .. }) => Err(ScanError::Timeout(timeout)),
            Err(e) => Err(ScanError::Unreachable(format!("{ip}: {e}"))),
        }
    }
}

/// Shells out to the system `ping` for hosts where raw sockets are not permitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPing;

#[async_trait]
impl EchoProber for SystemPing {
    async fn echo(&self, ip: Ipv4Addr, _seq: u16, timeout: Duration) -> Result<Duration> {
        let secs = timeout.as_secs().max(1).to_string();
        let target = ip.to_string();
        let mut cmd = Command::new("ping");
        if cfg!(target_os = "windows") {
            let millis = timeout.as_millis().max(1).to_string();
            cmd.args(["-n", "1", "-w", millis.as_str(), target.as_str()]);
        } else {
            cmd.args(["-c", "1", "-W", secs.as_str(), target.as_str()]);
        }
        cmd.kill_on_drop(true);

        let start = Instant::now();
        // Allow the process a little slack on top of its own deadline.
        let status = tokio::time::timeout(timeout + Duration::from_secs(1), cmd.output())
            .await
            .map_err(|_| ScanError::Timeout(timeout))??
            .status;
        if status.success() {
            Ok(start.elapsed())
        } else {
            Err(ScanError::Unreachable(ip.to_string()))
        }
    }
}

/// Raw ICMP when the socket can be opened, the `ping` command otherwise.
pub fn default_prober() -> Arc<dyn EchoProber> {
    match IcmpEcho::new() {
        Ok(icmp) => Arc::new(icmp),
        Err(e) => {
            tracing::warn!(error = %e, "ICMP socket unavailable, falling back to system ping");
            Arc::new(SystemPing)
        }
    }
}

/// Runs `attempts` sequential echoes against one address.
#[derive(Clone)]
pub struct ReachabilityProbe {
    prober: Arc<dyn EchoProber>,
    timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(prober: Arc<dyn EchoProber>, timeout: Duration) -> Self {
        Self { prober, timeout }
    }

    /// Every attempt is made even after failures. `on_attempt` receives the
    /// attempt and the completed fraction after each round-trip.
    pub async fn probe<F>(&self, ip: Ipv4Addr, attempts: u32, mut on_attempt: F) -> Vec<PingAttempt>
    where
        F: FnMut(&PingAttempt, f64),
    {
        let mut results = Vec::with_capacity(attempts as usize);
        for i in 0..attempts {
            let seq = (i % u32::from(u16::MAX)) as u16;
            let attempt = match self.prober.echo(ip, seq, self.timeout).await {
                Ok(rtt) => PingAttempt::online(rtt.as_millis() as u64),
                Err(e) => {
                    tracing::debug!(address = %ip, attempt = i + 1, error = %e, "echo failed");
                    PingAttempt::offline()
                }
            };
            on_attempt(&attempt, f64::from(i + 1) / f64::from(attempts));
            results.push(attempt);
        }
        results
    }
}

/// Generates a ping identifier from the clock.
fn rand_id() -> u16 {
    let duration = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    ((duration.as_nanos() % 0xFFFF) as u16).wrapping_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceStatus;
    use std::sync::atomic::{AtomicU16, Ordering};

    /// Answers every other request.
    struct Flaky(AtomicU16);

    #[async_trait]
    impl EchoProber for Flaky {
        async fn echo(&self, ip: Ipv4Addr, _seq: u16, timeout: Duration) -> Result<Duration> {
            if self.0.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Ok(Duration::from_millis(4))
            } else if ip.is_loopback() {
                Err(ScanError::Timeout(timeout))
            } else {
                Err(ScanError::Unreachable(ip.to_string()))
            }
        }
    }

    #[tokio::test]
    async fn every_attempt_recorded() {
        let probe = ReachabilityProbe::new(Arc::new(Flaky(AtomicU16::new(0))), Duration::from_millis(50));
        let mut fractions = Vec::new();
        let out = probe
            .probe(Ipv4Addr::LOCALHOST, 4, |_, f| fractions.push(f))
            .await;
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], PingAttempt::online(4));
        assert_eq!(out[1].status, DeviceStatus::Offline);
        assert_eq!(out[1].latency_ms, None);
        assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
    }
}

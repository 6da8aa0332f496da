//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Tunables for every probe and campaign.
///
/// Loaded from the `[engine]` table of `netdisco.toml` or
/// `NETDISCO__ENGINE__*` environment variables. Every field has a default.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Echo round-trips per address.
    #[serde(default = "default_ping_attempts")]
    pub ping_attempts: u32,

    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// TCP connect timeout per port.
    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    /// Maximum in-flight connects against one address.
    #[serde(default = "default_port_concurrency")]
    pub port_concurrency: usize,

    #[serde(default = "default_snmp_port")]
    pub snmp_port: u16,

    /// Timeout of a single SNMP request.
    #[serde(default = "default_snmp_timeout_ms")]
    pub snmp_timeout_ms: u64,

    /// Wall-clock ceiling for one subtree walk.
    #[serde(default = "default_snmp_walk_timeout_secs")]
    pub snmp_walk_timeout_secs: u64,

    /// Root OID walked during discovery.
    #[serde(default = "default_snmp_walk_root")]
    pub snmp_walk_root: String,

    /// OIDs per GET when fetching many at once.
    #[serde(default = "default_snmp_get_chunk")]
    pub snmp_get_chunk: usize,

    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    #[serde(default = "default_dns_concurrency")]
    pub dns_concurrency: usize,

    /// Emit results for SNMP responders with no inventory match.
    #[serde(default)]
    pub report_unregistered: bool,
}

impl EngineConfig {
    /// Load from `<file_prefix>.toml` (optional) layered with environment
    /// variables. A missing `[engine]` section yields the defaults.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("NETDISCO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match cfg.get::<EngineConfig>("engine") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(EngineConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    pub fn snmp_timeout(&self) -> Duration {
        Duration::from_millis(self.snmp_timeout_ms)
    }

    pub fn snmp_walk_timeout(&self) -> Duration {
        Duration::from_secs(self.snmp_walk_timeout_secs)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }
}

fn default_ping_attempts() -> u32 {
    5
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_port_timeout_ms() -> u64 {
    1000
}

fn default_port_concurrency() -> usize {
    256
}

fn default_snmp_port() -> u16 {
    161
}

fn default_snmp_timeout_ms() -> u64 {
    5000
}

fn default_snmp_walk_timeout_secs() -> u64 {
    60
}

fn default_snmp_walk_root() -> String {
    "1.3.6.1".to_string()
}

fn default_snmp_get_chunk() -> usize {
    16
}

fn default_dns_timeout_ms() -> u64 {
    2000
}

fn default_dns_concurrency() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ping_attempts: default_ping_attempts(),
            ping_timeout_ms: default_ping_timeout_ms(),
            port_timeout_ms: default_port_timeout_ms(),
            port_concurrency: default_port_concurrency(),
            snmp_port: default_snmp_port(),
            snmp_timeout_ms: default_snmp_timeout_ms(),
            snmp_walk_timeout_secs: default_snmp_walk_timeout_secs(),
            snmp_walk_root: default_snmp_walk_root(),
            snmp_get_chunk: default_snmp_get_chunk(),
            dns_timeout_ms: default_dns_timeout_ms(),
            dns_concurrency: default_dns_concurrency(),
            report_unregistered: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.ping_attempts, 5);
        assert_eq!(config.snmp_walk_timeout(), Duration::from_secs(60));
        assert_eq!(config.snmp_walk_root, "1.3.6.1");
        assert!(!config.report_unregistered);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[engine]\nping_attempts = 2\nreport_unregistered = true").unwrap();
        let prefix = file.path().with_extension("");
        let prefix = prefix.to_string_lossy();

        let config = EngineConfig::load(&prefix).unwrap();
        assert_eq!(config.ping_attempts, 2);
        assert!(config.report_unregistered);
        assert_eq!(config.port_timeout_ms, 1000);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let config = EngineConfig::load("/nonexistent/netdisco-test").unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}

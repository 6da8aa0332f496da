//! Error types for the discovery engine.

use std::time::Duration;

use thiserror::Error;

use crate::types::CampaignKind;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("invalid CIDR block: {0}")]
    InvalidCidr(String),

    #[error("inverted address range: {start} is above {end}")]
    InvertedRange { start: String, end: String },

    #[error("invalid port specification: {0}")]
    InvalidPorts(String),

    #[error("invalid OID: {0}")]
    InvalidOid(String),

    #[error("a {0} campaign is already in progress")]
    AlreadyInProgress(CampaignKind),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("SNMP transport error: {0}")]
    Transport(String),

    #[error("subnet not found: {0}")]
    SubnetNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ScanError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

//! Library crate for netdisco-rs: address arithmetic, probes, SNMP transport,
//! MIB indexing and the campaign engine that ties them together.
pub mod address;
pub mod campaign;
pub mod config;
pub mod error;
pub mod mib;
pub mod ping;
pub mod ports;
pub mod resolve;
pub mod scanner;
pub mod server;
pub mod snmp;
pub mod types;

pub use campaign::{Engine, EngineBuilder, ProgressSink};
pub use config::EngineConfig;
pub use error::{Result, ScanError};

//! SNMP request/response transport.
//!
//! [`SnmpTransport`] opens one session per operation through a
//! [`SessionFactory`], applies the request and walk timeouts, and always
//! closes the session before returning. The production factory talks to
//! agents through `snmp2`; tests plug in an in-memory agent.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snmp2::{AsyncSession, Oid, Value};

use crate::config::EngineConfig;
use crate::error::{Result, ScanError};
use crate::mib::parse_oid;

/// Credentials tried against an agent. Discovery walks the list in order.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "version", rename_all = "snake_case")]
pub enum SnmpCredential {
    V2 {
        read_community: String,
        #[serde(default)]
        write_community: String,
    },
    V3 {
        user_name: String,
        /// `MD5`, `SHA`, `SHA224`, `SHA256`, `SHA384` or `SHA512`.
        auth_method: String,
        auth_key: String,
        /// `DES`, `AES`, `AES192` or `AES256`; empty for authNoPriv.
        #[serde(default)]
        priv_method: String,
        #[serde(default)]
        priv_key: String,
    },
}

impl SnmpCredential {
    pub fn community(read_community: &str) -> Self {
        Self::V2 {
            read_community: read_community.to_string(),
            write_community: String::new(),
        }
    }
}

// Keys and communities stay out of logs.
impl fmt::Debug for SnmpCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2 { .. } => f.write_str("SnmpCredential::V2"),
            Self::V3 { user_name, .. } => write!(f, "SnmpCredential::V3({user_name})"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SnmpValue {
    Boolean(bool),
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(String),
    IpAddress(Ipv4Addr),
    Counter32(u64),
    Unsigned32(u64),
    Timeticks(u64),
    Counter64(u64),
    Opaque(Vec<u8>),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    Other(String),
}

impl SnmpValue {
    /// `noSuchObject`, `noSuchInstance` and `endOfMibView`.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::OctetString(bytes) | Self::Opaque(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) if !s.chars().any(|c| c.is_control() && !c.is_whitespace()) => {
                    f.write_str(s.trim_end_matches('\0'))
                }
                _ => {
                    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                    f.write_str(&hex.join(":"))
                }
            },
            Self::ObjectIdentifier(oid) => f.write_str(oid),
            Self::IpAddress(ip) => write!(f, "{ip}"),
            Self::Counter32(n) | Self::Unsigned32(n) | Self::Timeticks(n) | Self::Counter64(n) => {
                write!(f, "{n}")
            }
            Self::Null => f.write_str(""),
            Self::NoSuchObject => f.write_str("noSuchObject"),
            Self::NoSuchInstance => f.write_str("noSuchInstance"),
            Self::EndOfMibView => f.write_str("endOfMibView"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: String,
    pub value: SnmpValue,
}

impl VarBind {
    pub fn new(oid: impl Into<String>, value: SnmpValue) -> Self {
        Self {
            oid: oid.into(),
            value,
        }
    }
}

/// An open conversation with one agent.
#[async_trait]
pub trait SnmpSession: Send {
    async fn get(&mut self, oids: &[String]) -> Result<Vec<VarBind>>;
    async fn get_next(&mut self, oid: &str) -> Result<VarBind>;
    async fn set(&mut self, bindings: &[VarBind]) -> Result<Vec<VarBind>>;
    async fn close(&mut self) {}
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// `write` selects the write community for v2 credentials.
    async fn open(
        &self,
        target: SocketAddr,
        credential: &SnmpCredential,
        write: bool,
    ) -> Result<Box<dyn SnmpSession>>;
}

fn to_snmp_oid(oid: &str) -> Result<Oid<'static>> {
    let segments: Vec<u64> = parse_oid(oid)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScanError::InvalidOid(oid.to_string()))?
        .into_iter()
        .map(u64::from)
        .collect();
    Oid::from(&segments[..]).map_err(|e| ScanError::InvalidOid(format!("{oid}: {e:?}")))
}

fn from_snmp_value(value: &Value<'_>) -> SnmpValue {
    match value {
        Value::Boolean(b) => SnmpValue::Boolean(*b),
        Value::Integer(n) => SnmpValue::Integer((*n).into()),
        Value::OctetString(bytes) => SnmpValue::OctetString(bytes.to_vec()),
        Value::ObjectIdentifier(oid) => SnmpValue::ObjectIdentifier(oid.to_string()),
        Value::IpAddress(octets) => SnmpValue::IpAddress(Ipv4Addr::from(*octets)),
        Value::Counter32(n) => SnmpValue::Counter32((*n).into()),
        Value::Unsigned32(n) => SnmpValue::Unsigned32((*n).into()),
        Value::Timeticks(n) => SnmpValue::Timeticks((*n).into()),
        Value::Counter64(n) => SnmpValue::Counter64(*n),
        Value::Opaque(bytes) => SnmpValue::Opaque(bytes.to_vec()),
        Value::Null => SnmpValue::Null,
        Value::NoSuchObject => SnmpValue::NoSuchObject,
        Value::NoSuchInstance => SnmpValue::NoSuchInstance,
        Value::EndOfMibView => SnmpValue::EndOfMibView,
        other => SnmpValue::Other(format!("{other:?}")),
    }
}

fn to_snmp_value(value: &SnmpValue) -> Result<Value<'_>> {
    let narrow = |n: u64| {
        u32::try_from(n).map_err(|_| ScanError::Transport(format!("value {n} out of range")))
    };
    Ok(match value {
        SnmpValue::Boolean(b) => Value::Boolean(*b),
        SnmpValue::Integer(n) => Value::Integer(*n),
        SnmpValue::OctetString(bytes) => Value::OctetString(bytes),
        SnmpValue::ObjectIdentifier(oid) => Value::ObjectIdentifier(to_snmp_oid(oid)?),
        SnmpValue::IpAddress(ip) => Value::IpAddress(ip.octets()),
        SnmpValue::Counter32(n) => Value::Counter32(narrow(*n)?),
        SnmpValue::Unsigned32(n) => Value::Unsigned32(narrow(*n)?),
        SnmpValue::Timeticks(n) => Value::Timeticks(narrow(*n)?),
        SnmpValue::Counter64(n) => Value::Counter64(*n),
        SnmpValue::Opaque(bytes) => Value::Opaque(bytes),
        SnmpValue::Null => Value::Null,
        other => {
            return Err(ScanError::Transport(format!(
                "cannot set a value of {other:?}"
            )))
        }
    })
}

fn transport_error(e: snmp2::Error) -> ScanError {
    ScanError::Transport(format!("{e:?}"))
}

/// Sessions backed by `snmp2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Snmp2Factory;

#[async_trait]
impl SessionFactory for Snmp2Factory {
    async fn open(
        &self,
        target: SocketAddr,
        credential: &SnmpCredential,
        write: bool,
    ) -> Result<Box<dyn SnmpSession>> {
        let addr = target.to_string();
        match credential {
            SnmpCredential::V2 {
                read_community,
                write_community,
            } => {
                let community = if write && !write_community.is_empty() {
                    write_community
                } else {
                    read_community
                };
                let session = AsyncSession::new_v2c(&addr, community.as_bytes(), 0)
                    .await
                    .map_err(|e| ScanError::Transport(format!("{target}: {e:?}")))?;
                Ok(Box::new(Snmp2Session { inner: session }))
            }
            SnmpCredential::V3 {
                user_name,
                auth_method,
                auth_key,
                priv_method,
                priv_key,
            } => open_v3(&addr, user_name, auth_method, auth_key, priv_method, priv_key).await,
        }
    }
}

#[cfg(feature = "snmpv3")]
async fn open_v3(
    addr: &str,
    user_name: &str,
    auth_method: &str,
    auth_key: &str,
    priv_method: &str,
    priv_key: &str,
) -> Result<Box<dyn SnmpSession>> {
    use snmp2::v3::{Auth, AuthProtocol, Cipher, Security};

    let auth_protocol = match auth_method.to_ascii_uppercase().as_str() {
        "MD5" => AuthProtocol::Md5,
        "SHA" | "SHA1" => AuthProtocol::Sha1,
        "SHA224" => AuthProtocol::Sha224,
        "SHA256" => AuthProtocol::Sha256,
        "SHA384" => AuthProtocol::Sha384,
        "SHA512" => AuthProtocol::Sha512,
        other => {
            return Err(ScanError::Transport(format!(
                "unsupported auth method {other}"
            )))
        }
    };
    let mut security = Security::new(user_name.as_bytes(), auth_key.as_bytes())
        .with_auth_protocol(auth_protocol);
    if !priv_method.is_empty() {
        let cipher = match priv_method.to_ascii_uppercase().as_str() {
            "DES" => Cipher::Des,
            "AES" | "AES128" => Cipher::Aes128,
            "AES192" => Cipher::Aes192,
            "AES256" => Cipher::Aes256,
            other => {
                return Err(ScanError::Transport(format!(
                    "unsupported privacy method {other}"
                )))
            }
        };
        security = security.with_auth(Auth::AuthPriv {
            cipher,
            privacy_password: priv_key.as_bytes().to_vec(),
        });
    }

    let mut session = AsyncSession::new_v3(addr, 0, security)
        .await
        .map_err(|e| ScanError::Transport(format!("{addr}: {e:?}")))?;
    session.init().await.map_err(transport_error)?;
    Ok(Box::new(Snmp2Session { inner: session }))
}

#[cfg(not(feature = "snmpv3"))]
async fn open_v3(
    _addr: &str,
    _user_name: &str,
    _auth_method: &str,
    _auth_key: &str,
    _priv_method: &str,
    _priv_key: &str,
) -> Result<Box<dyn SnmpSession>> {
    Err(ScanError::Transport(
        "built without SNMPv3 support".to_string(),
    ))
}

struct Snmp2Session {
    inner: AsyncSession,
}

#[async_trait]
impl SnmpSession for Snmp2Session {
    async fn get(&mut self, oids: &[String]) -> Result<Vec<VarBind>> {
        let oids = oids
            .iter()
            .map(|o| to_snmp_oid(o))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&Oid<'_>> = oids.iter().collect();
        let response = self.inner.get_many(&refs).await.map_err(transport_error)?;
        Ok(response
            .varbinds
            .map(|(oid, value)| VarBind::new(oid.to_string(), from_snmp_value(&value)))
            .collect())
    }

    async fn get_next(&mut self, oid: &str) -> Result<VarBind> {
        let oid = to_snmp_oid(oid)?;
        let mut response = self.inner.getnext(&oid).await.map_err(transport_error)?;
        response
            .varbinds
            .next()
            .map(|(oid, value)| VarBind::new(oid.to_string(), from_snmp_value(&value)))
            .ok_or_else(|| ScanError::Transport("empty GETNEXT response".to_string()))
    }

    async fn set(&mut self, bindings: &[VarBind]) -> Result<Vec<VarBind>> {
        let oids = bindings
            .iter()
            .map(|b| to_snmp_oid(&b.oid))
            .collect::<Result<Vec<_>>>()?;
        let values = bindings
            .iter()
            .map(|b| to_snmp_value(&b.value))
            .collect::<Result<Vec<_>>>()?;
        let pairs: Vec<(&Oid<'_>, Value<'_>)> = oids.iter().zip(values).collect();
        let response = self.inner.set(&pairs).await.map_err(transport_error)?;
        Ok(response
            .varbinds
            .map(|(oid, value)| VarBind::new(oid.to_string(), from_snmp_value(&value)))
            .collect())
    }
}

/// True when `oid` lies strictly below `root`.
pub fn oid_in_subtree(root: &[u32], oid: &[u32]) -> bool {
    oid.len() > root.len() && oid.starts_with(root)
}

/// Per-operation SNMP client.
#[derive(Clone)]
pub struct SnmpTransport {
    factory: Arc<dyn SessionFactory>,
    port: u16,
    request_timeout: Duration,
    walk_timeout: Duration,
    get_chunk: usize,
}

impl SnmpTransport {
    pub fn new(factory: Arc<dyn SessionFactory>, config: &EngineConfig) -> Self {
        Self {
            factory,
            port: config.snmp_port,
            request_timeout: config.snmp_timeout(),
            walk_timeout: config.snmp_walk_timeout(),
            get_chunk: config.snmp_get_chunk.max(1),
        }
    }

    async fn open(
        &self,
        ip: Ipv4Addr,
        credential: &SnmpCredential,
        write: bool,
    ) -> Result<Box<dyn SnmpSession>> {
        let target = SocketAddr::new(IpAddr::V4(ip), self.port);
        tokio::time::timeout(
            self.request_timeout,
            self.factory.open(target, credential, write),
        )
        .await
        .map_err(|_| ScanError::Timeout(self.request_timeout))?
    }

    async fn request<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| ScanError::Timeout(self.request_timeout))?
    }

    pub async fn get(&self, ip: Ipv4Addr, credential: &SnmpCredential, oid: &str) -> Result<VarBind> {
        let mut session = self.open(ip, credential, false).await?;
        let result = self.request(session.get(&[oid.to_string()])).await;
        session.close().await;
        result?
            .into_iter()
            .next()
            .ok_or_else(|| ScanError::Transport(format!("no value for {oid}")))
    }

    pub async fn get_next(
        &self,
        ip: Ipv4Addr,
        credential: &SnmpCredential,
        oid: &str,
    ) -> Result<VarBind> {
        let mut session = self.open(ip, credential, false).await?;
        let result = self.request(session.get_next(oid)).await;
        session.close().await;
        result
    }

    /// GET many OIDs over one session, a chunk per request.
    pub async fn get_all(
        &self,
        ip: Ipv4Addr,
        credential: &SnmpCredential,
        oids: &[String],
    ) -> Result<Vec<VarBind>> {
        let mut session = self.open(ip, credential, false).await?;
        let mut out = Vec::with_capacity(oids.len());
        let mut result = Ok(());
        for chunk in oids.chunks(self.get_chunk) {
            match self.request(session.get(chunk)).await {
                Ok(bindings) => out.extend(bindings),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        session.close().await;
        result.map(|()| out)
    }

    /// Walk everything below `root` with repeated GETNEXT.
    ///
    /// Stops when a returned OID leaves the subtree, on `endOfMibView`, or
    /// when an agent answers with an OID that does not advance. A walk cut
    /// short by the walk timeout or a request error fails as a whole, so a
    /// caller never mistakes a truncated table for a complete one. The
    /// session is closed either way.
    pub async fn get_subtree(
        &self,
        ip: Ipv4Addr,
        credential: &SnmpCredential,
        root: &str,
    ) -> Result<Vec<VarBind>> {
        let root_segments = parse_oid(root).ok_or_else(|| ScanError::InvalidOid(root.to_string()))?;
        let mut session = self.open(ip, credential, false).await?;
        let mut collected = Vec::new();
        let outcome = tokio::time::timeout(
            self.walk_timeout,
            self.walk(session.as_mut(), &root_segments, &mut collected),
        )
        .await;
        session.close().await;

        match outcome {
            Ok(Ok(())) => Ok(collected),
            Ok(Err(e)) => {
                tracing::warn!(address = %ip, collected = collected.len(), error = %e, "walk ended early");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(address = %ip, collected = collected.len(), "walk timed out");
                Err(ScanError::Timeout(self.walk_timeout))
            }
        }
    }

    async fn walk(
        &self,
        session: &mut dyn SnmpSession,
        root: &[u32],
        collected: &mut Vec<VarBind>,
    ) -> Result<()> {
        let mut current = root.to_vec();
        loop {
            let cursor = current
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".");
            let binding = self.request(session.get_next(&cursor)).await?;
            if binding.value.is_exception() {
                return Ok(());
            }
            let Some(next) = parse_oid(&binding.oid) else {
                return Err(ScanError::InvalidOid(binding.oid));
            };
            if !oid_in_subtree(root, &next) {
                return Ok(());
            }
            if next <= current {
                tracing::warn!(oid = %binding.oid, "agent returned a non-increasing OID");
                return Ok(());
            }
            current = next;
            collected.push(binding);
        }
    }

    /// SET over a session opened with the write credential.
    pub async fn set(
        &self,
        ip: Ipv4Addr,
        credential: &SnmpCredential,
        bindings: &[VarBind],
    ) -> Result<Vec<VarBind>> {
        let mut session = self.open(ip, credential, true).await?;
        let result = self.request(session.set(bindings)).await;
        session.close().await;
        result
    }
}

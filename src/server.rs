use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tower_http::trace::TraceLayer;

use crate::{
    campaign::{address_set, oid_records, CampaignTicket, DiscoveryRequest, Engine},
    error::ScanError,
    mib::{LoadReport, MibIndex},
    ports,
    types::{
        CampaignKind, CampaignOutcome, DiscoveredDevice, DiscoverySummary, OidRecord, PingAttempt,
        Pool, ProbeResult, ScanEvent, SnmpDiscovery, Subnet,
    },
};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug, Default)]
struct ServerState {
    /// Generation of the latest run per kind; events from older runs are dropped.
    current: HashMap<CampaignKind, u64>,
    campaigns: HashMap<CampaignKind, Progress>,
    results: HashMap<CampaignKind, Vec<ProbeResult>>,
    summary: Option<DiscoverySummary>,
    mib: MibIndex,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl From<CampaignOutcome> for Phase {
    fn from(outcome: CampaignOutcome) -> Self {
        match outcome {
            CampaignOutcome::Completed => Phase::Completed,
            CampaignOutcome::Cancelled => Phase::Cancelled,
            CampaignOutcome::Failed => Phase::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    phase: Phase,
    fraction: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub kind: CampaignKind,
    pub phase: Phase,
    pub running: bool,
    pub progress: f64,
    pub results: usize,
}

impl ServerState {
    fn is_current(&self, kind: CampaignKind, generation: u64) -> bool {
        self.current.get(&kind) == Some(&generation)
    }

    /// Fold an event from run `generation` of `kind`, unless a newer run replaced it.
    fn apply_from(&mut self, kind: CampaignKind, generation: u64, event: ScanEvent) {
        if self.is_current(kind, generation) {
            self.apply(event);
        } else {
            tracing::debug!(kind = %kind, generation, "dropping event from superseded run");
        }
    }

    fn apply(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Started { kind } => {
                self.campaigns.insert(
                    kind,
                    Progress {
                        phase: Phase::Running,
                        fraction: 0.0,
                    },
                );
                self.results.insert(kind, Vec::new());
            }
            ScanEvent::Progress { kind, fraction } => {
                self.campaigns.entry(kind).or_default().fraction = fraction;
            }
            ScanEvent::Result(result) => {
                self.results.entry(result.kind()).or_default().push(result);
            }
            ScanEvent::Stopped { kind, outcome } => {
                self.campaigns.entry(kind).or_default().phase = outcome.into();
            }
        }
    }
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            inner: Arc::new(RwLock::new(ServerState::default())),
        }
    }

    /// A sink whose events are folded into the shared state by a background task.
    ///
    /// The run's generation becomes the current one for `kind` before any of
    /// its events can arrive, so a drain left over from an earlier run can no
    /// longer touch this run's progress or results.
    async fn event_sink(&self, ticket: &CampaignTicket) -> mpsc::UnboundedSender<ScanEvent> {
        let (kind, generation) = (ticket.kind(), ticket.generation());
        self.inner.write().await.current.insert(kind, generation);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                inner.write().await.apply_from(kind, generation, event);
            }
        });
        tx
    }

    async fn status(&self, kind: CampaignKind) -> Status {
        let s = self.inner.read().await;
        let progress = s.campaigns.get(&kind).copied().unwrap_or_default();
        Status {
            kind,
            phase: progress.phase,
            running: self.engine.is_running(kind),
            progress: progress.fraction,
            results: s.results.get(&kind).map_or(0, Vec::len),
        }
    }
}

/// Library errors mapped onto HTTP status codes.
pub struct ApiError(ScanError);

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            ScanError::AlreadyInProgress(_) => StatusCode::CONFLICT,
            ScanError::InvalidAddress(_)
            | ScanError::InvalidCidr(_)
            | ScanError::InvertedRange { .. }
            | ScanError::InvalidPorts(_)
            | ScanError::InvalidOid(_)
            | ScanError::Config(_) => StatusCode::BAD_REQUEST,
            ScanError::SubnetNotFound(_) => StatusCode::NOT_FOUND,
            ScanError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ScanError::Unreachable(_) | ScanError::Transport(_) => StatusCode::BAD_GATEWAY,
            ScanError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (code, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct PingRequest {
    pub address: String,
    #[serde(default)]
    pub attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ReachabilityRequest {
    pub subnet: Subnet,
    pub pool: Pool,
    #[serde(default)]
    pub attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PortScanRequest {
    pub targets: Vec<String>,
    /// Explicit ports; takes precedence over `port_spec`.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// `1-1024,3389` style list. Both empty means the full range.
    #[serde(default)]
    pub port_spec: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DevicesRequest {
    pub addresses: Vec<Ipv4Addr>,
}

#[derive(Debug, Deserialize)]
pub struct OidQuery {
    pub oid: String,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub oid: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct NextResponse {
    pub oid: String,
    pub next: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/ping", post(post_ping))
        .route("/scan/reachability", post(post_reachability))
        .route("/scan/ports", post(post_port_scan))
        .route("/scan/snmp", post(post_snmp_discovery))
        .route("/scan/{kind}/stop", post(post_stop))
        .route("/results/{kind}", get(get_results))
        .route("/results/snmp/summary", get(get_summary))
        .route("/arp", get(get_arp))
        .route("/devices", post(post_devices))
        .route("/mib/translate", get(get_translate))
        .route("/mib/next", get(get_next_oid))
        .route("/mib/records", post(post_discovery_records))
        .route("/mib/{name}", put(put_mib).delete(delete_mib))
        .route("/mib/{name}/records", get(get_mib_records))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, state: AppState) -> Result<()> {
    let app = router(state);
    tracing::info!(bind, "serving API");
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let mut out = Vec::with_capacity(CampaignKind::ALL.len());
    for kind in CampaignKind::ALL {
        out.push(app.status(kind).await);
    }
    (StatusCode::OK, Json(out))
}

async fn get_results(
    State(app): State<AppState>,
    Path(kind): Path<CampaignKind>,
) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.results.get(&kind) {
        Some(res) => (StatusCode::OK, Json(res.clone())).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn get_summary(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.summary.as_ref() {
        Some(summary) => (StatusCode::OK, Json(summary.clone())).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn post_stop(
    State(app): State<AppState>,
    Path(kind): Path<CampaignKind>,
) -> impl IntoResponse {
    if app.engine.stop(kind) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn post_ping(
    State(app): State<AppState>,
    Json(req): Json<PingRequest>,
) -> ApiResult<Json<Vec<PingAttempt>>> {
    let address = crate::address::parse_ipv4(&req.address)?;
    let attempts = req.attempts.unwrap_or(app.engine.config().ping_attempts);
    let ticket = app.engine.start(CampaignKind::Reachability)?;
    let sink = app.event_sink(&ticket).await;
    let out = app.engine.ping_host_with(ticket, address, attempts, &sink).await?;
    Ok(Json(out))
}

/// Pool/subnet input errors are rejected up front; a pool outside its
/// subnet still starts and finishes with no results.
fn validate_pool(subnet: &Subnet, pool: &Pool) -> ApiResult<()> {
    match address_set(subnet, pool) {
        Ok(_) | Err(ScanError::SubnetNotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn post_reachability(
    State(app): State<AppState>,
    Json(req): Json<ReachabilityRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_pool(&req.subnet, &req.pool)?;
    let ticket = app.engine.start(CampaignKind::Reachability)?;
    let sink = app.event_sink(&ticket).await;
    let engine = app.engine.clone();
    tokio::spawn(async move {
        let attempts = req.attempts.unwrap_or(engine.config().ping_attempts);
        if let Err(e) = engine
            .reachability_with(ticket, &req.subnet, &req.pool, attempts, &sink)
            .await
        {
            tracing::warn!(error = %e, "reachability campaign failed");
        }
    });
    Ok((StatusCode::ACCEPTED, Json(app.status(CampaignKind::Reachability).await)))
}

async fn post_port_scan(
    State(app): State<AppState>,
    Json(req): Json<PortScanRequest>,
) -> ApiResult<impl IntoResponse> {
    let port_list = if !req.ports.is_empty() {
        req.ports
    } else if let Some(spec) = req.port_spec.as_deref() {
        ports::parse_ports_str(spec)?
    } else {
        ports::full_range()
    };
    let ticket = app.engine.start(CampaignKind::PortScan)?;
    let sink = app.event_sink(&ticket).await;
    let engine = app.engine.clone();
    let targets = req.targets;
    tokio::spawn(async move {
        if let Err(e) = engine
            .port_scan_with(ticket, &targets, &port_list, &sink)
            .await
        {
            tracing::warn!(error = %e, "port scan failed");
        }
    });
    Ok((StatusCode::ACCEPTED, Json(app.status(CampaignKind::PortScan).await)))
}

async fn post_snmp_discovery(
    State(app): State<AppState>,
    Json(req): Json<DiscoveryRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_pool(&req.subnet, &req.pool)?;
    let ticket = app.engine.start(CampaignKind::SnmpDiscovery)?;
    let sink = app.event_sink(&ticket).await;
    let engine = app.engine.clone();
    let inner = app.inner.clone();
    let generation = ticket.generation();
    tokio::spawn(async move {
        match engine.snmp_discovery_with(ticket, &req, &sink).await {
            Ok(summary) => {
                let mut s = inner.write().await;
                if s.is_current(CampaignKind::SnmpDiscovery, generation) {
                    s.summary = Some(summary);
                }
            }
            Err(e) => tracing::warn!(error = %e, "SNMP discovery failed"),
        }
    });
    Ok((StatusCode::ACCEPTED, Json(app.status(CampaignKind::SnmpDiscovery).await)))
}

async fn get_arp(State(app): State<AppState>) -> Json<HashMap<Ipv4Addr, String>> {
    Json(app.engine.arp().resolve_arp_table().await)
}

async fn post_devices(
    State(app): State<AppState>,
    Json(req): Json<DevicesRequest>,
) -> Json<Vec<DiscoveredDevice>> {
    Json(app.engine.describe_devices(&req.addresses).await)
}

async fn put_mib(
    State(app): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Json<LoadReport> {
    let text = String::from_utf8_lossy(&body);
    let report = app.inner.write().await.mib.load(&name, &text);
    Json(report)
}

async fn delete_mib(State(app): State<AppState>, Path(name): Path<String>) -> StatusCode {
    if app.inner.write().await.mib.remove(&name) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn get_mib_records(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let s = app.inner.read().await;
    if s.mib.tree(&name).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    (StatusCode::OK, Json(s.mib.records(&name))).into_response()
}

async fn get_translate(
    State(app): State<AppState>,
    Query(q): Query<OidQuery>,
) -> Json<TranslateResponse> {
    let name = app.inner.read().await.mib.translate(&q.oid);
    Json(TranslateResponse { oid: q.oid, name })
}

async fn get_next_oid(
    State(app): State<AppState>,
    Query(q): Query<OidQuery>,
) -> Json<NextResponse> {
    let next = app.inner.read().await.mib.get_next_oid(&q.oid);
    Json(NextResponse { oid: q.oid, next })
}

/// Turn one discovery into named store rows.
async fn post_discovery_records(
    State(app): State<AppState>,
    Json(discovery): Json<SnmpDiscovery>,
) -> Json<Vec<OidRecord>> {
    let s = app.inner.read().await;
    Json(oid_records(&s.mib, &discovery))
}

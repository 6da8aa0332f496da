use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use netdisco_rs::server::{router, AppState};
use netdisco_rs::types::CampaignKind;
use netdisco_rs::{Engine, EngineConfig};

const MIB: &str = "system OBJECT IDENTIFIER ::= { mib-2 1 }
sysName OBJECT-TYPE
    SYNTAX DisplayString
    MAX-ACCESS read-write
    STATUS current
    DESCRIPTION \"Node name.\"
    ::= { system 5 }
";

fn app() -> (Arc<Engine>, Router) {
    let engine = Arc::new(Engine::new(EngineConfig::default()));
    let app = router(AppState::new(engine.clone()));
    (engine, app)
}

async fn send(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn status_lists_every_kind_idle() {
    let (_, app) = app();
    let (status, body) = send(&app, Method::GET, "/api/status", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let kinds = body.as_array().unwrap();
    assert_eq!(kinds.len(), 3);
    assert!(kinds.iter().all(|k| k["phase"] == "idle" && k["running"] == false));
}

#[tokio::test]
async fn loaded_mib_answers_translate_and_next() {
    let (_, app) = app();
    let (status, report) = send(&app, Method::PUT, "/api/mib/SNMPv2-MIB", Body::from(MIB)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["nodes"], 2);

    let (_, translated) = send(
        &app,
        Method::GET,
        "/api/mib/translate?oid=1.3.6.1.2.1.1.5.0",
        Body::empty(),
    )
    .await;
    assert_eq!(translated["name"], "1.3.6.1.2.1.system.sysName.0");

    let (_, next) = send(&app, Method::GET, "/api/mib/next?oid=1.3.6.1.2.1.1", Body::empty()).await;
    assert_eq!(next["next"], "1.3.6.1.2.1.1.5");

    let (status, records) =
        send(&app, Method::GET, "/api/mib/SNMPv2-MIB/records", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records[1]["name"], "sysName");

    let (status, _) = send(&app, Method::GET, "/api/mib/OTHER/records", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleted_mib_stops_translating() {
    let (_, app) = app();
    send(&app, Method::PUT, "/api/mib/SNMPv2-MIB", Body::from(MIB)).await;

    let (status, _) = send(&app, Method::DELETE, "/api/mib/SNMPv2-MIB", Body::empty()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, "/api/mib/SNMPv2-MIB/records", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, translated) = send(
        &app,
        Method::GET,
        "/api/mib/translate?oid=1.3.6.1.2.1.1.5.0",
        Body::empty(),
    )
    .await;
    assert_ne!(translated["name"], "1.3.6.1.2.1.system.sysName.0");

    let (status, _) = send(&app, Method::DELETE, "/api/mib/SNMPv2-MIB", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stop_when_idle_is_not_found() {
    let (_, app) = app();
    let (status, _) = send(&app, Method::POST, "/api/scan/port_scan/stop", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn busy_kind_conflicts_and_stop_frees_it() {
    let (engine, app) = app();
    let held = engine.start(CampaignKind::PortScan).unwrap();

    let body = Body::from(r#"{"targets":["127.0.0.1"],"ports":[9]}"#);
    let (status, _) = send(&app, Method::POST, "/api/scan/ports", body).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::POST, "/api/scan/port_scan/stop", Body::empty()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(held.is_cancelled());
    assert!(!engine.is_running(CampaignKind::PortScan));
}

#[tokio::test]
async fn malformed_inputs_are_bad_requests() {
    let (_, app) = app();
    let body = Body::from(
        r#"{"subnet":{"cidr":"10.0.0.0/40"},"pool":{"start_ip":"10.0.0.1","end_ip":"10.0.0.5"}}"#,
    );
    let (status, body) = send(&app, Method::POST, "/api/scan/reachability", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("10.0.0.0/40"));

    let body = Body::from(r#"{"targets":["10.0.0.1"],"port_spec":"90-80"}"#);
    let (status, _) = send(&app, Method::POST, "/api/scan/ports", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn results_empty_before_any_campaign() {
    let (_, app) = app();
    let (status, _) = send(&app, Method::GET, "/api/results/snmp_discovery", Body::empty()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::GET, "/api/results/snmp/summary", Body::empty()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

//! Router-level API tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::util::ServiceExt;

use shadow_analyzer::{engine, EngineContext};
use shadow_core::{Config, FlowEvent, Protocol};
use shadow_server::{router, state::AppState};

fn test_app() -> (Router, Arc<EngineContext>) {
    let mut config = Config::from_env();
    config.storage.inmemory = true;
    config.defense.probe_enabled = false;
    let ctx = EngineContext::build(config, Vec::new()).unwrap();
    let state = AppState::new(ctx.clone(), "demo");
    (router::build_router(state), ctx)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, value)
}

fn ai_flow() -> FlowEvent {
    FlowEvent {
        timestamp: chrono::Utc::now(),
        source_ip: "10.0.0.5".parse().unwrap(),
        destination_ip: "104.18.32.7".parse().unwrap(),
        source_port: 51000,
        destination_port: 443,
        protocol: Protocol::Https,
        bytes_sent: 2_048,
        bytes_received: 8_192,
        ja3_hash: None,
        metadata: [("sni".to_string(), "api.openai.com".to_string())]
            .into_iter()
            .collect(),
    }
}

#[tokio::test]
async fn status_reports_demo_mode() {
    let (app, _ctx) = test_app();
    let (status, body) = get_json(&app, "/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "demo");
    assert_eq!(body["version"], "0.1.0");
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn processed_flow_shows_up_in_discovery_and_alerts() {
    let (app, ctx) = test_app();
    engine::process_event(&ctx, &ai_flow()).await;

    let (status, nodes) = get_json(&app, "/v1/discovery/nodes").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = nodes
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"10.0.0.5"));
    assert!(ids.contains(&"api.openai.com"));

    let (_, edges) = get_json(&app, "/v1/discovery/edges").await;
    assert_eq!(edges.as_array().unwrap().len(), 1);

    let (_, alerts) = get_json(&app, "/v1/policy/alerts").await;
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["severity"], "HIGH");
    assert_eq!(alerts[0]["category"], "LLM");

    let (_, scores) = get_json(&app, "/v1/discovery/risk-scores").await;
    assert_eq!(scores[0]["ip"], "10.0.0.5");
}

#[tokio::test]
async fn rules_crud_roundtrip() {
    let (app, _ctx) = test_app();

    let draft = serde_json::json!({
        "name": "Block ChatGPT",
        "action": "block",
        "service": "openai",
        "severity": "HIGH",
    });
    let (status, rule) = send_json(&app, "POST", "/v1/policy/rules", Some(draft.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let id = rule["id"].as_str().unwrap().to_string();
    assert_eq!(rule["enabled"], true);

    // Duplicate name + service conflicts.
    let (status, _) = send_json(&app, "POST", "/v1/policy/rules", Some(draft)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Toggle twice restores the original enabled flag.
    let toggle_uri = format!("/v1/policy/rules/{id}/toggle");
    let (status, toggled) = send_json(&app, "PUT", &toggle_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["enabled"], false);
    let (_, toggled) = send_json(&app, "PUT", &toggle_uri, None).await;
    assert_eq!(toggled["enabled"], true);

    let (status, _) = send_json(&app, "DELETE", &format!("/v1/policy/rules/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send_json(&app, "DELETE", &format!("/v1/policy/rules/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, rules) = get_json(&app, "/v1/policy/rules").await;
    assert!(rules.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn blocklist_endpoints() {
    let (app, ctx) = test_app();

    let (status, blocked) = get_json(&app, "/v1/policy/blocked").await;
    assert_eq!(status, StatusCode::OK);
    assert!(blocked.as_array().unwrap().is_empty());

    ctx.responses
        .block("198.51.100.9".parse().unwrap(), None, "test", None);
    let (_, blocked) = get_json(&app, "/v1/policy/blocked").await;
    assert_eq!(blocked.as_array().unwrap().len(), 1);
    assert_eq!(blocked[0]["ip"], "198.51.100.9");

    let (status, _) = send_json(&app, "POST", "/v1/policy/unblock/not-an-ip", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(&app, "POST", "/v1/policy/unblock/203.0.113.1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app, "POST", "/v1/policy/unblock/198.51.100.9", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, blocked) = get_json(&app, "/v1/policy/blocked").await;
    assert!(blocked.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn analytics_views_answer_on_empty_state() {
    let (app, _ctx) = test_app();
    for uri in [
        "/v1/policy/timeline",
        "/v1/policy/profiles",
        "/v1/policy/sessions",
        "/v1/policy/dlp",
        "/v1/policy/killchain",
        "/v1/policy/compliance",
        "/v1/policy/briefing",
        "/v1/policy/report",
        "/v1/discovery/traffic-stats",
    ] {
        let (status, _) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::OK, "endpoint {uri}");
    }

    let (_, killchain) = get_json(&app, "/v1/policy/killchain").await;
    assert_eq!(killchain["chain_completion"], 0);
    assert_eq!(killchain["stages"].as_array().unwrap().len(), 5);

    let (_, timeline) = get_json(&app, "/v1/policy/timeline").await;
    assert_eq!(timeline["buckets"].as_array().unwrap().len(), 60);
}

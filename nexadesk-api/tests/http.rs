use assert_json_diff::assert_json_eq;
use reqwest::StatusCode;
use serde_json::{json, Value};
use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

use nexadesk_common::lifecycle::{ExitIntent, LifecycleState, ShutdownSignal};

mod common;
use common::*;

#[tokio::test]
async fn it_serves_probes() {
    let server = ServerHandle::for_config(default_config()).await;

    let res = server.get("/healthz").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_json_eq!(res.json::<Value>().await.unwrap(), json!({"ok": true}));

    let res = server.get("/readyz").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_json_eq!(res.json::<Value>().await.unwrap(), json!({"ready": true}));
}

#[tokio::test]
async fn it_reports_version_from_config() {
    let server = ServerHandle::for_config(default_config()).await;

    let res = server.get("/version").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_json_eq!(
        res.json::<Value>().await.unwrap(),
        json!({
            "service": "nexadesk-api",
            "version": "9.9.9",
            "gitSha": "deadbeef",
            "env": "test",
        })
    );
}

#[tokio::test]
async fn it_answers_ping_with_iso_timestamp() {
    let server = ServerHandle::for_config(default_config()).await;

    let res = server.get("/api/ping").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["pong"], json!(true));

    let ts = body["ts"].as_str().expect("ts should be a string");
    assert!(OffsetDateTime::parse(ts, &Iso8601::DEFAULT).is_ok(), "{ts}");
}

#[tokio::test]
async fn it_returns_not_found_for_unknown_routes() {
    let server = ServerHandle::for_config(default_config()).await;

    let res = reqwest::Client::new()
        .post(server.url("/does/not/exist"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_json_eq!(
        res.json::<Value>().await.unwrap(),
        json!({"error": "not_found"})
    );
}

#[tokio::test]
async fn it_exposes_prometheus_text() {
    let server = ServerHandle::for_config(default_config()).await;
    server.get("/api/ping").await;

    let res = server.get("/metrics").await;
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res.headers()["content-type"].to_str().unwrap().to_owned();
    assert!(content_type.starts_with("text/plain"), "{content_type}");

    let text = res.text().await.unwrap();
    let samples: Vec<&str> = text
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
    assert!(samples.iter().any(|line| line.starts_with("nexadesk_")));
    for line in samples {
        let (_, value) = line.rsplit_once(' ').expect("sample has a value");
        assert!(value.parse::<f64>().is_ok(), "bad sample: {line}");
    }
    assert!(text.contains(
        "nexadesk_http_requests_total{method=\"GET\",route=\"/api/ping\",status_code=\"200\"} 1"
    ));
}

#[tokio::test]
async fn it_stops_being_ready_before_closing() {
    let mut server = ServerHandle::for_config(default_config()).await;

    assert!(server.coordinator.on_signal(ShutdownSignal::Terminate));
    assert!(!server.coordinator.on_signal(ShutdownSignal::Interrupt));

    // Either the listener is already gone or it must answer not ready.
    if let Ok(res) = reqwest::Client::new()
        .get(server.url("/readyz"))
        .send()
        .await
    {
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    assert_eq!(server.join().await, ExitIntent::clean());
    assert_eq!(server.lifecycle().state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn it_exits_cleanly_on_terminate_every_time() {
    // The shutdown token and the finished server race in the main loop.
    for _ in 0..20 {
        let mut server = ServerHandle::for_config(default_config()).await;
        assert_eq!(server.get("/readyz").await.status(), StatusCode::OK);

        assert!(server.coordinator.on_signal(ShutdownSignal::Terminate));
        assert!(!server.coordinator.on_signal(ShutdownSignal::Interrupt));

        assert_eq!(server.join().await, ExitIntent::clean());
        assert_eq!(server.lifecycle().state(), LifecycleState::Stopped);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use lan_sweep::server::{router, AppState, Message, ServerConfig};
use lan_sweep::types::ProgressState;
use tokio::net::TcpListener;
use tower::ServiceExt;

fn test_config(catalog: PathBuf) -> ServerConfig {
    ServerConfig {
        catalog_path: catalog,
        probe_timeout: Duration::from_millis(500),
        discover_local: false,
        ..ServerConfig::default()
    }
}

fn scan_request(custom_ips: &str) -> Request<Body> {
    Request::post("/scan")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("customIPs={custom_ips}")))
        .unwrap()
}

async fn status(app: &Router) -> ProgressState {
    let res = app
        .clone()
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn write_catalog(tag: &str, ports: &[u16]) -> PathBuf {
    let entries: Vec<String> = ports
        .iter()
        .enumerate()
        .map(|(i, p)| format!(r#"{{"name": "p{i}", "port": {p}, "protocol": "tcp"}}"#))
        .collect();
    let path = std::env::temp_dir().join(format!("lan-sweep-{tag}-{}.json", std::process::id()));
    std::fs::write(&path, format!(r#"{{"common_ports": [{}]}}"#, entries.join(","))).unwrap();
    path
}

fn event_kinds(text: &str) -> Vec<&str> {
    text.lines().filter_map(|l| l.strip_prefix("event: ")).collect()
}

async fn wait_idle(app: &Router) -> ProgressState {
    for _ in 0..100 {
        let s = status(app).await;
        if !s.is_running {
            return s;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("scan never finished");
}

#[tokio::test]
async fn status_is_idle_before_first_run() {
    let app = router(AppState::new(test_config("missing.json".into())));
    assert_eq!(status(&app).await, ProgressState::default());
}

#[tokio::test]
async fn start_is_rejected_while_running() {
    let state = AppState::new(test_config("missing.json".into()));
    let app = router(state.clone());

    assert!(state.tracker().try_start());
    state.tracker().set_total(7);
    let before = status(&app).await;

    let res = app.clone().oneshot(scan_request("127.0.0.1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let msg: Message = serde_json::from_slice(&body).unwrap();
    assert_eq!(msg.message, "Scan already in progress");
    assert_eq!(status(&app).await, before);

    state.tracker().finish();
}

#[tokio::test]
async fn start_without_form_body_uses_no_extra_targets() {
    let app = router(AppState::new(test_config("missing.json".into())));
    let res = app
        .clone()
        .oneshot(Request::post("/scan").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let s = wait_idle(&app).await;
    assert_eq!((s.total, s.current), (0, 0));
}

#[tokio::test]
async fn events_stream_results_then_complete() {
    let (ssh, http) = {
        let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        (a.local_addr().unwrap().port(), b.local_addr().unwrap().port())
    };
    let catalog = std::env::temp_dir().join(format!("lan-sweep-server-{}.json", std::process::id()));
    std::fs::write(
        &catalog,
        format!(
            r#"{{"common_ports": [
                {{"name": "ssh", "port": {ssh}, "protocol": "tcp"}},
                {{"name": "http", "port": {http}, "protocol": "tcp"}}
            ]}}"#
        ),
    )
    .unwrap();

    let app = router(AppState::new(test_config(catalog.clone())));

    // The stream may attach before the run exists.
    let events = app
        .clone()
        .oneshot(Request::get("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(events.status(), StatusCode::OK);
    assert_eq!(
        events.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let res = app.clone().oneshot(scan_request("127.0.0.1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let msg: Message = serde_json::from_slice(&body).unwrap();
    assert_eq!(msg.message, "Scan started");

    let raw = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(events.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    std::fs::remove_file(&catalog).ok();
    let text = String::from_utf8(raw.to_vec()).unwrap();

    let kinds: Vec<&str> = text
        .lines()
        .filter_map(|l| l.strip_prefix("event: "))
        .collect();
    assert_eq!(kinds, vec!["message", "message", "complete"]);

    let results: Vec<serde_json::Value> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .filter(|d| d.starts_with('{'))
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["ip"], "127.0.0.1");
    assert_eq!(results[0]["port"]["name"], "ssh");
    assert_eq!(results[0]["port"]["port"], ssh);
    assert_eq!(results[0]["status"], "closed");
    assert_eq!(results[1]["port"]["name"], "http");
    assert!(text.contains("data: Scan complete"));

    let s = wait_idle(&app).await;
    assert_eq!((s.total, s.current, s.is_running), (2, 2, false));
    assert!(s.started_at.is_some());
}

#[tokio::test]
async fn reconnect_after_disconnect_loses_no_results() {
    let mut ports = Vec::new();
    for _ in 0..40 {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        ports.push(l.local_addr().unwrap().port());
    }
    let catalog = write_catalog("reconnect", &ports);
    let app = router(AppState::new(test_config(catalog.clone())));

    let res = app.clone().oneshot(scan_request("127.0.0.1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    // Every result is now queued and the run is closed.
    let s = wait_idle(&app).await;
    std::fs::remove_file(&catalog).ok();
    assert_eq!((s.total, s.current), (40, 40));

    // Read a single frame, then hang up.
    let first = app
        .clone()
        .oneshot(Request::get("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let mut frames = first.into_body().into_data_stream();
    let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let frame = String::from_utf8(frame.to_vec()).unwrap();
    assert_eq!(event_kinds(&frame), vec!["message"]);
    drop(frames);

    let second = app
        .clone()
        .oneshot(Request::get("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let raw = tokio::time::timeout(
        Duration::from_secs(5),
        to_bytes(second.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(raw.to_vec()).unwrap();
    let kinds = event_kinds(&text);

    assert_eq!(kinds.last(), Some(&"complete"));
    let resumed = kinds.iter().filter(|k| **k == "message").count();
    assert_eq!(resumed, 39);
    assert!(text.contains(&format!(r#""port":{}"#, ports[1])));
}

use chrono::{Duration as ChronoDuration, Utc};
use notes_hub::api::{self, AppState};
use notes_hub_core::analytics::{AccessLogStore, AccessRecordInput, LogQuery};
use notes_hub_core::{AnalyticsConfig, NoteLibrary, NotesConfig};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

async fn spawn_server(root: &std::path::Path) -> (SocketAddr, AppState, tokio::task::JoinHandle<()>) {
    let notes = root.join("notes");
    std::fs::create_dir_all(notes.join("guide")).unwrap();
    std::fs::write(notes.join("guide/intro.md"), "# Intro\nwelcome aboard").unwrap();

    let store = AccessLogStore::open(AnalyticsConfig::new(root.join("data/analytics.db"))).unwrap();
    let state = AppState::new(
        NoteLibrary::new(NotesConfig::new(&notes)),
        store,
        Duration::from_secs(5),
    );
    let app = api::router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .into_future()
        .await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, state, server)
}

#[tokio::test]
async fn server_health_endpoint() {
    let tempdir = tempfile::tempdir().unwrap();
    let (addr, _, server) = spawn_server(tempdir.path()).await;

    let resp = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.text().await.unwrap(), "OK");

    server.abort();
}

#[tokio::test]
async fn note_reads_are_logged_with_the_peer_address() {
    let tempdir = tempfile::tempdir().unwrap();
    let (addr, state, server) = spawn_server(tempdir.path()).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{}/api/notes/guide/intro.md", addr))
        .header("user-agent", "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0")
        .header("cookie", "visitor_id=reader-1")
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["content"], "# Intro\nwelcome aboard");

    // the write is detached from the response, poll until it lands
    let mut page = state.access_log.query(&LogQuery::default()).unwrap();
    for _ in 0..50 {
        if page.total > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        page = state.access_log.query(&LogQuery::default()).unwrap();
    }
    assert_eq!(page.total, 1);
    let record = &page.records[0];
    assert_eq!(record.path, "/api/notes/guide/intro.md");
    assert_eq!(record.ip_address, "127.0.0.1");
    assert_eq!(record.visitor_id.as_deref(), Some("reader-1"));
    assert_eq!(record.browser, "Firefox");
    assert_eq!(record.os, "Linux");

    let overview: serde_json::Value = reqwest::get(format!("http://{}/api/admin/analytics/overview", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["data"]["total_visits"], 1);
    assert_eq!(overview["data"]["identified_visitors"], 1);

    server.abort();
}

#[tokio::test]
async fn admin_requests_are_not_logged() {
    let tempdir = tempfile::tempdir().unwrap();
    let (addr, state, server) = spawn_server(tempdir.path()).await;
    state
        .access_log
        .append(AccessRecordInput {
            path: "/api/notes".into(),
            ip_address: "10.1.1.1".into(),
            created_at: Some(Utc::now() - ChronoDuration::days(1)),
            ..Default::default()
        })
        .unwrap();

    for _ in 0..3 {
        let resp = reqwest::get(format!("http://{}/api/admin/analytics/logs", addr))
            .await
            .unwrap();
        assert!(resp.status().is_success());
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let body: serde_json::Value = reqwest::get(format!("http://{}/api/admin/analytics/logs?ip=10.1", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 1);
    assert_eq!(state.access_log.query(&LogQuery::default()).unwrap().total, 1);

    server.abort();
}

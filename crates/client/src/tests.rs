use super::*;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use wzmap_engine::{MapFile, PipelineError};
use wzmap_protocol::{Command, SetMapDetailsRequest};

#[derive(Default)]
struct FakeWarzone {
    feed: Value,
    upload_reply: Value,
    feed_queries: Vec<HashMap<String, String>>,
    uploads: Vec<SetMapDetailsRequest>,
}

type Shared = Arc<Mutex<FakeWarzone>>;

async fn game_feed(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut s = state.lock().unwrap();
    s.feed_queries.push(q);
    Json(s.feed.clone())
}

async fn set_map_details(
    State(state): State<Shared>,
    Json(body): Json<SetMapDetailsRequest>,
) -> Json<Value> {
    let mut s = state.lock().unwrap();
    s.uploads.push(body);
    Json(s.upload_reply.clone())
}

async fn spawn_fake(feed: Value, upload_reply: Value) -> (SocketAddr, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeWarzone {
        feed,
        upload_reply,
        ..Default::default()
    }));
    let app = Router::new()
        .route("/API/GameFeed", get(game_feed))
        .route("/API/SetMapDetails", post(set_map_details))
        .route("/plain/API/GameFeed", get(|| async { "not json" }))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, state)
}

fn creds() -> Credentials {
    Credentials::new(Some("me@example.com".into()), Some("secret".into())).unwrap()
}

fn sample_map() -> Value {
    json!({
        "territories": [
            { "id": 1, "name": "Keep", "connectedTo": [2], "coords": "10,20" },
            { "id": 2, "name": "Square", "connectedTo": [1], "coords": "30,40" }
        ],
        "bonuses": [
            { "id": 7, "name": "Luthadel", "value": 2, "territoryIDs": [1, 2] }
        ]
    })
}

fn temp_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "wzmap-client-test-{tag}-{}.json",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    ))
}

fn client_for(addr: SocketAddr) -> WarzoneClient {
    WarzoneClient::new(format!("http://{addr}/"))
}

#[tokio::test]
async fn fetch_sends_credentials_as_query() {
    let (addr, state) = spawn_fake(json!({ "map": sample_map() }), json!({})).await;
    let map = client_for(addr).fetch_map(42, &creds()).await.unwrap();
    assert_eq!(map, sample_map());

    let s = state.lock().unwrap();
    let q = &s.feed_queries[0];
    assert_eq!(q["GameID"], "42");
    assert_eq!(q["Email"], "me@example.com");
    assert_eq!(q["APIToken"], "secret");
}

#[tokio::test]
async fn fetch_surfaces_remote_error() {
    let (addr, _) = spawn_fake(json!({ "error": "GameID not found" }), json!({})).await;
    let err = client_for(addr).fetch_map(1, &creds()).await.unwrap_err();
    match err {
        PipelineError::Remote { message, .. } => assert_eq!(message, "GameID not found"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn fetch_without_map_is_malformed() {
    let (addr, _) = spawn_fake(json!({ "gameID": 1 }), json!({})).await;
    let err = client_for(addr).fetch_map(1, &creds()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Malformed { .. }), "{err}");
}

#[tokio::test]
async fn unreachable_host_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = client_for(addr).fetch_map(1, &creds()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Transport { .. }), "{err}");
    assert!(!err.to_string().contains("secret"));
}

#[tokio::test]
async fn upload_round_trip_reports_success() {
    let (addr, state) = spawn_fake(Value::Null, json!({})).await;
    let commands = wzmap_engine::plan(&sample_map()).unwrap().commands;
    client_for(addr)
        .upload(77, &creds(), commands.clone())
        .await
        .unwrap();

    let s = state.lock().unwrap();
    let body = &s.uploads[0];
    assert_eq!(body.map_id, 77);
    assert_eq!(body.email, "me@example.com");
    assert_eq!(body.api_token, "secret");
    assert_eq!(body.commands, commands);
}

#[tokio::test]
async fn upload_surfaces_remote_error() {
    let (addr, _) = spawn_fake(Value::Null, json!({ "error": "Map not found" })).await;
    let err = client_for(addr)
        .upload(1, &creds(), vec![Command::add_bonus("A", 1)])
        .await
        .unwrap_err();
    assert_eq!(err.title(), "Error from Warzone API");
    assert!(err.to_string().contains("Map not found"));
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let (addr, _) = spawn_fake(Value::Null, json!({})).await;
    let client = WarzoneClient::new(format!("http://{addr}/plain"));
    let err = client.fetch_map(1, &creds()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Malformed { .. }), "{err}");
}

#[tokio::test]
async fn unknown_endpoint_is_transport_error() {
    let (addr, _) = spawn_fake(Value::Null, json!({})).await;
    let client = WarzoneClient::new(format!("http://{addr}/missing"));
    let err = client.fetch_map(1, &creds()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Transport { .. }), "{err}");
}

#[test]
fn missing_credentials_are_reported() {
    let err = Credentials::new(None, Some("t".into())).unwrap_err();
    assert!(matches!(err, PipelineError::MissingField("email")));
    let err = Credentials::new(Some("a@b.c".into()), Some("  ".into())).unwrap_err();
    assert!(matches!(err, PipelineError::MissingField("api token")));
    assert!(!format!("{:?}", creds()).contains("secret"));
}

#[tokio::test]
async fn duplicate_job_streams_progress_then_outcome() {
    let (addr, state) = spawn_fake(json!({ "map": sample_map() }), json!({})).await;
    let save = temp_path("dup");
    let controller = Controller::new(client_for(addr), creds());

    let events = controller.spawn(Job::Duplicate {
        game_id: 5,
        map_id: 9,
        save: Some(save.clone()),
    });
    let mut seen = Vec::new();
    let outcome = controller::wait(events, |p| seen.push(p.clone()))
        .await
        .expect("finished")
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Uploaded {
            map_id: 9,
            commands: 1 + 2 + 1 + 2 + 2,
            preview_url: format!("http://{addr}/SinglePlayer?PreviewMap=9"),
        }
    );
    assert_eq!(seen.first(), Some(&Progress::Fetching { game_id: 5 }));
    assert!(matches!(seen.last(), Some(Progress::Uploading { map_id: 9, .. })));
    assert_eq!(MapFile::new(&save).load().unwrap(), sample_map());
    assert_eq!(state.lock().unwrap().uploads.len(), 1);
}

#[tokio::test]
async fn download_then_upload_through_file() {
    let (addr, state) = spawn_fake(json!({ "map": sample_map() }), json!({})).await;
    let file = temp_path("split");
    let controller = Controller::new(client_for(addr), creds());

    let downloaded = controller::wait(
        controller.spawn(Job::Download {
            game_id: 3,
            out: file.clone(),
        }),
        |_| {},
    )
    .await
    .expect("finished")
    .unwrap();
    assert_eq!(downloaded, Outcome::Downloaded { path: file.clone() });

    let uploaded = controller::wait(
        controller.spawn(Job::Upload { map_id: 4, file }),
        |_| {},
    )
    .await
    .expect("finished")
    .unwrap();
    assert!(matches!(uploaded, Outcome::Uploaded { map_id: 4, .. }));
    assert_eq!(state.lock().unwrap().uploads[0].map_id, 4);
}

#[tokio::test]
async fn invalid_map_never_reaches_upload() {
    let mut map = sample_map();
    map["bonuses"][0]["name"] = json!("");
    let (addr, state) = spawn_fake(json!({ "map": map }), json!({})).await;
    let controller = Controller::new(client_for(addr), creds());

    let result = controller::wait(
        controller.spawn(Job::Duplicate {
            game_id: 1,
            map_id: 2,
            save: None,
        }),
        |_| {},
    )
    .await
    .expect("finished");

    match result {
        // addBonus plus both addTerritoryToBonus commands lose their name.
        Err(PipelineError::Validation(errors)) => assert_eq!(errors.len(), 3),
        other => panic!("unexpected {other:?}"),
    }
    assert!(state.lock().unwrap().uploads.is_empty());
}

#[test]
fn config_file_and_overrides() {
    let path = temp_path("config");
    std::fs::write(
        &path,
        "base_url: http://localhost:9\nemail: file@example.com\napi_token: from-file\n",
    )
    .unwrap();

    let cfg = Config::load(Some(&path)).unwrap();
    assert_eq!(cfg.base_url(), "http://localhost:9");
    let cfg = cfg.with_overrides(None, Some("flag@example.com".into()), None);
    assert_eq!(cfg.email.as_deref(), Some("flag@example.com"));
    assert_eq!(cfg.api_token.as_deref(), Some("from-file"));
}

#[test]
fn explicit_config_must_exist() {
    let err = Config::load(Some(&temp_path("absent"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
    assert_eq!(
        Config::default().base_url(),
        wzmap_protocol::endpoints::DEFAULT_BASE_URL
    );
}

#[test]
fn unknown_config_keys_are_rejected() {
    let path = temp_path("badconfig");
    std::fs::write(&path, "emial: typo@example.com\n").unwrap();
    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::Parse { .. })
    ));
}

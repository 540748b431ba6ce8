//! HTTP surface tests. Request/response routes go through the router
//! directly; the push channel runs against a bound listener.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{RecordingStore, ScriptedEngine, opened, until_terminal};
use futures::{Stream, StreamExt};
use hls_transcoder::api::{ApiServer, ApiServerConfig, AppState};
use hls_transcoder::config::AppConfig;
use hls_transcoder::encoder::EncodeEvent;
use hls_transcoder::progress::PushNotification;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct Fixture {
    _dir: tempfile::TempDir,
    state: AppState,
    router: Router,
    engine: Arc<ScriptedEngine>,
    store: Arc<RecordingStore>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");
    let output_dir = dir.path().join("outputs");
    std::fs::create_dir_all(&upload_dir).unwrap();

    let config = AppConfig {
        upload_dir,
        output_dir,
        ffprobe_path: "definitely-not-ffprobe".to_string(),
        ladder: vec![("640:360".to_string(), "1000k".to_string())],
        ..AppConfig::default()
    };

    let engine = ScriptedEngine::new(vec![
        opened("360", 0),
        opened("360", 1),
        EncodeEvent::Completed,
    ]);
    let store = Arc::new(RecordingStore::default());
    let state = AppState::from_config(
        config,
        engine.clone(),
        store.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    let server = ApiServer::new(
        ApiServerConfig::default(),
        state.clone(),
        CancellationToken::new(),
    );
    let router = server.build_router();

    Fixture {
        _dir: dir,
        state,
        router,
        engine,
        store,
    }
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, socket_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(id) = socket_id {
        builder = builder.header("socket-id", id);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn transcode_without_socket_id_is_rejected() {
    let f = fixture();
    std::fs::write(f.state.config.upload_dir.join("movie.mp4"), b"x").unwrap();

    let response = f
        .router
        .oneshot(post("/api/transcode/movie.mp4", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "CONNECTION_NOT_FOUND");
    assert_eq!(body["message"], "Socket connection not found.");
    assert_eq!(f.engine.starts(), 0);
}

#[tokio::test]
async fn transcode_with_unknown_socket_id_starts_nothing() {
    let f = fixture();
    std::fs::write(f.state.config.upload_dir.join("movie.mp4"), b"x").unwrap();

    let response = f
        .router
        .oneshot(post("/api/transcode/movie.mp4", Some("no-such-socket")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "CONNECTION_NOT_FOUND");
    assert_eq!(body["details"]["socketId"], "no-such-socket");
    assert_eq!(f.engine.starts(), 0);
    assert!(!f.state.config.output_dir.join("movie").exists());
}

#[tokio::test]
async fn transcode_of_missing_file_is_404() {
    let f = fixture();
    let (channel, _rx) = f.state.channels.register();

    let response = f
        .router
        .oneshot(post("/api/transcode/missing.mp4", Some(channel.id())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["code"], "FILE_NOT_FOUND");
    assert_eq!(f.engine.starts(), 0);
}

#[tokio::test]
async fn accepted_transcode_streams_progress_to_the_channel() {
    let f = fixture();
    std::fs::write(f.state.config.upload_dir.join("movie.mp4"), b"x").unwrap();
    let (channel, mut rx) = f.state.channels.register();

    let response = f
        .router
        .clone()
        .oneshot(post("/api/transcode/movie.mp4", Some(channel.id())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Transcoding started.");
    let expected_output = f.state.config.output_dir.join("movie");
    assert_eq!(
        body["outputPath"].as_str().unwrap(),
        expected_output.to_string_lossy()
    );
    assert!(!body["jobId"].as_str().unwrap().is_empty());
    assert!(expected_output.is_dir());

    let notifications = until_terminal(&mut rx).await;
    assert_eq!(notifications.first(), Some(&PushNotification::Progress { percent: 0.0 }));
    assert_eq!(notifications.last(), Some(&PushNotification::Complete));

    f.state.publisher.wait_idle().await;
    let mut names = f.store.names();
    names.sort();
    assert_eq!(names, vec!["360p.m3u8", "360p_000.ts", "360p_001.ts"]);
}

#[tokio::test]
async fn transcode_rejects_path_traversal() {
    let f = fixture();
    let (channel, _rx) = f.state.channels.register();

    let response = f
        .router
        .oneshot(post("/api/transcode/..%2Fsecret.mp4", Some(channel.id())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(f.engine.starts(), 0);
}

#[tokio::test]
async fn probe_of_missing_file_is_404() {
    let f = fixture();

    let response = f
        .router
        .oneshot(post("/api/probe/missing.mp4", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["code"], "FILE_NOT_FOUND");
}

#[tokio::test]
async fn health_reports_live_channels() {
    let f = fixture();
    let (_first, _rx1) = f.state.channels.register();
    let (_second, _rx2) = f.state.channels.register();

    let response = f
        .router
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["liveChannels"], 2);
    assert_eq!(body["encoder"], "scripted");
    assert_eq!(body["publishEnabled"], true);
    assert_eq!(body["publishStore"], "recording");
}

async fn next_notification<S>(ws: &mut S) -> PushNotification
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("push frame within 5s")
            .expect("socket still open")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn push_channel_carries_a_job_from_connect_to_close() {
    let f = fixture();
    std::fs::write(f.state.config.upload_dir.join("movie.mp4"), b"x").unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = f.router.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    let id = match next_notification(&mut ws).await {
        PushNotification::Connected { id } => id,
        other => panic!("expected connected frame first, got {other:?}"),
    };
    assert!(f.state.channels.resolve(&id).is_some());

    let response = f
        .router
        .clone()
        .oneshot(post("/api/transcode/movie.mp4", Some(id.as_str())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut received = Vec::new();
    loop {
        let notification = next_notification(&mut ws).await;
        let done = matches!(
            notification,
            PushNotification::Complete | PushNotification::Error { .. }
        );
        received.push(notification);
        if done {
            break;
        }
    }
    assert_eq!(
        received,
        vec![
            PushNotification::Progress { percent: 0.0 },
            PushNotification::Segment {
                file: "360p_000.ts".into()
            },
            PushNotification::Segment {
                file: "360p_001.ts".into()
            },
            PushNotification::Complete,
        ]
    );

    ws.close(None).await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while f.state.channels.resolve(&id).is_some() || !f.state.channels.is_empty() {
        assert!(Instant::now() < deadline, "channel {id} still registered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

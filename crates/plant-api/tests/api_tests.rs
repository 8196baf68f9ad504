use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

use plant_api::feed::{GalleryView, ProfileView};
use plant_api::middleware::decode_identity;
use plant_api::{AppState, AppStateInner, router};
use plant_db::{Database, SqliteDocumentStore};
use plant_storage::keys::key_from_retrieval_url;
use plant_storage::local::LocalObjectStore;
use plant_storage::{
    ChangeFeed, Credential, CredentialPlacement, DocumentStore, ObjectStore, StorageError,
    StorageResult,
};
use plant_types::models::{NewPhoto, Photo, PhotoQuery};

const BOUNDARY: &str = "plant-share-test-boundary";
const PUBLIC_URL: &str = "http://localhost:3000";

/// Local object store that counts calls.
struct CountingObjects {
    inner: Arc<LocalObjectStore>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingObjects {
    async fn put(&self, key: &str, data: Bytes, content_type: &str, credential: &Credential) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, data, content_type, credential).await
    }

    async fn delete(&self, key: &str, credential: &Credential) -> StorageResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key, credential).await
    }

    fn retrieval_url(&self, key: &str) -> String {
        self.inner.retrieval_url(key)
    }
}

/// Document store whose writes always fail.
struct BrokenDocuments;

#[async_trait]
impl DocumentStore for BrokenDocuments {
    async fn create(&self, _photo: NewPhoto, _credential: &Credential) -> StorageResult<Photo> {
        Err(StorageError::Io(std::io::Error::other("quota exceeded")))
    }

    async fn get(&self, id: &str, _credential: Option<&Credential>) -> StorageResult<Photo> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str, _credential: &Credential) -> StorageResult<()> {
        Err(StorageError::NotFound(id.to_string()))
    }

    async fn query(&self, _query: &PhotoQuery, _credential: Option<&Credential>) -> StorageResult<Vec<Photo>> {
        Ok(Vec::new())
    }

    fn changes(&self) -> ChangeFeed {
        ChangeFeed::poll(Duration::from_secs(60))
    }
}

struct Harness {
    _dir: TempDir,
    local: Arc<LocalObjectStore>,
    objects: Arc<CountingObjects>,
    documents: Arc<dyn DocumentStore>,
    state: AppState,
}

impl Harness {
    async fn new() -> Self {
        let documents: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(Database::open_in_memory().unwrap()));
        Self::with_documents(documents).await
    }

    async fn with_documents(documents: Arc<dyn DocumentStore>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(
            LocalObjectStore::new(dir.path().to_path_buf(), "plant-share", PUBLIC_URL)
                .await
                .unwrap(),
        );
        let objects = Arc::new(CountingObjects {
            inner: local.clone(),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        });
        let state = Arc::new(AppStateInner {
            objects: objects.clone(),
            documents: documents.clone(),
            local_objects: Some(local.clone()),
        });
        Self {
            _dir: dir,
            local,
            objects,
            documents,
            state,
        }
    }

    fn app(&self) -> Router {
        router(self.state.clone(), 1024 * 1024)
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Bytes) {
        let resp = self.app().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    async fn upload(&self, uri: &str, user: &str, file_name: &str, caption: &str) -> (StatusCode, Value) {
        let body = multipart(&[
            Part::File {
                name: "file",
                file_name,
                content_type: "image/jpeg",
                data: b"petals",
            },
            Part::Text("userId", user),
            Part::Text("userEmail", &format!("{user}@x.com")),
            Part::Text("caption", caption),
            Part::Text("idToken", &token(user)),
        ]);
        let (status, bytes) = self.send(multipart_request(uri, body)).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn token(user: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({"sub": user, "email": format!("{user}@x.com"), "exp": exp}),
        &EncodingKey::from_secret(b"identity-provider"),
    )
    .unwrap()
}

fn authed(method: &str, uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(user)))
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the router on a loopback port for WebSocket clients.
async fn serve(h: &Harness) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = h.app();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

/// Next JSON event on a live feed, skipping control frames.
async fn next_event(ws: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no live event within 5s")
            .expect("live feed closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Read events until a snapshot with `len` photos arrives.
async fn snapshot_of(ws: &mut Socket, len: usize) -> Vec<Value> {
    loop {
        let event = next_event(ws).await;
        assert_eq!(event["type"], "Snapshot", "unexpected event {event}");
        let photos = event["data"]["photos"].as_array().unwrap().clone();
        if photos.len() == len {
            return photos;
        }
    }
}

async fn send_command(ws: &mut Socket, command: Value) {
    ws.send(Message::Text(command.to_string().into())).await.unwrap();
}

async fn photos(h: &Harness, req: Request<Body>) -> Vec<Value> {
    let (status, body) = h.send(req).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    json["photos"].as_array().unwrap().clone()
}

#[tokio::test]
async fn upload_stores_one_object_and_one_record() {
    let h = Harness::new().await;

    let (status, json) = h.upload("/api/upload", "u1", "rose.jpg", "first bloom").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let photo = &json["photo"];
    assert_eq!(photo["userId"], "u1");
    assert_eq!(photo["userEmail"], "u1@x.com");
    assert_eq!(photo["caption"], "first bloom");

    let image_url = photo["imageUrl"].as_str().unwrap();
    assert!(image_url.starts_with("http://localhost:3000/v0/b/plant-share/o/photos%2Fu1%2F"));
    assert!(image_url.ends_with("-rose.jpg?alt=media"));

    let key = key_from_retrieval_url(image_url).unwrap();
    assert!(key.starts_with("photos/u1/"));
    assert_eq!(h.local.read(&key).await.unwrap().data, b"petals");
    assert_eq!(h.objects.puts.load(Ordering::SeqCst), 1);

    let listed = photos(&h, get("/api/photos")).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], photo["id"]);
}

#[tokio::test]
async fn retrieval_url_serves_the_uploaded_bytes() {
    let h = Harness::new().await;
    let (_, json) = h.upload("/api/upload", "u1", "rose.jpg", "").await;

    let image_url = json["photo"]["imageUrl"].as_str().unwrap();
    let path = image_url.strip_prefix(PUBLIC_URL).unwrap();

    let resp = h.app().oneshot(get(path)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"petals");

    let (status, _) = h.send(get("/v0/b/other-bucket/o/photos%2Fu1%2Fx.jpg")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn token_param_variant_runs_the_same_pipeline() {
    let h = Harness::new().await;
    let (status, json) = h
        .upload("/api/upload/token-param", "u2", "fern.png", "fronds")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["photo"]["userId"], "u2");
    // An empty caption is stored as no caption.
    let (_, json) = h.upload("/api/upload/token-param", "u2", "moss.png", "").await;
    assert!(json["photo"].get("caption").is_none());
}

#[tokio::test]
async fn missing_fields_fail_before_any_store_call() {
    let h = Harness::new().await;

    let body = multipart(&[
        Part::File {
            name: "file",
            file_name: "rose.jpg",
            content_type: "image/jpeg",
            data: b"petals",
        },
        Part::Text("caption", "no owner"),
        Part::Text("idToken", "tok"),
    ]);
    let (status, bytes) = h.send(multipart_request("/api/upload", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["error"], "Missing required fields");

    let body = multipart(&[Part::Text("userId", "u1"), Part::Text("idToken", "tok")]);
    let (status, _) = h.send(multipart_request("/api/upload", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.objects.puts.load(Ordering::SeqCst), 0);
    assert!(photos(&h, get("/api/photos")).await.is_empty());
}

#[tokio::test]
async fn failed_metadata_write_leaves_the_object_orphaned() {
    let h = Harness::with_documents(Arc::new(BrokenDocuments)).await;

    let (status, json) = h.upload("/api/upload", "u1", "rose.jpg", "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to save photo metadata");

    // No compensating delete: the bytes are still there.
    assert_eq!(h.objects.puts.load(Ordering::SeqCst), 1);
    assert_eq!(h.objects.deletes.load(Ordering::SeqCst), 0);
    let mut entries = tokio::fs::read_dir(h._dir.path().join("objects/photos/u1"))
        .await
        .unwrap();
    let orphan = entries.next_entry().await.unwrap().unwrap();
    assert!(orphan.file_name().to_string_lossy().ends_with("-rose.jpg"));
}

#[tokio::test]
async fn listings_are_newest_first_and_profile_is_filtered() {
    let h = Harness::new().await;
    h.upload("/api/upload", "u1", "a.jpg", "").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.upload("/api/upload", "u2", "b.jpg", "").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.upload("/api/upload", "u1", "c.jpg", "").await;

    let gallery = photos(&h, get("/api/photos")).await;
    assert_eq!(gallery.len(), 3);
    let stamps: Vec<&str> = gallery.iter().map(|p| p["createdAt"].as_str().unwrap()).collect();
    let times: Vec<chrono::DateTime<chrono::Utc>> =
        stamps.iter().map(|s| s.parse().unwrap()).collect();
    assert!(times.windows(2).all(|w| w[0] >= w[1]));

    let profile = photos(&h, authed("GET", "/api/profile/photos", "u1")).await;
    assert_eq!(profile.len(), 2);
    assert!(profile.iter().all(|p| p["userId"] == "u1"));
    assert!(profile[0]["imageUrl"].as_str().unwrap().ends_with("-c.jpg?alt=media"));
}

#[tokio::test]
async fn profile_requires_a_bearer_token() {
    let h = Harness::new().await;
    let (status, _) = h.send(get("/api/profile/photos")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/profile/photos")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn delete_removes_document_then_object_and_a_second_delete_is_404() {
    let h = Harness::new().await;
    let (_, json) = h.upload("/api/upload", "u1", "rose.jpg", "first bloom").await;
    let id = json["photo"]["id"].as_str().unwrap().to_string();
    let key = key_from_retrieval_url(json["photo"]["imageUrl"].as_str().unwrap()).unwrap();

    let (status, _) = h.send(authed("DELETE", &format!("/api/photos/{id}"), "u1")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!h.local.exists(&key).await.unwrap());
    assert!(photos(&h, get("/api/photos")).await.is_empty());
    assert!(photos(&h, authed("GET", "/api/profile/photos", "u1")).await.is_empty());

    let (status, _) = h.send(authed("DELETE", &format!("/api/photos/{id}"), "u1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(h.objects.deletes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deleting_someone_elses_photo_is_forbidden() {
    let h = Harness::new().await;
    let (_, json) = h.upload("/api/upload", "u1", "rose.jpg", "").await;
    let id = json["photo"]["id"].as_str().unwrap();

    let (status, _) = h.send(authed("DELETE", &format!("/api/photos/{id}"), "u2")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(h.objects.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(photos(&h, get("/api/photos")).await.len(), 1);
}

#[tokio::test]
async fn profile_view_follows_snapshots_and_deletes_locally() {
    let h = Harness::new().await;
    h.upload("/api/upload", "u1", "a.jpg", "").await;
    h.upload("/api/upload", "u2", "b.jpg", "").await;

    let identity = decode_identity(&token("u1"), CredentialPlacement::Header).unwrap();
    let mut view = ProfileView::open(h.documents.clone(), h.objects.clone(), identity);
    assert!(view.is_loading());

    let first = view.next_snapshot().await.unwrap().to_vec();
    assert!(!view.is_loading());
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].user_id, "u1");

    view.delete(&first[0].id).await.unwrap();
    assert!(view.photos().is_empty());
    assert_eq!(h.objects.deletes.load(Ordering::SeqCst), 1);

    // Not listed any more, so a repeat never reaches either store.
    assert!(view.delete(&first[0].id).await.is_err());
    assert_eq!(h.objects.deletes.load(Ordering::SeqCst), 1);

    let after = view.next_snapshot().await.unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn gallery_view_collects_every_users_uploads() {
    let h = Harness::new().await;
    let mut view = GalleryView::open(h.documents.clone(), None);
    assert!(view.is_loading());

    assert!(view.next_snapshot().await.unwrap().is_empty());
    assert!(!view.is_loading());

    h.upload("/api/upload", "u1", "a.jpg", "").await;
    h.upload("/api/upload", "u2", "b.jpg", "").await;

    while view.photos().len() < 2 {
        tokio::time::timeout(Duration::from_secs(5), view.next_snapshot())
            .await
            .expect("no snapshot within 5s")
            .unwrap();
    }
    let mut owners: Vec<&str> = view.photos().iter().map(|p| p.user_id.as_str()).collect();
    owners.sort();
    assert_eq!(owners, vec!["u1", "u2"]);
}

#[tokio::test]
async fn gallery_live_sends_ready_then_snapshots_and_refuses_deletes() {
    let h = Harness::new().await;
    let addr = serve(&h).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/api/photos/live")).await.unwrap();
    assert_eq!(next_event(&mut ws).await, json!({"type": "Ready", "data": {"scope": "gallery"}}));
    assert!(snapshot_of(&mut ws, 0).await.is_empty());

    let (_, json) = h.upload("/api/upload", "u1", "rose.jpg", "first bloom").await;
    let listed = snapshot_of(&mut ws, 1).await;
    assert_eq!(listed[0]["id"], json["photo"]["id"]);
    assert_eq!(listed[0]["caption"], "first bloom");

    send_command(&mut ws, json!({"type": "Delete", "data": {"id": json["photo"]["id"]}})).await;
    let reply = next_event(&mut ws).await;
    assert_eq!(reply["type"], "Error");
    assert_eq!(h.objects.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(photos(&h, get("/api/photos")).await.len(), 1);
}

#[tokio::test]
async fn profile_live_lists_own_photos_and_deletes_on_command() {
    let h = Harness::new().await;
    let (_, mine) = h.upload("/api/upload", "u1", "a.jpg", "").await;
    h.upload("/api/upload", "u2", "b.jpg", "").await;
    let addr = serve(&h).await;

    let url = format!("ws://{addr}/api/profile/live?token={}", token("u1"));
    let (mut ws, _) = connect_async(url).await.unwrap();
    assert_eq!(next_event(&mut ws).await, json!({"type": "Ready", "data": {"scope": "profile"}}));

    let listed = snapshot_of(&mut ws, 1).await;
    assert_eq!(listed[0]["userId"], "u1");
    let id = mine["photo"]["id"].clone();
    assert_eq!(listed[0]["id"], id);

    send_command(&mut ws, json!({"type": "Delete", "data": {"id": id}})).await;
    assert_eq!(next_event(&mut ws).await, json!({"type": "Deleted", "data": {"id": id}}));
    let after = next_event(&mut ws).await;
    assert_eq!(after["type"], "Snapshot");
    assert!(after["data"]["photos"].as_array().unwrap().is_empty());

    assert_eq!(h.objects.deletes.load(Ordering::SeqCst), 1);
    let gallery = photos(&h, get("/api/photos")).await;
    assert_eq!(gallery.len(), 1);
    assert_eq!(gallery[0]["userId"], "u2");
}

#[tokio::test]
async fn profile_live_rejects_bad_or_missing_tokens_before_upgrade() {
    let h = Harness::new().await;
    let addr = serve(&h).await;

    for url in [
        format!("ws://{addr}/api/profile/live?token=not-a-jwt"),
        format!("ws://{addr}/api/profile/live"),
    ] {
        match connect_async(url).await {
            Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 401),
            Err(e) => panic!("expected an HTTP 401, got {e}"),
            Ok(_) => panic!("upgrade should have been refused"),
        }
    }
}

#[tokio::test]
async fn health_is_ok() {
    let h = Harness::new().await;
    let (status, body) = h.send(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");
}

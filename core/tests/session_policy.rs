//! Client policies checked against a scripted transport.
//!
//! Each test queues the outcomes the "network" will produce, drives the
//! clients, then inspects the recorded requests and the session storage.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use backoffice_core::error::{UPLOAD_NETWORK_MESSAGE, UPLOAD_UNKNOWN_MESSAGE};
use backoffice_core::session::SESSION_KEYS;
use backoffice_core::{
    ApiClients, ApiError, AuthService, ClientConfig, FileStorage, HttpRequest, HttpResponse, MemoryStorage,
    MultipartForm, Permissions, ProductService, Session, SessionEvent, SessionManager,
    SessionStorage, Transport, TransportError, UploadService,
};

#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn reply(&self, reply: Result<HttpResponse, TransportError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn seen(&self) -> Vec<HttpRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::new(200, "[]")))
    }
}

struct Harness {
    transport: Arc<ScriptedTransport>,
    storage: Arc<MemoryStorage>,
    clients: ApiClients,
}

fn harness() -> Harness {
    let transport = Arc::new(ScriptedTransport::default());
    let storage = Arc::new(MemoryStorage::new());
    let config = ClientConfig::new("http://api.local", "http://files.local", "upload-secret");
    let clients = ApiClients::new(
        &config,
        SessionManager::new(storage.clone()),
        transport.clone(),
    );
    Harness {
        transport,
        storage,
        clients,
    }
}

fn session(token: &str) -> Session {
    Session {
        token: token.to_string(),
        role: "admin".to_string(),
        permissions: Permissions::all(),
        user_id: "u-1".to_string(),
    }
}

fn stored_keys(storage: &MemoryStorage) -> Vec<&'static str> {
    SESSION_KEYS
        .into_iter()
        .filter(|key| storage.get(key).unwrap().is_some())
        .collect()
}

// ---------------------------------------------------------------------------
// Token injection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bearer_token_follows_storage() {
    let h = harness();
    let products = ProductService::new(&h.clients);

    products.list().await.unwrap();
    h.clients.session.set(&session("tok-a")).unwrap();
    products.list().await.unwrap();
    h.clients.session.set(&session("tok-b")).unwrap();
    products.list().await.unwrap();

    let seen = h.transport.seen();
    assert!(seen[0].header("authorization").is_none());
    assert_eq!(seen[1].header("authorization"), Some("Bearer tok-a"));
    assert_eq!(seen[2].header("authorization"), Some("Bearer tok-b"));
    assert!(seen.iter().all(|r| r.url == "http://api.local/products"));
}

#[tokio::test]
async fn damaged_session_file_reads_as_logged_out() {
    let path = std::env::temp_dir().join(format!(
        "backoffice-session-{}.json",
        uuid::Uuid::new_v4()
    ));
    std::fs::write(&path, r#"{"token":"abc""#).unwrap();
    let transport = Arc::new(ScriptedTransport::default());
    let config = ClientConfig::new("http://api.local", "http://files.local", "upload-secret");
    let clients = ApiClients::new(
        &config,
        SessionManager::new(Arc::new(FileStorage::new(&path))),
        transport.clone(),
    );
    let auth = AuthService::new(&clients, None);

    ProductService::new(&clients).list().await.unwrap();
    assert!(transport.seen()[0].header("authorization").is_none());
    auth.logout().unwrap();
    assert!(auth.current().unwrap().is_none());

    transport.reply(Ok(HttpResponse::new(
        200,
        r#"{"token":"fresh","role":"manager","userId":3}"#,
    )));
    auth.login("a@b.c", "pw").await.unwrap();
    assert_eq!(clients.session.token().unwrap().as_deref(), Some("fresh"));
    std::fs::remove_file(&path).unwrap();
}

// ---------------------------------------------------------------------------
// Session clear on 401
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unauthorized_clears_session_and_still_rejects() {
    let h = harness();
    h.clients.session.set(&session("stale")).unwrap();
    let mut events = h.clients.session.subscribe();
    h.transport
        .reply(Ok(HttpResponse::new(401, r#"{"error":"invalid token"}"#)));

    let err = h.clients.application.get("/orders").await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(err.body_json().unwrap()["error"], "invalid token");
    assert!(stored_keys(&h.storage).is_empty());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Expired {
            redirect_to: "/login".to_string()
        }
    );
    assert!(events.try_recv().is_err(), "expiry announced exactly once");
}

// ---------------------------------------------------------------------------
// Other errors pass through
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_error_passes_through_without_touching_session() {
    let h = harness();
    h.clients.session.set(&session("tok")).unwrap();
    let mut events = h.clients.session.subscribe();
    h.transport
        .reply(Ok(HttpResponse::new(500, r#"{"error":"x"}"#)));

    let err = h.clients.application.get("/orders").await.unwrap_err();

    match &err {
        ApiError::Status { status, body, .. } => {
            assert_eq!(*status, 500);
            assert_eq!(body, r#"{"error":"x"}"#);
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert_eq!(stored_keys(&h.storage).len(), 4);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn application_timeout_is_not_normalized() {
    let h = harness();
    h.transport.reply(Err(TransportError::Timeout));
    let err = h.clients.application.get("/orders").await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(TransportError::Timeout)));
}

// ---------------------------------------------------------------------------
// Upload content type
// ---------------------------------------------------------------------------

#[tokio::test]
async fn upload_forces_multipart_content_type() {
    let h = harness();
    h.transport
        .reply(Ok(HttpResponse::new(200, r#"{"path":"/uploads/x.png"}"#)));

    let file = UploadService::new(&h.clients)
        .upload("x.png", "image/png", vec![137, 80, 78, 71])
        .await
        .unwrap();
    assert_eq!(file.path, "/uploads/x.png");

    let seen = h.transport.seen();
    let req = &seen[0];
    assert_eq!(req.url, "http://files.local/upload");
    assert!(req
        .header("content-type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));
    assert_eq!(req.header("authorization"), Some("upload-secret"));
    assert_eq!(req.header("accept"), Some("*/*"));
}

#[tokio::test]
async fn upload_overrides_a_configured_json_default() {
    let h = harness();
    let upload = backoffice_core::HttpClient::new(
        h.clients
            .upload
            .config()
            .clone()
            .default_header("content-type", "application/json"),
        h.transport.clone(),
    )
    .with_request_interceptor(backoffice_core::interceptor::MultipartContentType);

    let form = MultipartForm::new().file("file", "a.txt", "text/plain", b"a".to_vec());
    let expected = form.content_type();
    upload.post_multipart("/upload", form).await.unwrap();

    let seen = h.transport.seen();
    assert_eq!(seen[0].header("content-type"), Some(expected.as_str()));
}

#[tokio::test]
async fn upload_does_not_send_session_token() {
    let h = harness();
    h.clients.session.set(&session("user-token")).unwrap();
    h.transport
        .reply(Ok(HttpResponse::new(200, r#"{"path":"/p"}"#)));
    UploadService::new(&h.clients)
        .upload("a.txt", "text/plain", b"a".to_vec())
        .await
        .unwrap();
    assert_eq!(
        h.transport.seen()[0].header("authorization"),
        Some("upload-secret")
    );
}

// ---------------------------------------------------------------------------
// Upload error normalization
// ---------------------------------------------------------------------------

async fn upload_error(reply: Result<HttpResponse, TransportError>) -> ApiError {
    let h = harness();
    h.transport.reply(reply);
    UploadService::new(&h.clients)
        .upload("a.txt", "text/plain", b"a".to_vec())
        .await
        .unwrap_err()
}

#[tokio::test]
async fn upload_network_failure_message() {
    let err = upload_error(Err(TransportError::Network("refused".to_string()))).await;
    assert_eq!(err.to_string(), UPLOAD_NETWORK_MESSAGE);
}

#[tokio::test]
async fn upload_application_failure_message() {
    let err = upload_error(Ok(HttpResponse::new(400, r#"{"error":"bad file"}"#))).await;
    assert_eq!(err.to_string(), "bad file");

    let err = upload_error(Ok(HttpResponse::new(400, r#"{"message":"ignored"}"#))).await;
    assert_eq!(err.to_string(), "Bad Request");
}

#[tokio::test]
async fn upload_401_does_not_end_the_session() {
    let h = harness();
    h.clients.session.set(&session("tok")).unwrap();
    h.transport
        .reply(Ok(HttpResponse::new(401, r#"{"error":"invalid upload credential"}"#)));
    let err = UploadService::new(&h.clients)
        .upload("a.txt", "text/plain", b"a".to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid upload credential");
    assert_eq!(stored_keys(&h.storage).len(), 4);
}

#[tokio::test]
async fn upload_unreadable_success_is_not_normalized() {
    // Normalization covers transport and status failures; a 200 with an
    // unexpected body surfaces as a decoding error from the service.
    let err = upload_error(Ok(HttpResponse::new(200, "<html>"))).await;
    assert!(matches!(err, ApiError::Deserialization(_)));
}

#[tokio::test]
async fn upload_unknown_failure_message() {
    let err = upload_error(Err(TransportError::Unknown("tls".to_string()))).await;
    assert_eq!(err.to_string(), UPLOAD_UNKNOWN_MESSAGE);
}

// ---------------------------------------------------------------------------
// Idempotent logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_401s_leave_storage_empty() {
    let h = harness();
    h.clients.session.set(&session("stale")).unwrap();
    let mut events = h.clients.session.subscribe();
    h.transport.reply(Ok(HttpResponse::new(401, "")));
    h.transport.reply(Ok(HttpResponse::new(401, "")));

    let (a, b) = tokio::join!(
        h.clients.application.get("/orders"),
        h.clients.application.get("/coupons"),
    );

    assert!(matches!(a, Err(ApiError::Unauthorized { .. })));
    assert!(matches!(b, Err(ApiError::Unauthorized { .. })));
    assert!(stored_keys(&h.storage).is_empty());
    for _ in 0..2 {
        assert!(matches!(
            events.try_recv().unwrap(),
            SessionEvent::Expired { .. }
        ));
    }
}

#[tokio::test]
async fn logout_twice_is_not_an_error() {
    let h = harness();
    let auth = AuthService::new(&h.clients, None);
    h.clients.session.set(&session("tok")).unwrap();
    auth.logout().unwrap();
    auth.logout().unwrap();
    assert!(stored_keys(&h.storage).is_empty());
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backend_login_stores_session() {
    let h = harness();
    h.transport.reply(Ok(HttpResponse::new(
        200,
        r#"{"token":"t-9","role":"manager","permissions":{"orderManagement":true},"userId":9}"#,
    )));

    let auth = AuthService::new(&h.clients, None);
    let session = auth.login("a@b.c", "pw").await.unwrap();

    assert_eq!(session.token, "t-9");
    assert_eq!(session.user_id, "9");
    assert_eq!(h.storage.get("token").unwrap().as_deref(), Some("t-9"));
    assert_eq!(h.storage.get("userId").unwrap().as_deref(), Some("9"));
    assert_eq!(
        h.storage.get("permissions").unwrap().as_deref(),
        Some(r#"{"orderManagement":true}"#)
    );

    let req = &h.transport.seen()[0];
    assert_eq!(req.url, "http://api.local/auth/login");
    assert!(req.header("authorization").is_none());
    let body = String::from_utf8(req.body.clone().unwrap().into_bytes()).unwrap();
    let body: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["email"], "a@b.c");
}

//! End-to-end checks against the live mock server.
//!
//! # Design
//! Starts the mock application API and upload service on random ports, then
//! drives the real reqwest transport through login, catalog writes, refunds,
//! forced expiry and uploads.

use backoffice_core::error::UPLOAD_NETWORK_MESSAGE;
use backoffice_core::{
    ApiClients, ApiError, AuthService, Capability, ClientConfig, OrderService, ProductService,
    SessionEvent, SessionManager, UploadService,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const UPLOAD_TOKEN: &str = "integration-upload-token";

async fn start() -> ClientConfig {
    let api = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let files = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_addr = api.local_addr().unwrap();
    let files_addr = files.local_addr().unwrap();

    tokio::spawn(mock_server::run(api));
    tokio::spawn(mock_server::run_upload(files, UPLOAD_TOKEN.to_string()));

    ClientConfig::new(
        format!("http://{api_addr}"),
        format!("http://{files_addr}"),
        UPLOAD_TOKEN,
    )
}

#[tokio::test]
async fn login_catalog_and_forced_expiry() {
    let config = start().await;
    let clients = ApiClients::connect(&config, SessionManager::in_memory()).unwrap();
    let auth = AuthService::new(&clients, config.bypass.clone());
    let products = ProductService::new(&clients);
    let orders = OrderService::new(&clients);
    let mut events = clients.session.subscribe();

    // Public listing works logged out; writes do not.
    assert!(products.list().await.unwrap().is_empty());
    let err = products.create(&json!({ "name": "Mug" })).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert!(matches!(
        events.try_recv().unwrap(),
        SessionEvent::Expired { .. }
    ));

    // Wrong password is rejected by the backend.
    let err = auth.login("staff@shop.local", "nope").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(auth.current().unwrap().is_none());
    let _ = events.try_recv();

    // Login.
    let session = auth.login("staff@shop.local", "hunter2").await.unwrap();
    assert_eq!(session.role, "manager");
    assert_eq!(session.user_id, "7");
    assert!(session.permissions.allows(Capability::ProductManagement));
    assert!(!session.permissions.allows(Capability::CouponManagement));
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::LoggedIn {
            user_id: "7".to_string()
        }
    );

    // Catalog writes.
    let created = products
        .create(&json!({ "name": "Mug", "price": 9.5 }))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    let updated = products
        .update(&id, &json!({ "price": 11 }))
        .await
        .unwrap();
    assert_eq!(updated["name"], "Mug");
    assert_eq!(products.get(&id).await.unwrap()["price"], 11);
    products.delete(&id).await.unwrap();
    let err = products.get(&id).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(auth.current().unwrap().is_some(), "404 keeps the session");

    // Refunds.
    let order = orders.refund("ord-1", 100.0, "lost in transit").await.unwrap();
    assert_eq!(order["status"], "refunded");
    let err = orders.refund("ord-1", 1.0, "again").await.unwrap_err();
    assert_eq!(err.body_json().unwrap()["error"], "refund exceeds order total");

    // Backend revokes every token: next call ends the session.
    clients
        .application
        .post("/auth/revoke", &json!({}))
        .await
        .unwrap();
    let err = orders.list().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert!(auth.current().unwrap().is_none());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Expired {
            redirect_to: "/login".to_string()
        }
    );
}

#[tokio::test]
async fn upload_round_trip_and_failures() {
    let config = start().await;
    let clients = ApiClients::connect(&config, SessionManager::in_memory()).unwrap();
    let uploads = UploadService::new(&clients);

    let file = uploads
        .upload("banner.png", "image/png", vec![137, 80, 78, 71, 13, 10])
        .await
        .unwrap();
    assert!(file.path.starts_with("/uploads/"));
    assert!(file.path.ends_with("-banner.png"));

    let err = uploads
        .upload("empty.png", "image/png", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "no file provided");

    let wrong = ClientConfig::new(
        config.application_base_url.clone(),
        config.upload_base_url.clone(),
        "not-the-token",
    );
    let wrong = ApiClients::connect(&wrong, SessionManager::in_memory()).unwrap();
    let err = UploadService::new(&wrong)
        .upload("a.txt", "text/plain", b"hi".to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "invalid upload credential");
}

#[tokio::test]
async fn upload_to_closed_port_reports_connection_failure() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let config = ClientConfig::new("http://127.0.0.1:9", format!("http://{addr}"), UPLOAD_TOKEN);
    let clients = ApiClients::connect(&config, SessionManager::in_memory()).unwrap();
    let err = UploadService::new(&clients)
        .upload("a.txt", "text/plain", b"hi".to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), UPLOAD_NETWORK_MESSAGE);
}

#[tokio::test]
async fn upload_failure_uses_the_reason_phrase_the_server_sent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut chunk = [0u8; 4096];
        // The multipart body ends with the closing boundary.
        while !received.ends_with(b"--\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..n]);
        }
        socket
            .write_all(b"HTTP/1.1 418 Kettle Overheated\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
    });

    let config = ClientConfig::new("http://127.0.0.1:9", format!("http://{addr}"), UPLOAD_TOKEN);
    let clients = ApiClients::connect(&config, SessionManager::in_memory()).unwrap();
    let err = UploadService::new(&clients)
        .upload("a.txt", "text/plain", b"hi".to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Kettle Overheated");
}

#[tokio::test]
async fn bypass_login_then_backend_rejects_local_token() {
    let config = start().await.with_bypass("owner@shop.local", "local-only");
    let clients = ApiClients::connect(&config, SessionManager::in_memory()).unwrap();
    let auth = AuthService::new(&clients, config.bypass.clone());

    let session = auth.login("owner@shop.local", "local-only").await.unwrap();
    assert_eq!(session.role, "admin");
    assert!(session.permissions.allows(Capability::InventoryManagement));

    // The backend never issued this token.
    let err = OrderService::new(&clients).list().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert!(auth.current().unwrap().is_none());
}

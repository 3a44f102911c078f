//! In-memory stand-ins for the back-office application API and upload service.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

pub const COLLECTIONS: [&str; 5] = ["products", "categories", "variants", "orders", "coupons"];

/// Credentials the mock backend accepts.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub email: String,
    pub password: String,
    pub role: String,
    pub user_id: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            email: "staff@shop.local".to_string(),
            password: "hunter2".to_string(),
            role: "manager".to_string(),
            user_id: 7,
        }
    }
}

type Records = BTreeMap<String, Value>;

#[derive(Clone)]
pub struct AppState {
    config: Arc<MockConfig>,
    tokens: Arc<RwLock<HashSet<String>>>,
    collections: Arc<RwLock<HashMap<String, Records>>>,
}

type Failure = (StatusCode, Json<Value>);

fn failure(status: StatusCode, message: &str) -> Failure {
    (status, Json(json!({ "error": message })))
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefundInput {
    pub amount: f64,
    #[serde(default)]
    pub reason: String,
}

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let mut collections: HashMap<String, Records> = COLLECTIONS
        .iter()
        .map(|name| (name.to_string(), Records::new()))
        .collect();
    if let Some(orders) = collections.get_mut("orders") {
        orders.insert(
            "ord-1".to_string(),
            json!({ "id": "ord-1", "total": 100.0, "refunded": 0.0, "status": "paid" }),
        );
    }

    let state = AppState {
        config: Arc::new(config),
        tokens: Arc::new(RwLock::new(HashSet::new())),
        collections: Arc::new(RwLock::new(collections)),
    };

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/revoke", post(revoke))
        .route("/orders/{id}/refund", post(refund))
        .route("/{collection}", get(list).post(create))
        .route(
            "/{collection}/{id}",
            get(fetch).put(update).delete(remove),
        )
        .with_state(state)
}

pub fn upload_app(token: impl Into<String>) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::disable())
        .with_state(Arc::new(token.into()))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_upload(listener: TcpListener, token: String) -> Result<(), std::io::Error> {
    axum::serve(listener, upload_app(token)).await
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Failure> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let Some(token) = token else {
        return Err(failure(StatusCode::UNAUTHORIZED, "missing token"));
    };
    if state.tokens.read().await.contains(token) {
        Ok(())
    } else {
        Err(failure(StatusCode::UNAUTHORIZED, "invalid token"))
    }
}

fn is_public_read(collection: &str) -> bool {
    collection == "products"
}

fn known(collection: &str) -> Result<(), Failure> {
    if COLLECTIONS.contains(&collection) {
        Ok(())
    } else {
        Err(failure(StatusCode::NOT_FOUND, "unknown resource"))
    }
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<Value>, Failure> {
    if input.email != state.config.email || input.password != state.config.password {
        return Err(failure(StatusCode::UNAUTHORIZED, "invalid credentials"));
    }
    let token = Uuid::new_v4().to_string();
    state.tokens.write().await.insert(token.clone());
    info!(email = %input.email, "issued token");
    Ok(Json(json!({
        "token": token,
        "role": state.config.role,
        "permissions": {
            "productManagement": true,
            "orderManagement": true,
            "categoryManagement": true,
            "couponManagement": false,
        },
        "userId": state.config.user_id,
    })))
}

async fn revoke(State(state): State<AppState>) -> StatusCode {
    state.tokens.write().await.clear();
    StatusCode::NO_CONTENT
}

async fn list(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<Value>>, Failure> {
    known(&collection)?;
    if !is_public_read(&collection) {
        authorize(&state, &headers).await?;
    }
    let collections = state.collections.read().await;
    let records: Option<Vec<Value>> =
        collections.get(&collection).map(|r| r.values().cloned().collect());
    Ok(Json(records.unwrap_or_default()))
}

async fn fetch(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, Failure> {
    known(&collection)?;
    if !is_public_read(&collection) {
        authorize(&state, &headers).await?;
    }
    let collections = state.collections.read().await;
    collections
        .get(&collection)
        .and_then(|records| records.get(&id))
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "not found"))
}

async fn create(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(mut input): Json<Value>,
) -> Result<(StatusCode, Json<Value>), Failure> {
    known(&collection)?;
    authorize(&state, &headers).await?;
    let Some(object) = input.as_object_mut() else {
        return Err(failure(StatusCode::BAD_REQUEST, "expected an object"));
    };
    let id = Uuid::new_v4().to_string();
    object.insert("id".to_string(), Value::String(id.clone()));

    let mut collections = state.collections.write().await;
    collections
        .entry(collection)
        .or_default()
        .insert(id, input.clone());
    Ok((StatusCode::CREATED, Json(input)))
}

async fn update(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(input): Json<Value>,
) -> Result<Json<Value>, Failure> {
    known(&collection)?;
    authorize(&state, &headers).await?;
    let Value::Object(changes) = input else {
        return Err(failure(StatusCode::BAD_REQUEST, "expected an object"));
    };

    let mut collections = state.collections.write().await;
    let record = collections
        .get_mut(&collection)
        .and_then(|records| records.get_mut(&id))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "not found"))?;
    for (key, value) in changes {
        if key != "id" {
            record.insert(key, value);
        }
    }
    Ok(Json(Value::Object(record.clone())))
}

async fn remove(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, Failure> {
    known(&collection)?;
    authorize(&state, &headers).await?;
    let mut collections = state.collections.write().await;
    collections
        .get_mut(&collection)
        .and_then(|records| records.remove(&id))
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "not found"))
}

async fn refund(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<RefundInput>,
) -> Result<Json<Value>, Failure> {
    authorize(&state, &headers).await?;
    let mut collections = state.collections.write().await;
    let order = collections
        .get_mut("orders")
        .and_then(|orders| orders.get_mut(&id))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "order not found"))?;

    let total = order.get("total").and_then(Value::as_f64).unwrap_or(0.0);
    let refunded = order.get("refunded").and_then(Value::as_f64).unwrap_or(0.0);
    if input.amount <= 0.0 || refunded + input.amount > total {
        return Err(failure(StatusCode::BAD_REQUEST, "refund exceeds order total"));
    }

    let refunded = refunded + input.amount;
    order.insert("refunded".to_string(), json!(refunded));
    order.insert("refundReason".to_string(), json!(input.reason));
    let status = if refunded >= total { "refunded" } else { "partially_refunded" };
    order.insert("status".to_string(), json!(status));
    Ok(Json(Value::Object(order.clone())))
}

async fn upload(
    State(token): State<Arc<String>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>, Failure> {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if presented != Some(token.as_str()) {
        return Err(failure(StatusCode::UNAUTHORIZED, "invalid upload credential"));
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.bin").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| failure(StatusCode::BAD_REQUEST, &e.body_text()))?;
        if data.is_empty() {
            break;
        }
        info!(%file_name, size = data.len(), "stored upload");
        return Ok(Json(json!({
            "path": format!("/uploads/{}-{file_name}", Uuid::new_v4().simple()),
        })));
    }
    Err(failure(StatusCode::BAD_REQUEST, "no file provided"))
}

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::{get, post};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_ECHO: &str = "/echo";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_STATUS: &str = "/status";
pub const PATH_USER_REGISTER: &str = "/user-register";

/// A request observed by the stub service, with its body decoded into flat string fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    /// `None` when the body was neither a flat JSON object nor a urlencoded form.
    pub fields: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    register_total: Arc<AtomicU64>,
    register_rejected: Arc<AtomicU64>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, req: RecordedRequest) {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(req);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn register_total(&self) -> u64 {
        self.register_total.load(Ordering::Relaxed)
    }

    /// `/user-register` requests answered with 422.
    pub fn register_rejected(&self) -> u64 {
        self.register_rejected.load(Ordering::Relaxed)
    }

    /// Snapshot of every `/user-register` request seen so far.
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub echo: String,
    pub slow: String,
    pub status: String,
    pub user_register: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            echo: format!("{base_url}{PATH_ECHO}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            status: format!("{base_url}{PATH_STATUS}"),
            user_register: format!("{base_url}{PATH_USER_REGISTER}"),
            base_url,
        }
    }
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    uid: u64,
    username: String,
    name: String,
    birthdate: String,
    role: &'static str,
}

fn decode_fields(content_type: Option<&str>, body: &[u8]) -> Option<BTreeMap<String, String>> {
    let ct = content_type.unwrap_or_default().to_ascii_lowercase();

    if ct.starts_with("application/x-www-form-urlencoded") {
        let fields = url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        return Some(fields);
    }

    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_slice(body).ok()?;
    let mut out = BTreeMap::new();
    for (k, v) in raw {
        let s = match v {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => continue,
            other => other.to_string(),
        };
        out.insert(k, s);
    }
    Some(out)
}

async fn handle_user_register(
    State(stats): State<TestServerStats>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Bytes) {
    stats.inc_requests_total();
    let uid = stats.register_total.fetch_add(1, Ordering::Relaxed) + 1;

    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let fields = decode_fields(content_type.as_deref(), &body);

    stats.record(RecordedRequest {
        method: method.to_string(),
        path: PATH_USER_REGISTER.to_string(),
        content_type,
        fields: fields.clone(),
    });

    let Some(fields) = fields else {
        stats.register_rejected.fetch_add(1, Ordering::Relaxed);
        return (StatusCode::UNPROCESSABLE_ENTITY, Bytes::from_static(b"bad body"));
    };

    let field = |k: &str| fields.get(k).cloned();
    let (Some(username), Some(name), Some(birthdate), Some(_password)) = (
        field("username"),
        field("name"),
        field("birthdate"),
        field("password"),
    ) else {
        stats.register_rejected.fetch_add(1, Ordering::Relaxed);
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Bytes::from_static(b"missing fields"),
        );
    };

    let res = RegisterResponse {
        uid,
        username,
        name,
        birthdate,
        role: "user",
    };

    match serde_json::to_vec(&res) {
        Ok(bytes) => (StatusCode::OK, Bytes::from(bytes)),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"encode error"),
        ),
    }
}

async fn handle_slow(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    sleep(Duration::from_millis(50)).await;
    "slow"
}

async fn handle_echo(State(stats): State<TestServerStats>, body: Bytes) -> (StatusCode, Bytes) {
    stats.inc_requests_total();
    (StatusCode::OK, body)
}

async fn handle_status(
    State(stats): State<TestServerStats>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    stats.inc_requests_total();

    query
        .get("code")
        .and_then(|c| c.parse::<u16>().ok())
        .and_then(|c| StatusCode::from_u16(c).ok())
        .unwrap_or(StatusCode::BAD_REQUEST)
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_SLOW, get(handle_slow).post(handle_slow))
        .route(PATH_ECHO, post(handle_echo))
        .route(PATH_STATUS, get(handle_status).post(handle_status))
        .route(PATH_USER_REGISTER, post(handle_user_register))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                tracing::warn!(error = %err, "test server stopped with error");
            }
        });

        let base_url = format!("http://{addr}");
        let urls = TestServerUrls::new(base_url.clone());
        tracing::debug!(%addr, "test server listening");

        Ok(Self {
            addr,
            base_url,
            urls,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_fields_reads_json_objects() {
        let body = br#"{"username":"admin","age":3,"gone":null}"#;
        let fields = decode_fields(Some("application/json"), body)
            .unwrap_or_else(|| panic!("expected json fields"));
        assert_eq!(fields.get("username").map(String::as_str), Some("admin"));
        assert_eq!(fields.get("age").map(String::as_str), Some("3"));
        assert!(!fields.contains_key("gone"));
    }

    #[test]
    fn decode_fields_reads_urlencoded_forms() {
        let body = b"username=admin&birthdate=2024-10-10T02%3A59%3A10.843897";
        let fields = decode_fields(Some("application/x-www-form-urlencoded"), body)
            .unwrap_or_else(|| panic!("expected form fields"));
        assert_eq!(
            fields.get("birthdate").map(String::as_str),
            Some("2024-10-10T02:59:10.843897")
        );
    }

    #[test]
    fn decode_fields_rejects_garbage() {
        assert!(decode_fields(Some("text/plain"), b"\x00\x01").is_none());
    }
}

//! Shared fixtures: a fake ONTAP REST endpoint and request helpers.

#![allow(dead_code)]

use std::future::IntoFuture;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// One request observed by the fake.
#[derive(Debug, Clone)]
pub struct Hit {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Clone, Default)]
struct FakeState {
    hits: Arc<Mutex<Vec<Hit>>>,
    fail_status: Arc<AtomicU16>,
    delay_ms: Arc<AtomicU64>,
}

/// Deterministic stand-in for an ONTAP cluster's `/api` surface.
pub struct FakeOntap {
    /// Value to pass as `cluster_ip`, e.g. `http://127.0.0.1:41234`.
    pub cluster_ip: String,
    state: FakeState,
}

impl FakeOntap {
    pub async fn start() -> Self {
        let state = FakeState::default();
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, app).into_future());
        Self {
            cluster_ip: format!("http://{addr}"),
            state,
        }
    }

    /// Answer every subsequent request with `status` and an ONTAP error body.
    pub fn fail_with(&self, status: u16) {
        self.state.fail_status.store(status, Ordering::SeqCst);
    }

    /// Hold every subsequent response for `delay`. The request is recorded
    /// before the wait, so callers can act while it is in flight.
    pub fn delay_responses(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.state.delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Wait until a `method` request for `path` has arrived.
    pub async fn wait_for_hit(&self, method: Method, path: &str) {
        let arrived = async {
            while !self
                .hits()
                .iter()
                .any(|h| h.method == method && h.path == path)
            {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), arrived)
            .await
            .unwrap_or_else(|_| panic!("no {method} {path} within 5s"));
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.state.hits.lock().unwrap().clone()
    }

    pub fn hit_paths(&self) -> Vec<String> {
        self.hits().into_iter().map(|h| h.path).collect()
    }

    /// `add_cluster` / `initializationOptions` entry pointing at this fake.
    pub fn cluster_entry(&self, name: &str) -> Value {
        json!({
            "name": name,
            "cluster_ip": self.cluster_ip,
            "username": "admin",
            "password": "secret",
        })
    }
}

async fn handle(State(state): State<FakeState>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    state.hits.lock().unwrap().push(Hit {
        method: method.clone(),
        path: uri.path().to_string(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let fail = state.fail_status.load(Ordering::SeqCst);
    if fail != 0 {
        let status = StatusCode::from_u16(fail).unwrap();
        let body = json!({"error": {"message": "User is not authorized", "code": "6"}});
        return (status, Json(body)).into_response();
    }

    match (method, uri.path()) {
        (Method::GET, "/api/cluster") => Json(json!({
            "name": "fake-cluster",
            "uuid": "c0ffee00-0000-0000-0000-000000000001",
            "state": "up",
            "version": {"full": "NetApp Release 9.14.1", "generation": 9, "major": 14, "minor": 1}
        }))
        .into_response(),
        (Method::GET, "/api/svm/svms") => Json(json!({
            "records": [{"uuid": "svm-uuid-1", "name": "vs0", "state": "running"}],
            "num_records": 1
        }))
        .into_response(),
        (Method::GET, "/api/storage/volumes") => Json(json!({
            "records": [{
                "uuid": "vol-uuid-1",
                "name": "vol1",
                "state": "online",
                "size": 107374182400_i64,
                "svm": {"uuid": "svm-uuid-1", "name": "vs0"}
            }],
            "num_records": 1
        }))
        .into_response(),
        (Method::PATCH | Method::DELETE, path) if path.starts_with("/api/storage/volumes/") => {
            Json(json!({})).into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"message": "entry doesn't exist", "code": "4"}})),
        )
            .into_response(),
    }
}

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

pub fn tool_call(id: u64, name: &str, arguments: Value) -> Value {
    request(id, "tools/call", json!({"name": name, "arguments": arguments}))
}

/// Text of `result.content[0]`.
pub fn result_text(response: &Value) -> String {
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

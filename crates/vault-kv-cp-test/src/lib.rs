//! In-process fake of the Vault KV v2 HTTP API for integration tests.
//!
//! Answers `LIST <mount>/metadata/<path>`, `GET <mount>/data/<path>` and
//! `POST <mount>/data/<path>` from a [`MemoryStore`]. Path segments are
//! percent-decoded the way Vault decodes them. The server runs on a
//! background thread with its own tokio runtime so blocking clients can talk
//! to it from plain `#[test]` functions.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::debug;
use vault_kv_cp_core::{KvStore, MemoryStore, RelPath, SecretData};

pub const DEFAULT_TOKEN: &str = "root";

/// Operation a fault is injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Read,
    Write,
}

/// Canned answer replacing the normal response for one operation and path.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Respond with this status and a Vault style `errors` body.
    Status(u16),
    /// Respond `200 OK` with this JSON body.
    Body(Value),
    /// Respond `204 No Content`.
    Empty,
}

impl Fault {
    fn respond(&self) -> Response {
        match self {
            Fault::Status(code) => errors(
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                "injected failure",
            ),
            Fault::Body(body) => (StatusCode::OK, Json(body.clone())).into_response(),
            Fault::Empty => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

struct Shared {
    token: String,
    store: MemoryStore,
    mounts: Mutex<BTreeSet<String>>,
    faults: Mutex<HashMap<(Op, String), Fault>>,
    requests: Mutex<Vec<Recorded>>,
}

struct Recorded {
    line: String,
    headers: HeaderMap,
}

impl Shared {
    fn fault(&self, op: Op, mount: &str, path: &RelPath) -> Option<Fault> {
        self.faults
            .lock()
            .unwrap()
            .get(&(op, fault_key(mount, path)))
            .cloned()
    }

    fn register(&self, mount: &str) {
        let mount = mount.trim_matches('/');
        if !mount.is_empty() {
            self.mounts.lock().unwrap().insert(mount.to_string());
        }
    }
}

/// Running fake Vault server. Shut down on drop.
pub struct FakeVault {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FakeVault {
    /// Start a server accepting [`DEFAULT_TOKEN`].
    pub fn start() -> Self {
        Self::with_token(DEFAULT_TOKEN)
    }

    pub fn with_token(token: &str) -> Self {
        let shared = Arc::new(Shared {
            token: token.to_string(),
            store: MemoryStore::new(),
            mounts: Mutex::new(BTreeSet::new()),
            faults: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        });
        let router = Router::new()
            .route("/v1/{*rest}", any(handle))
            .fallback(|| async { errors(StatusCode::NOT_FOUND, "no handler for route") })
            .with_state(shared.clone());
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("fake-vault".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("build fake vault runtime");
                runtime.block_on(async move {
                    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                        .await
                        .expect("bind fake vault listener");
                    addr_tx
                        .send(listener.local_addr().expect("fake vault address"))
                        .expect("report fake vault address");
                    axum::serve(listener, router)
                        .with_graceful_shutdown(async {
                            let _ = shutdown_rx.await;
                        })
                        .await
                        .expect("fake vault server");
                });
            })
            .expect("spawn fake vault thread");

        let addr = addr_rx.recv().expect("fake vault started");
        Self {
            addr,
            shared,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    /// Base URL to use as `VAULT_ADDR`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn token(&self) -> &str {
        &self.shared.token
    }

    /// Backing store, for seeding and inspecting secrets directly.
    pub fn store(&self) -> &MemoryStore {
        &self.shared.store
    }

    /// Declare a mount so requests under it route to it even when a mount
    /// segment is named `data` or `metadata`. Seeding and injecting register
    /// their mount implicitly; unregistered mounts end at the first such
    /// segment after the first one.
    pub fn mount(&self, mount: &str) {
        self.shared.register(mount);
    }

    /// Seed a secret. `data` must be a JSON object.
    pub fn insert(&self, mount: &str, path: &str, data: Value) {
        self.shared.register(mount);
        self.shared.store.insert(mount, path, object(data));
    }

    pub fn latest(&self, mount: &str, path: &str) -> Option<Value> {
        self.shared.store.latest(mount, path).map(Value::Object)
    }

    /// Every secret path under `mount`, sorted.
    pub fn paths(&self, mount: &str) -> Vec<String> {
        self.shared
            .store
            .paths(mount)
            .into_iter()
            .map(|path| path.as_str().to_string())
            .collect()
    }

    pub fn inject(&self, op: Op, mount: &str, path: &str, fault: Fault) {
        self.shared.register(mount);
        self.shared
            .faults
            .lock()
            .unwrap()
            .insert((op, fault_key(mount, &RelPath::new(path))), fault);
    }

    /// Requests served so far as `METHOD /path` lines, path still encoded.
    pub fn requests(&self) -> Vec<String> {
        self.shared
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.line.clone())
            .collect()
    }

    /// Value of header `name` on each request served so far, in order.
    pub fn header_values(&self, name: &str) -> Vec<Option<String>> {
        self.shared
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| {
                request
                    .headers
                    .get(name)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }
}

impl Drop for FakeVault {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn handle(
    State(shared): State<Arc<Shared>>,
    Path(rest): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    debug!(%method, %uri, "fake vault request");
    shared
        .requests
        .lock()
        .unwrap()
        .push(Recorded {
            line: format!("{method} {}", uri.path()),
            headers: headers.clone(),
        });

    let token = headers
        .get("x-vault-token")
        .and_then(|value| value.to_str().ok());
    if token != Some(shared.token.as_str()) {
        return errors(StatusCode::FORBIDDEN, "permission denied");
    }

    let mounts = shared.mounts.lock().unwrap().clone();
    let Some((mount, kind, path)) = split_api_path(&rest, &mounts) else {
        return errors(StatusCode::NOT_FOUND, "no handler for route");
    };
    let op = match (method.as_str(), kind.as_str()) {
        ("LIST", "metadata") => Op::List,
        ("GET", "metadata") if uri.query() == Some("list=true") => Op::List,
        ("GET", "data") => Op::Read,
        ("POST" | "PUT", "data") => Op::Write,
        _ => return errors(StatusCode::METHOD_NOT_ALLOWED, "unsupported operation"),
    };
    if let Some(fault) = shared.fault(op, &mount, &path) {
        return fault.respond();
    }

    match op {
        Op::List => match shared.store.list(&mount, &path) {
            Ok(Some(listing)) => Json(json!({ "data": listing.data() })).into_response(),
            Ok(None) => not_found(),
            Err(err) => errors(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        },
        Op::Read => match shared.store.get_latest(&mount, &path) {
            Ok(Some(secret)) => Json(json!({
                "data": {
                    "data": secret.data,
                    "metadata": {
                        "version": secret.version.unwrap_or(1),
                        "destroyed": false,
                        "deletion_time": "",
                    }
                }
            }))
            .into_response(),
            Ok(None) => not_found(),
            Err(err) => errors(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
        },
        Op::Write => {
            let data = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|mut payload| payload.get_mut("data").map(Value::take))
                .and_then(|data| match data {
                    Value::Object(map) => Some(map),
                    _ => None,
                });
            let Some(data) = data else {
                return errors(StatusCode::BAD_REQUEST, "no data provided");
            };
            match shared.store.put(&mount, &path, &data) {
                Ok(Some(receipt)) => Json(json!({
                    "data": {
                        "version": receipt.version,
                        "destroyed": false,
                        "deletion_time": "",
                    }
                }))
                .into_response(),
                Ok(None) => StatusCode::NO_CONTENT.into_response(),
                Err(err) => errors(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string()),
            }
        }
    }
}

// `<mount...>/<metadata|data>/<path...>` with the `/v1/` prefix removed and
// segments already decoded. The longest registered mount wins.
fn split_api_path(rest: &str, mounts: &BTreeSet<String>) -> Option<(String, String, RelPath)> {
    let segments: Vec<&str> = rest.split('/').filter(|segment| !segment.is_empty()).collect();
    let is_kind = |segment: &str| segment == "metadata" || segment == "data";
    let registered = mounts
        .iter()
        .map(|mount| mount.split('/').count())
        .filter(|&len| {
            segments.len() > len
                && is_kind(segments[len])
                && mounts.contains(&segments[..len].join("/"))
        })
        .max();
    let kind_at = match registered {
        Some(len) => len,
        None => segments
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, segment)| is_kind(segment))
            .map(|(index, _)| index)?,
    };
    let mount = segments[..kind_at].join("/");
    let path = RelPath::new(&segments[kind_at + 1..].join("/"));
    Some((mount, segments[kind_at].to_string(), path))
}

fn fault_key(mount: &str, path: &RelPath) -> String {
    format!("{}:{}", mount.trim_matches('/'), path.as_str())
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "errors": [] }))).into_response()
}

fn errors(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "errors": [message] }))).into_response()
}

fn object(value: Value) -> SecretData {
    match value {
        Value::Object(map) => map,
        other => panic!("secret data must be a JSON object, got {other}"),
    }
}

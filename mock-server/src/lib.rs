use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error};

/// A canned answer for the next request.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: json!({"success": false, "error": format!("E{status}"), "message": "scripted failure"}).to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request as the server received it.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct Journal {
    script: VecDeque<Reply>,
    requests: Vec<RecordedRequest>,
}

/// Shared script and request journal.
#[derive(Clone, Default)]
pub struct Db {
    inner: Arc<Mutex<Journal>>,
}

impl Db {
    /// Queue a reply; unscripted requests get a default success body.
    pub fn push(&self, reply: Reply) {
        self.lock().script.push_back(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub fn app(db: Db) -> Router {
    Router::new().fallback(handle).with_state(db)
}

pub async fn run(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app(db)).await
}

/// A server running on a background thread.
pub struct MockServer {
    pub base_url: String,
    pub db: Db,
}

/// Serve on a random local port from a dedicated thread.
pub fn spawn() -> Result<MockServer, std::io::Error> {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = std_listener.local_addr()?;
    std_listener.set_nonblocking(true)?;
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    let db = Db::default();
    let served = db.clone();
    std::thread::spawn(move || {
        let outcome = runtime.block_on(async {
            let listener = TcpListener::from_std(std_listener)?;
            run(listener, served).await
        });
        if let Err(e) = outcome {
            error!(error = %e, "mock server stopped");
        }
    });

    Ok(MockServer {
        base_url: format!("http://{addr}/api/v3"),
        db,
    })
}

async fn handle(State(db): State<Db>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    let recorded = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_string()))
            .collect(),
        body,
    };
    debug!(method = %recorded.method, path = %recorded.path, "mock request");

    let reply = {
        let mut journal = db.lock();
        journal.requests.push(recorded);
        journal.script.pop_front()
    };
    let reply = reply.unwrap_or_else(|| {
        Reply::json(json!({"success": true, "data": {"method": method.as_str(), "path": uri.path()}}))
    });

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], reply.body).into_response()
}

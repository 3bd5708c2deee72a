#![allow(dead_code)]
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode, Uri};
use axum::Router;
use serde_json::Value;
use tower::Service;

use server::routes;
use server::state::ServerState;
use service::domain::{App, Team, Unit};
use service::provisioner::HttpProvisioner;
use service::repo::FileEntityStore;
use service::repository::EntityStore;

type Calls = Arc<Mutex<Vec<(Method, String)>>>;

#[derive(Clone)]
struct FakeState {
    calls: Calls,
    post_status: StatusCode,
    post_body: &'static str,
}

/// Provisioner stand-in: records `(method, path)` and answers POSTs with a canned reply.
pub struct FakeProvisioner {
    addr: SocketAddr,
    calls: Calls,
    handle: tokio::task::JoinHandle<()>,
}

async fn record(State(state): State<FakeState>, method: Method, uri: Uri) -> (StatusCode, String) {
    let is_post = method == Method::POST;
    state.calls.lock().unwrap().push((method, uri.path().to_string()));
    if is_post {
        (state.post_status, state.post_body.to_string())
    } else {
        (StatusCode::OK, String::new())
    }
}

impl FakeProvisioner {
    pub async fn start(post_status: StatusCode, post_body: &'static str) -> anyhow::Result<Self> {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .fallback(record)
            .with_state(FakeState { calls: Arc::clone(&calls), post_status, post_body });
        let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, calls, handle })
    }

    pub fn url(&self) -> String { format!("http://{}", self.addr) }

    pub fn calls(&self) -> Vec<(Method, String)> { self.calls.lock().unwrap().clone() }

    pub async fn wait_for(&self, method: Method, path: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.calls().iter().any(|(m, p)| *m == method && p == path) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for FakeProvisioner {
    fn drop(&mut self) { self.handle.abort(); }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<FileEntityStore>,
}

/// Router over a fresh file store in a unique temp directory.
pub async fn build_app() -> anyhow::Result<TestApp> {
    let dir = std::env::temp_dir().join(format!("broker_api_{}", uuid::Uuid::new_v4()));
    let store = FileEntityStore::open(&dir).await?;
    let provisioner = Arc::new(HttpProvisioner::new(Duration::from_secs(5), Duration::from_secs(2))?);
    let state = ServerState::new(store.clone(), provisioner, "production");
    let router = routes::build_router(state, tower_http::cors::CorsLayer::very_permissive());
    Ok(TestApp { router, store })
}

pub async fn seed_team(store: &FileEntityStore, name: &str, users: &[&str]) -> anyhow::Result<()> {
    store.insert_team(&Team::new(name, users.iter().map(|u| u.to_string()).collect())).await?;
    Ok(())
}

pub async fn seed_app(store: &FileEntityStore, name: &str, teams: &[&str], ips: &[&str]) -> anyhow::Result<()> {
    let mut app = App::new(name, teams.iter().map(|t| t.to_string()).collect());
    app.units = ips
        .iter()
        .enumerate()
        .map(|(i, ip)| Unit { name: format!("{name}/{i}"), ip: Some(ip.to_string()) })
        .collect();
    store.insert_app(&app).await?;
    Ok(())
}

pub fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> anyhow::Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(email) = user {
        builder = builder.header("x-user-email", email);
    }
    let req = match body {
        Some(json) => builder.header("content-type", "application/json").body(Body::from(serde_json::to_vec(&json)?))?,
        None => builder.body(Body::empty())?,
    };
    Ok(req)
}

/// Sends through the router; the body is parsed as JSON when it is JSON, else kept as a string.
pub async fn send(app: &TestApp, req: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let resp = app.router.clone().call(req).await?;
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    Ok((status, value))
}

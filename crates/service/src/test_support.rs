#![cfg(test)]
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::Router;
use tokio::task::JoinHandle;

use crate::domain::{App, EnvVar, Service, ServiceInstance, Team, Unit};
use crate::errors::ServiceError;
use crate::repo::FileEntityStore;
use crate::repository::EntityStore;

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: String,
}

type Responder = Arc<dyn Fn(&Method, &str) -> (StatusCode, String) + Send + Sync>;

#[derive(Clone)]
struct FakeState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    respond: Responder,
}

/// Local HTTP server standing in for a service's provisioner API.
pub struct FakeProvisionerServer {
    addr: SocketAddr,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    handle: JoinHandle<()>,
}

async fn record(State(state): State<FakeState>, method: Method, uri: Uri, body: String) -> (StatusCode, String) {
    let path = uri.path().to_string();
    let reply = (state.respond)(&method, &path);
    state.calls.lock().unwrap().push(RecordedCall { method, path, body });
    reply
}

impl FakeProvisionerServer {
    pub async fn start<F>(respond: F) -> anyhow::Result<Self>
    where
        F: Fn(&Method, &str) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = FakeState { calls: Arc::clone(&calls), respond: Arc::new(respond) };
        let app = Router::new().fallback(record).with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, calls, handle })
    }

    pub fn url(&self) -> String { format!("http://{}", self.addr) }

    pub fn calls(&self) -> Vec<RecordedCall> { self.calls.lock().unwrap().clone() }

    /// Polls until at least `n` calls arrived or `timeout` elapsed.
    pub async fn wait_for_calls(&self, n: usize, timeout: Duration) -> Vec<RecordedCall> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let calls = self.calls();
            if calls.len() >= n || tokio::time::Instant::now() >= deadline {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for FakeProvisionerServer {
    fn drop(&mut self) { self.handle.abort(); }
}

pub fn temp_dir() -> PathBuf { std::env::temp_dir().join(format!("broker_test_{}", uuid::Uuid::new_v4())) }

pub async fn temp_store() -> anyhow::Result<Arc<FileEntityStore>> { Ok(FileEntityStore::open(temp_dir()).await?) }

pub async fn seed_team(store: &dyn EntityStore, name: &str, users: &[&str]) -> anyhow::Result<Team> {
    let team = Team::new(name, users.iter().map(|u| u.to_string()).collect());
    store.insert_team(&team).await?;
    Ok(team)
}

pub async fn seed_service(store: &dyn EntityStore, name: &str, endpoint: Option<&str>, teams: &[&str]) -> anyhow::Result<Service> {
    let mut endpoints = BTreeMap::new();
    if let Some(url) = endpoint {
        endpoints.insert("production".to_string(), url.to_string());
    }
    let svc = Service::new(name, endpoints, teams.iter().map(|t| t.to_string()).collect());
    store.insert_service(&svc).await?;
    Ok(svc)
}

pub async fn seed_instance(store: &dyn EntityStore, name: &str, service: &str, teams: &[&str]) -> anyhow::Result<ServiceInstance> {
    let inst = ServiceInstance::new(name, service, teams.iter().map(|t| t.to_string()).collect());
    store.insert_instance(&inst).await?;
    Ok(inst)
}

pub async fn seed_app(store: &dyn EntityStore, name: &str, teams: &[&str], ips: &[&str]) -> anyhow::Result<App> {
    let mut app = App::new(name, teams.iter().map(|t| t.to_string()).collect());
    app.units = ips
        .iter()
        .enumerate()
        .map(|(i, ip)| Unit { name: format!("{name}/{i}"), ip: Some(ip.to_string()) })
        .collect();
    store.insert_app(&app).await?;
    Ok(app)
}

/// Delegating store that can be told to fail selected writes.
pub struct FlakyStore {
    pub inner: Arc<FileEntityStore>,
    pub fail_set_env: AtomicBool,
    pub fail_add_app: AtomicBool,
    pub fail_unset_env: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<FileEntityStore>) -> Self {
        Self {
            inner,
            fail_set_env: AtomicBool::new(false),
            fail_add_app: AtomicBool::new(false),
            fail_unset_env: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> Result<(), ServiceError> {
        if flag.load(Ordering::SeqCst) {
            return Err(ServiceError::Failure("injected store failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn insert_service(&self, s: &Service) -> Result<(), ServiceError> { self.inner.insert_service(s).await }
    async fn get_service(&self, name: &str) -> Result<Option<Service>, ServiceError> { self.inner.get_service(name).await }
    async fn update_service(&self, s: &Service) -> Result<(), ServiceError> { self.inner.update_service(s).await }
    async fn add_team_to_service(&self, s: &str, team: &str) -> Result<Service, ServiceError> {
        self.inner.add_team_to_service(s, team).await
    }
    async fn remove_team_from_service(&self, s: &str, team: &str) -> Result<Service, ServiceError> {
        self.inner.remove_team_from_service(s, team).await
    }
    async fn delete_service(&self, name: &str) -> Result<bool, ServiceError> { self.inner.delete_service(name).await }
    async fn list_services(&self) -> Result<Vec<Service>, ServiceError> { self.inner.list_services().await }
    async fn insert_instance(&self, i: &ServiceInstance) -> Result<(), ServiceError> { self.inner.insert_instance(i).await }
    async fn get_instance(&self, name: &str) -> Result<Option<ServiceInstance>, ServiceError> { self.inner.get_instance(name).await }
    async fn delete_instance(&self, name: &str) -> Result<bool, ServiceError> { self.inner.delete_instance(name).await }
    async fn list_instances(&self) -> Result<Vec<ServiceInstance>, ServiceError> { self.inner.list_instances().await }
    async fn count_instances_of_service(&self, s: &str) -> Result<u64, ServiceError> { self.inner.count_instances_of_service(s).await }
    async fn add_app_to_instance(&self, instance: &str, app: &str) -> Result<bool, ServiceError> {
        Self::check(&self.fail_add_app)?;
        self.inner.add_app_to_instance(instance, app).await
    }
    async fn remove_app_from_instance(&self, instance: &str, app: &str) -> Result<bool, ServiceError> {
        self.inner.remove_app_from_instance(instance, app).await
    }
    async fn insert_app(&self, a: &App) -> Result<(), ServiceError> { self.inner.insert_app(a).await }
    async fn get_app(&self, name: &str) -> Result<Option<App>, ServiceError> { self.inner.get_app(name).await }
    async fn set_app_env(&self, app: &str, vars: &[EnvVar]) -> Result<(), ServiceError> {
        Self::check(&self.fail_set_env)?;
        self.inner.set_app_env(app, vars).await
    }
    async fn unset_app_env(&self, app: &str, keys: &[String]) -> Result<(), ServiceError> { self.inner.unset_app_env(app, keys).await }
    async fn unset_app_env_from_instance(&self, app: &str, instance: &str) -> Result<(), ServiceError> {
        Self::check(&self.fail_unset_env)?;
        self.inner.unset_app_env_from_instance(app, instance).await
    }
    async fn replace_app_env_from_instance(&self, app: &str, instance: &str, vars: &[EnvVar]) -> Result<(), ServiceError> {
        Self::check(&self.fail_set_env)?;
        self.inner.replace_app_env_from_instance(app, instance, vars).await
    }
    async fn insert_team(&self, t: &Team) -> Result<(), ServiceError> { self.inner.insert_team(t).await }
    async fn get_team(&self, name: &str) -> Result<Option<Team>, ServiceError> { self.inner.get_team(name).await }
    async fn teams_of_user(&self, email: &str) -> Result<Vec<Team>, ServiceError> { self.inner.teams_of_user(email).await }
}

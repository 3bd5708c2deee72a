use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered external service type (e.g. `mysql`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Environment name -> provisioner base URL.
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    /// Teams granted access. Never empty once created.
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub doc: String,
    pub created_at: DateTime<Utc>,
}

impl Service {
    pub fn new(name: impl Into<String>, endpoints: BTreeMap<String, String>, teams: Vec<String>) -> Self {
        Self { name: name.into(), endpoints, teams, doc: String::new(), created_at: Utc::now() }
    }

    pub fn endpoint(&self, environment: &str) -> Option<&str> {
        self.endpoints.get(environment).map(String::as_str).filter(|u| !u.is_empty())
    }

    pub fn has_endpoint(&self) -> bool { self.endpoints.values().any(|u| !u.is_empty()) }
}

/// Named provisioned resource of a [`Service`], e.g. one mysql database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub name: String,
    pub service_name: String,
    #[serde(default)]
    pub teams: Vec<String>,
    /// Names of the apps currently bound. Unique.
    #[serde(default)]
    pub apps: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn new(name: impl Into<String>, service_name: impl Into<String>, teams: Vec<String>) -> Self {
        Self { name: name.into(), service_name: service_name.into(), teams, apps: Vec::new(), created_at: Utc::now() }
    }

    pub fn is_bound(&self, app: &str) -> bool { self.apps.iter().any(|a| a == app) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    /// Network address; absent until the unit is deployed.
    #[serde(default)]
    pub ip: Option<String>,
}

impl Unit {
    pub fn address(&self) -> Option<&str> { self.ip.as_deref().filter(|ip| !ip.is_empty()) }
}

/// One configuration record of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
    pub public: bool,
    /// Instance that injected this record; empty for user-set records.
    #[serde(default)]
    pub instance_name: String,
}

impl EnvVar {
    /// Private record owned by a service instance.
    pub fn from_instance(name: impl Into<String>, value: impl Into<String>, instance: &str) -> Self {
        Self { name: name.into(), value: value.into(), public: false, instance_name: instance.to_string() }
    }
}

/// Deployable application consuming service instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub name: String,
    #[serde(default)]
    pub framework: String,
    #[serde(default)]
    pub teams: Vec<String>,
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub env: BTreeMap<String, EnvVar>,
}

impl App {
    pub fn new(name: impl Into<String>, teams: Vec<String>) -> Self {
        Self { name: name.into(), framework: String::new(), teams, units: Vec::new(), env: BTreeMap::new() }
    }

    /// Addresses of the units that have one, in unit order.
    pub fn addresses(&self) -> Vec<String> {
        self.units.iter().filter_map(Unit::address).map(str::to_string).collect()
    }

    pub fn set_env(&mut self, vars: impl IntoIterator<Item = EnvVar>) {
        for v in vars {
            self.env.insert(v.name.clone(), v);
        }
    }

    /// Drops every record injected by `instance`; returns the removed keys.
    pub fn unset_env_from_instance(&mut self, instance: &str) -> Vec<String> {
        let keys: Vec<String> = self
            .env
            .values()
            .filter(|v| v.instance_name == instance)
            .map(|v| v.name.clone())
            .collect();
        for k in &keys {
            self.env.remove(k);
        }
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub users: Vec<String>,
}

impl Team {
    pub fn new(name: impl Into<String>, users: Vec<String>) -> Self { Self { name: name.into(), users } }

    pub fn contains_user(&self, email: &str) -> bool { self.users.iter().any(|u| u == email) }
}

/// Authenticated caller, identified by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self { Self { email: email.into() } }
}

/// Service manifest as uploaded by a service owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceManifest {
    pub id: String,
    /// Environment name -> provisioner base URL; `production` is mandatory.
    #[serde(default)]
    pub endpoint: BTreeMap<String, String>,
}

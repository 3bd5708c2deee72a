//! Client for the remote provisioner API each service type exposes.
//!
//! `POST {endpoint}/resources/{instance}` with `{"hostnames": [...]}` asks the
//! provisioner to grant the listed unit addresses access to the instance; a
//! 2xx body is a flat JSON object of configuration values (empty body means
//! none). `DELETE {endpoint}/resources/{instance}/hostname/{hostname}` revokes
//! one address, and 404 counts as already revoked.

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use configs::ProvisionerConfig;

use crate::errors::ServiceError;
use crate::observability::PROVISIONER_REQUESTS;

#[derive(Debug, Error)]
pub enum ProvisionerError {
    #[error("failed to reach provisioner at {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("provisioner request to {url} timed out")]
    Timeout { url: String },
    #[error("provisioner at {url} responded {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("invalid provisioner response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

impl ProvisionerError {
    fn outcome(&self) -> &'static str {
        match self {
            ProvisionerError::Transport { .. } => "transport_error",
            ProvisionerError::Timeout { .. } => "timeout",
            ProvisionerError::Status { .. } => "status_error",
            ProvisionerError::Decode { .. } => "decode_error",
        }
    }
}

impl From<ProvisionerError> for ServiceError {
    fn from(e: ProvisionerError) -> Self { ServiceError::Failure(e.to_string()) }
}

/// Remote resource provisioning, keyed by service endpoint and instance name.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Grants `hostnames` access to `instance`; returns configuration to inject.
    async fn provision(
        &self,
        endpoint: &str,
        instance: &str,
        hostnames: &[String],
    ) -> Result<BTreeMap<String, String>, ProvisionerError>;

    /// Revokes one address. Succeeds when the provisioner no longer knows it.
    async fn deprovision(&self, endpoint: &str, instance: &str, hostname: &str) -> Result<(), ProvisionerError>;
}

#[derive(Serialize)]
struct ProvisionRequest<'a> {
    hostnames: &'a [String],
}

/// Builds `{endpoint}/resources/{instance}`; endpoints without a scheme are plain http.
pub fn resource_url(endpoint: &str, instance: &str) -> String {
    let base = endpoint.trim().trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}/resources/{instance}")
    } else {
        format!("http://{base}/resources/{instance}")
    }
}

/// reqwest-backed [`Provisioner`] with per-request and connect timeouts.
#[derive(Clone)]
pub struct HttpProvisioner {
    client: reqwest::Client,
}

impl HttpProvisioner {
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(ServiceError::failure)?;
        Ok(Self { client })
    }

    pub fn from_config(cfg: &ProvisionerConfig) -> Result<Self, ServiceError> {
        Self::new(cfg.request_timeout(), cfg.connect_timeout())
    }
}

fn send_err(url: &str, e: reqwest::Error) -> ProvisionerError {
    if e.is_timeout() {
        ProvisionerError::Timeout { url: url.to_string() }
    } else {
        ProvisionerError::Transport { url: url.to_string(), reason: e.to_string() }
    }
}

fn record(method: &str, res: &Result<impl Sized, ProvisionerError>) {
    let outcome = match res {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    PROVISIONER_REQUESTS.with_label_values(&[method, outcome]).inc();
}

fn decode_config(url: &str, body: &str) -> Result<BTreeMap<String, String>, ProvisionerError> {
    if body.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(body).map_err(|e| ProvisionerError::Decode { url: url.to_string(), reason: e.to_string() })
}

impl HttpProvisioner {
    async fn do_provision(&self, url: &str, hostnames: &[String]) -> Result<BTreeMap<String, String>, ProvisionerError> {
        let resp = self
            .client
            .post(url)
            .json(&ProvisionRequest { hostnames })
            .send()
            .await
            .map_err(|e| send_err(url, e))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| send_err(url, e))?;
        if !status.is_success() {
            return Err(ProvisionerError::Status { url: url.to_string(), status: status.as_u16(), body });
        }
        decode_config(url, &body)
    }

    async fn do_deprovision(&self, url: &str) -> Result<(), ProvisionerError> {
        let resp = self.client.delete(url).send().await.map_err(|e| send_err(url, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            debug!(%url, "address already revoked");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ProvisionerError::Status { url: url.to_string(), status: status.as_u16(), body })
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    #[instrument(skip(self, hostnames), fields(hostnames = hostnames.len()))]
    async fn provision(
        &self,
        endpoint: &str,
        instance: &str,
        hostnames: &[String],
    ) -> Result<BTreeMap<String, String>, ProvisionerError> {
        let url = resource_url(endpoint, instance);
        let res = self.do_provision(&url, hostnames).await;
        record("POST", &res);
        if let Err(e) = &res {
            warn!(error = %e, "provision failed");
        }
        res
    }

    #[instrument(skip(self))]
    async fn deprovision(&self, endpoint: &str, instance: &str, hostname: &str) -> Result<(), ProvisionerError> {
        let url = format!("{}/hostname/{}", resource_url(endpoint, instance), hostname);
        let res = self.do_deprovision(&url).await;
        record("DELETE", &res);
        res
    }
}

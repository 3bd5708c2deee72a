//! Bind/unbind protocol between apps, service instances and remote provisioners.
//!
//! Bind is synchronous: the provisioner is called first, then the records the
//! instance injected into the app are replaced by the fresh ones, then the app
//! is appended to the instance's bound list with an add-if-absent update. A bind that provisioned remotely but
//! could not record locally rolls back the configuration it wrote and revokes
//! every unit address before failing.
//!
//! Unbind commits the local removal and hands revocation to a detached task.

use std::sync::Arc;

use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::access::{has_access, user_teams};
use crate::domain::{App, EnvVar, ServiceInstance, User};
use crate::errors::{messages, ServiceError};
use crate::observability::{
    result_label, BIND_COMPENSATIONS_TOTAL, BIND_DURATION, BIND_RACES_LOST_TOTAL, BIND_TOTAL, DEPROVISION_FAILURES_TOTAL,
    UNBIND_TOTAL,
};
use crate::provisioner::Provisioner;
use crate::repository::EntityStore;

pub struct BindingOrchestrator {
    store: Arc<dyn EntityStore>,
    provisioner: Arc<dyn Provisioner>,
    environment: String,
}

/// Records a bind is about to replace, so a failed bind can put them back.
struct EnvSnapshot {
    /// Records with the same name as an injected one, or owned by the instance.
    previous: Vec<EnvVar>,
    /// Injected names the app did not have before.
    added: Vec<String>,
}

impl EnvSnapshot {
    fn capture(app: &App, instance: &str, vars: &[EnvVar]) -> Self {
        let previous = app
            .env
            .values()
            .filter(|e| e.instance_name == instance || vars.iter().any(|v| v.name == e.name))
            .cloned()
            .collect();
        let added = vars.iter().filter(|v| !app.env.contains_key(&v.name)).map(|v| v.name.clone()).collect();
        Self { previous, added }
    }

    fn is_empty(&self) -> bool { self.previous.is_empty() && self.added.is_empty() }
}

impl BindingOrchestrator {
    /// `environment` selects which service endpoint is called, usually `production`.
    pub fn new(store: Arc<dyn EntityStore>, provisioner: Arc<dyn Provisioner>, environment: impl Into<String>) -> Self {
        Self { store, provisioner, environment: environment.into() }
    }

    pub fn environment(&self) -> &str { &self.environment }

    /// Binds `app_name` to `instance_name` on behalf of `user`; returns the updated app.
    #[instrument(skip(self, user), fields(user = %user.email))]
    pub async fn bind_app(&self, user: &User, instance_name: &str, app_name: &str) -> Result<App, ServiceError> {
        let (instance, mut app) = self.load_for_user(user, instance_name, app_name).await?;
        self.bind(&instance, &mut app).await?;
        Ok(app)
    }

    /// Unbinds `app_name` from `instance_name` on behalf of `user`; returns the updated app.
    #[instrument(skip(self, user), fields(user = %user.email))]
    pub async fn unbind_app(&self, user: &User, instance_name: &str, app_name: &str) -> Result<App, ServiceError> {
        let (instance, mut app) = self.load_for_user(user, instance_name, app_name).await?;
        self.unbind(&instance, &mut app).await?;
        Ok(app)
    }

    async fn load_for_user(&self, user: &User, instance_name: &str, app_name: &str) -> Result<(ServiceInstance, App), ServiceError> {
        let instance = self
            .store
            .get_instance(instance_name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::INSTANCE_NOT_FOUND.into()))?;
        let teams = user_teams(self.store.as_ref(), user).await?;
        if !has_access(&instance.teams, &teams) {
            return Err(ServiceError::Forbidden(messages::NO_INSTANCE_ACCESS.into()));
        }
        let app = self
            .store
            .get_app(app_name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::APP_NOT_FOUND.into()))?;
        if !has_access(&app.teams, &teams) {
            return Err(ServiceError::Forbidden(messages::NO_APP_ACCESS.into()));
        }
        Ok((instance, app))
    }

    /// Binds `app` to `instance`. On success `app.env` holds the injected records.
    #[instrument(skip_all, fields(instance = %instance.name, app = %app.name))]
    pub async fn bind(&self, instance: &ServiceInstance, app: &mut App) -> Result<(), ServiceError> {
        let timer = BIND_DURATION.start_timer();
        let res = self.try_bind(instance, app).await;
        timer.observe_duration();
        BIND_TOTAL.with_label_values(&[result_label(&res)]).inc();
        match &res {
            Ok(()) => info!(env = app.env.len(), "app_bound"),
            Err(e) => warn!(error = %e, "bind failed"),
        }
        res
    }

    async fn try_bind(&self, instance: &ServiceInstance, app: &mut App) -> Result<(), ServiceError> {
        if instance.is_bound(&app.name) {
            return Err(ServiceError::Conflict(messages::APP_ALREADY_BOUND.into()));
        }
        let service = self
            .store
            .get_service(&instance.service_name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into()))?;

        let hostnames = app.addresses();
        let mut endpoint = None;
        let mut vars = Vec::new();
        if service.has_endpoint() {
            if hostnames.is_empty() {
                return Err(ServiceError::PreconditionFailed(messages::APP_WITHOUT_UNITS.into()));
            }
            let url = service.endpoint(&self.environment).ok_or_else(|| {
                ServiceError::Failure(format!("Service {} has no endpoint for {}", service.name, self.environment))
            })?;
            let config = self.provisioner.provision(url, &instance.name, &hostnames).await?;
            debug!(keys = config.len(), "provisioned");
            vars = config.into_iter().map(|(k, v)| EnvVar::from_instance(k, v, &instance.name)).collect();
            endpoint = Some(url.to_string());
        }

        // records from an earlier bind of this instance are superseded, not merged
        let snapshot = EnvSnapshot::capture(app, &instance.name, &vars);
        if !snapshot.is_empty() {
            if let Err(e) = self.store.replace_app_env_from_instance(&app.name, &instance.name, &vars).await {
                self.compensate(endpoint.as_deref(), &instance.name, &hostnames).await;
                return Err(ServiceError::failure(e));
            }
        }

        match self.store.add_app_to_instance(&instance.name, &app.name).await {
            Ok(true) => {}
            // a concurrent bind recorded the app first and owns the remote resource
            Ok(false) => {
                BIND_RACES_LOST_TOTAL.inc();
                warn!(hostnames = ?hostnames, "bind lost to a concurrent bind; provisioned resource left to the winner");
                return Err(ServiceError::Conflict(messages::APP_ALREADY_BOUND.into()));
            }
            Err(e) => {
                if !snapshot.is_empty() {
                    self.restore_env(&app.name, &snapshot).await;
                }
                self.compensate(endpoint.as_deref(), &instance.name, &hostnames).await;
                return Err(ServiceError::failure(e));
            }
        }

        app.unset_env_from_instance(&instance.name);
        app.set_env(vars);
        Ok(())
    }

    async fn restore_env(&self, app: &str, snapshot: &EnvSnapshot) {
        if !snapshot.added.is_empty() {
            if let Err(e) = self.store.unset_app_env(app, &snapshot.added).await {
                warn!(error = %e, keys = ?snapshot.added, "failed to drop injected configuration");
            }
        }
        if !snapshot.previous.is_empty() {
            if let Err(e) = self.store.set_app_env(app, &snapshot.previous).await {
                warn!(error = %e, "failed to restore replaced configuration");
            }
        }
    }

    /// Revokes every address granted by a bind that could not be recorded.
    async fn compensate(&self, endpoint: Option<&str>, instance: &str, hostnames: &[String]) {
        let Some(endpoint) = endpoint else { return };
        BIND_COMPENSATIONS_TOTAL.inc();
        for host in hostnames {
            if let Err(e) = self.provisioner.deprovision(endpoint, instance, host).await {
                DEPROVISION_FAILURES_TOTAL.inc();
                warn!(error = %e, hostname = %host, "compensating deprovision failed");
            }
        }
    }

    /// Unbinds `app` from `instance`. Revocation at the provisioner happens in
    /// the background after the local state is committed.
    #[instrument(skip_all, fields(instance = %instance.name, app = %app.name))]
    pub async fn unbind(&self, instance: &ServiceInstance, app: &mut App) -> Result<(), ServiceError> {
        let res = self.try_unbind(instance, app).await;
        UNBIND_TOTAL.with_label_values(&[result_label(&res)]).inc();
        match &res {
            Ok(()) => info!("app_unbound"),
            Err(e) => warn!(error = %e, "unbind failed"),
        }
        res
    }

    async fn try_unbind(&self, instance: &ServiceInstance, app: &mut App) -> Result<(), ServiceError> {
        if !instance.is_bound(&app.name) {
            return Err(ServiceError::PreconditionFailed(messages::APP_NOT_BOUND.into()));
        }
        let removed = self
            .store
            .remove_app_from_instance(&instance.name, &app.name)
            .await
            .map_err(ServiceError::failure)?;
        if !removed {
            return Err(ServiceError::PreconditionFailed(messages::APP_NOT_BOUND.into()));
        }

        // the app is unbound from here on, so its addresses are revoked whatever happens next
        self.spawn_deprovision(instance, app.addresses());

        self.store
            .unset_app_env_from_instance(&app.name, &instance.name)
            .await
            .map_err(ServiceError::failure)?;
        app.unset_env_from_instance(&instance.name);
        Ok(())
    }

    /// Detached: the task outlives the request that scheduled it.
    fn spawn_deprovision(&self, instance: &ServiceInstance, hostnames: Vec<String>) {
        if hostnames.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        let provisioner = Arc::clone(&self.provisioner);
        let environment = self.environment.clone();
        let instance_name = instance.name.clone();
        let service_name = instance.service_name.clone();
        let span = info_span!("deprovision", instance = %instance_name);
        tokio::spawn(
            async move {
                let service = match store.get_service(&service_name).await {
                    Ok(Some(s)) => s,
                    Ok(None) => {
                        warn!(service = %service_name, "service gone, nothing to deprovision");
                        return;
                    }
                    Err(e) => {
                        DEPROVISION_FAILURES_TOTAL.inc_by(hostnames.len() as u64);
                        warn!(error = %e, "could not load service for deprovision");
                        return;
                    }
                };
                let Some(endpoint) = service.endpoint(&environment) else { return };
                for host in &hostnames {
                    match provisioner.deprovision(endpoint, &instance_name, host).await {
                        Ok(()) => info!(hostname = %host, "unit_deprovisioned"),
                        Err(e) => {
                            DEPROVISION_FAILURES_TOTAL.inc();
                            warn!(error = %e, hostname = %host, "deprovision failed");
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
}

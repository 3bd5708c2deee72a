use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::access::{has_access, user_teams};
use crate::domain::{ServiceInstance, User};
use crate::errors::{messages, ServiceError};
use crate::repository::EntityStore;

/// Registry of provisioned service instances.
///
/// The bound-app list is only ever changed by the binding orchestrator.
pub struct ServiceInstanceRegistry {
    store: Arc<dyn EntityStore>,
}

impl ServiceInstanceRegistry {
    pub fn new(store: Arc<dyn EntityStore>) -> Self { Self { store } }

    /// Creates an instance of `service_name`. Its teams are the caller's teams
    /// that can use the service.
    #[instrument(skip(self, user), fields(user = %user.email))]
    pub async fn create(&self, user: &User, name: &str, service_name: &str) -> Result<ServiceInstance, ServiceError> {
        models::validate_name("service instance", name)?;
        let service = self
            .store
            .get_service(service_name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into()))?;
        let teams = user_teams(self.store.as_ref(), user).await?;
        let allowed: Vec<String> = teams
            .iter()
            .filter(|t| service.teams.contains(&t.name))
            .map(|t| t.name.clone())
            .collect();
        if allowed.is_empty() {
            return Err(ServiceError::Forbidden(messages::NO_SERVICE_ACCESS.into()));
        }
        if self.store.get_instance(name).await?.is_some() {
            return Err(ServiceError::Conflict(messages::instance_exists(name)));
        }
        let instance = ServiceInstance::new(name, &service.name, allowed);
        self.store.insert_instance(&instance).await?;
        info!(instance = %instance.name, service = %service.name, "service_instance_created");
        Ok(instance)
    }

    pub async fn get(&self, name: &str) -> Result<ServiceInstance, ServiceError> {
        self.store
            .get_instance(name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::INSTANCE_NOT_FOUND.into()))
    }

    /// Loads an instance and checks that `user` shares one of its teams.
    pub async fn get_for_user(&self, user: &User, name: &str) -> Result<ServiceInstance, ServiceError> {
        let instance = self.get(name).await?;
        let teams = user_teams(self.store.as_ref(), user).await?;
        if !has_access(&instance.teams, &teams) {
            return Err(ServiceError::Forbidden(messages::NO_INSTANCE_ACCESS.into()));
        }
        Ok(instance)
    }

    /// Removes the instance record. Bound apps are left to the caller.
    #[instrument(skip(self, user), fields(user = %user.email))]
    pub async fn delete(&self, user: &User, name: &str) -> Result<(), ServiceError> {
        let instance = self.get_for_user(user, name).await?;
        if !instance.apps.is_empty() {
            warn!(apps = ?instance.apps, "deleting service instance with bound apps");
        }
        if !self.store.delete_instance(&instance.name).await? {
            return Err(ServiceError::NotFound(messages::INSTANCE_NOT_FOUND.into()));
        }
        info!(instance = %instance.name, "service_instance_deleted");
        Ok(())
    }

    /// All instances in creation order.
    pub async fn list(&self) -> Result<Vec<ServiceInstance>, ServiceError> { self.store.list_instances().await }
}

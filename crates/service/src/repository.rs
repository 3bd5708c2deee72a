use async_trait::async_trait;

use crate::domain::{App, EnvVar, Service, ServiceInstance, Team};
use crate::errors::ServiceError;

/// Persistence port for the broker's documents.
///
/// Every operation touches one document and is atomic on it. Missing
/// documents are `Ok(None)` on reads; writes against a missing document are
/// `NotFound`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// `Conflict` when the name is taken.
    async fn insert_service(&self, service: &Service) -> Result<(), ServiceError>;
    async fn get_service(&self, name: &str) -> Result<Option<Service>, ServiceError>;
    /// Replaces endpoints and doc. Teams only change through the two calls below.
    async fn update_service(&self, service: &Service) -> Result<(), ServiceError>;
    /// Appends `team` unless present (`Conflict`); returns the updated service.
    async fn add_team_to_service(&self, service: &str, team: &str) -> Result<Service, ServiceError>;
    /// Removes `team` when present and another team remains: `Forbidden` for
    /// the last team, `NotFound` when `team` has no access.
    async fn remove_team_from_service(&self, service: &str, team: &str) -> Result<Service, ServiceError>;
    async fn delete_service(&self, name: &str) -> Result<bool, ServiceError>;
    async fn list_services(&self) -> Result<Vec<Service>, ServiceError>;

    /// `Conflict` when the name is taken.
    async fn insert_instance(&self, instance: &ServiceInstance) -> Result<(), ServiceError>;
    async fn get_instance(&self, name: &str) -> Result<Option<ServiceInstance>, ServiceError>;
    async fn delete_instance(&self, name: &str) -> Result<bool, ServiceError>;
    /// Ordered by creation time, then name.
    async fn list_instances(&self) -> Result<Vec<ServiceInstance>, ServiceError>;
    async fn count_instances_of_service(&self, service_name: &str) -> Result<u64, ServiceError>;
    /// Appends `app` to the bound list unless already present; `false` means it was.
    async fn add_app_to_instance(&self, instance: &str, app: &str) -> Result<bool, ServiceError>;
    /// `false` when `app` was not bound.
    async fn remove_app_from_instance(&self, instance: &str, app: &str) -> Result<bool, ServiceError>;

    /// `Conflict` when the name is taken.
    async fn insert_app(&self, app: &App) -> Result<(), ServiceError>;
    async fn get_app(&self, name: &str) -> Result<Option<App>, ServiceError>;
    /// Upserts the records by name, leaving the others alone.
    async fn set_app_env(&self, app: &str, vars: &[EnvVar]) -> Result<(), ServiceError>;
    async fn unset_app_env(&self, app: &str, keys: &[String]) -> Result<(), ServiceError>;
    async fn unset_app_env_from_instance(&self, app: &str, instance: &str) -> Result<(), ServiceError>;
    /// Drops every record whose origin is `instance`, then upserts `vars`, in one write.
    async fn replace_app_env_from_instance(&self, app: &str, instance: &str, vars: &[EnvVar]) -> Result<(), ServiceError>;

    async fn insert_team(&self, team: &Team) -> Result<(), ServiceError>;
    async fn get_team(&self, name: &str) -> Result<Option<Team>, ServiceError>;
    /// Teams whose member list contains `email`, ordered by name.
    async fn teams_of_user(&self, email: &str) -> Result<Vec<Team>, ServiceError>;
}

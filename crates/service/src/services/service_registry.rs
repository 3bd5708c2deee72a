use std::sync::Arc;

use tracing::{info, instrument};

use crate::access::{has_access, team_names, user_teams};
use crate::domain::{Service, ServiceManifest, User};
use crate::errors::{messages, ServiceError};
use crate::repository::EntityStore;

const PRODUCTION: &str = "production";

impl Service {
    /// Adds `team` to the access set.
    pub fn grant_access(&mut self, team: &str) -> Result<(), ServiceError> {
        if self.teams.iter().any(|t| t == team) {
            return Err(ServiceError::Conflict(messages::TEAM_ALREADY_HAS_ACCESS.into()));
        }
        self.teams.push(team.to_string());
        Ok(())
    }

    /// Removes `team` from the access set. The last team can never be removed,
    /// whichever team is named.
    pub fn revoke_access(&mut self, team: &str) -> Result<(), ServiceError> {
        if self.teams.len() < 2 {
            return Err(ServiceError::Forbidden(messages::ORPHAN_SERVICE.into()));
        }
        let before = self.teams.len();
        self.teams.retain(|t| t != team);
        if self.teams.len() == before {
            return Err(ServiceError::NotFound(messages::TEAM_WITHOUT_ACCESS.into()));
        }
        Ok(())
    }
}

fn validate_manifest(manifest: &ServiceManifest) -> Result<(), ServiceError> {
    models::validate_name("service", &manifest.id)?;
    match manifest.endpoint.get(PRODUCTION) {
        Some(url) if !url.trim().is_empty() => Ok(()),
        _ => Err(ServiceError::Validation(messages::PRODUCTION_ENDPOINT_REQUIRED.into())),
    }
}

/// Registry of service types and the teams allowed to use them.
pub struct ServiceRegistry {
    store: Arc<dyn EntityStore>,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn EntityStore>) -> Self { Self { store } }

    /// Registers a service owned by every team the caller belongs to.
    #[instrument(skip(self, user, manifest), fields(user = %user.email, service = %manifest.id))]
    pub async fn create(&self, user: &User, manifest: ServiceManifest) -> Result<Service, ServiceError> {
        validate_manifest(&manifest)?;
        let teams = user_teams(self.store.as_ref(), user).await?;
        if teams.is_empty() {
            return Err(ServiceError::Forbidden(messages::USER_WITHOUT_TEAM.into()));
        }
        if self.store.get_service(&manifest.id).await?.is_some() {
            return Err(ServiceError::Conflict(messages::service_exists(&manifest.id)));
        }
        let service = Service::new(manifest.id, manifest.endpoint, team_names(&teams));
        self.store.insert_service(&service).await?;
        info!(teams = ?service.teams, "service_created");
        Ok(service)
    }

    /// Services visible to `user`, ordered by name.
    pub async fn list_for_user(&self, user: &User) -> Result<Vec<Service>, ServiceError> {
        let teams = user_teams(self.store.as_ref(), user).await?;
        let services = self.store.list_services().await?;
        Ok(services.into_iter().filter(|s| has_access(&s.teams, &teams)).collect())
    }

    /// Loads a service and checks that `user` shares one of its teams.
    pub async fn get_for_user(&self, user: &User, name: &str) -> Result<Service, ServiceError> {
        let service = self
            .store
            .get_service(name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into()))?;
        let teams = user_teams(self.store.as_ref(), user).await?;
        if !has_access(&service.teams, &teams) {
            return Err(ServiceError::Forbidden(messages::NO_SERVICE_ACCESS.into()));
        }
        Ok(service)
    }

    /// Replaces the endpoints of an existing service from a new manifest.
    #[instrument(skip(self, user, manifest), fields(user = %user.email, service = %manifest.id))]
    pub async fn update(&self, user: &User, manifest: ServiceManifest) -> Result<Service, ServiceError> {
        validate_manifest(&manifest)?;
        let mut service = self.get_for_user(user, &manifest.id).await?;
        service.endpoints = manifest.endpoint;
        self.store.update_service(&service).await?;
        info!("service_updated");
        Ok(service)
    }

    /// Removes a service that has no instances left.
    #[instrument(skip(self, user), fields(user = %user.email))]
    pub async fn delete(&self, user: &User, name: &str) -> Result<(), ServiceError> {
        let service = self.get_for_user(user, name).await?;
        if self.store.count_instances_of_service(&service.name).await? > 0 {
            return Err(ServiceError::PreconditionFailed(messages::SERVICE_HAS_INSTANCES.into()));
        }
        if !self.store.delete_service(&service.name).await? {
            return Err(ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into()));
        }
        info!("service_deleted");
        Ok(())
    }

    #[instrument(skip(self, user), fields(user = %user.email))]
    pub async fn grant_access(&self, user: &User, service_name: &str, team: &str) -> Result<Service, ServiceError> {
        let service = self.get_for_user(user, service_name).await?;
        let team = self.existing_team(team).await?;
        let service = self.store.add_team_to_service(&service.name, &team).await?;
        info!(team = %team, "service_access_granted");
        Ok(service)
    }

    #[instrument(skip(self, user), fields(user = %user.email))]
    pub async fn revoke_access(&self, user: &User, service_name: &str, team: &str) -> Result<Service, ServiceError> {
        let service = self.get_for_user(user, service_name).await?;
        let team = self.existing_team(team).await?;
        let service = self.store.remove_team_from_service(&service.name, &team).await?;
        info!(team = %team, "service_access_revoked");
        Ok(service)
    }

    async fn existing_team(&self, name: &str) -> Result<String, ServiceError> {
        let team = self
            .store
            .get_team(name)
            .await?
            .ok_or_else(|| ServiceError::NotFound(messages::TEAM_NOT_FOUND.into()))?;
        Ok(team.name)
    }

    pub async fn add_doc(&self, user: &User, service_name: &str, doc: String) -> Result<(), ServiceError> {
        let mut service = self.get_for_user(user, service_name).await?;
        service.doc = doc;
        self.store.update_service(&service).await
    }

    pub async fn get_doc(&self, user: &User, service_name: &str) -> Result<String, ServiceError> {
        Ok(self.get_for_user(user, service_name).await?.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_instance, seed_service, seed_team, temp_store};
    use std::collections::BTreeMap;

    fn manifest(id: &str, production: Option<&str>) -> ServiceManifest {
        let mut endpoint = BTreeMap::new();
        if let Some(url) = production {
            endpoint.insert("production".to_string(), url.to_string());
        }
        ServiceManifest { id: id.into(), endpoint }
    }

    #[test]
    fn revoke_never_orphans_a_service() {
        let mut svc = Service::new("mysql", BTreeMap::new(), vec!["ops".into()]);
        assert_eq!(svc.revoke_access("ops"), Err(ServiceError::Forbidden(messages::ORPHAN_SERVICE.into())));
        assert_eq!(svc.revoke_access("someone-else"), Err(ServiceError::Forbidden(messages::ORPHAN_SERVICE.into())));
        assert_eq!(svc.teams, vec!["ops".to_string()]);
    }

    #[test]
    fn grant_then_revoke() {
        let mut svc = Service::new("mysql", BTreeMap::new(), vec!["ops".into()]);
        svc.grant_access("dev").unwrap();
        assert!(matches!(svc.grant_access("dev"), Err(ServiceError::Conflict(_))));
        assert!(matches!(svc.revoke_access("qa"), Err(ServiceError::NotFound(_))));
        svc.revoke_access("ops").unwrap();
        assert_eq!(svc.teams, vec!["dev".to_string()]);
    }

    #[tokio::test]
    async fn create_assigns_the_callers_teams() -> anyhow::Result<()> {
        let store = temp_store().await?;
        seed_team(&*store, "ops", &["ops@example.com"]).await?;
        seed_team(&*store, "dba", &["ops@example.com", "dba@example.com"]).await?;
        let registry = ServiceRegistry::new(store.clone());
        let user = User::new("ops@example.com");

        let svc = registry.create(&user, manifest("mysql", Some("http://mysqlapi.com"))).await?;
        assert_eq!(svc.teams, vec!["dba".to_string(), "ops".to_string()]);
        assert_eq!(svc.endpoint("production"), Some("http://mysqlapi.com"));

        let err = registry.create(&user, manifest("mysql", Some("http://other"))).await.unwrap_err();
        assert_eq!(err, ServiceError::Conflict("Service with name mysql already exists.".into()));
        Ok(())
    }

    #[tokio::test]
    async fn create_validates_manifest_and_membership() -> anyhow::Result<()> {
        let store = temp_store().await?;
        seed_team(&*store, "ops", &["ops@example.com"]).await?;
        let registry = ServiceRegistry::new(store.clone());

        let err = registry.create(&User::new("ops@example.com"), manifest("mysql", None)).await.unwrap_err();
        assert_eq!(err, ServiceError::Validation(messages::PRODUCTION_ENDPOINT_REQUIRED.into()));

        let err = registry.create(&User::new("lonely@example.com"), manifest("mysql", Some("http://x"))).await.unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(messages::USER_WITHOUT_TEAM.into()));
        assert!(store.get_service("mysql").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn delete_requires_no_instances() -> anyhow::Result<()> {
        let store = temp_store().await?;
        seed_team(&*store, "ops", &["ops@example.com"]).await?;
        seed_service(&*store, "mysql", Some("http://x"), &["ops"]).await?;
        seed_instance(&*store, "my-mysql", "mysql", &["ops"]).await?;
        let registry = ServiceRegistry::new(store.clone());
        let user = User::new("ops@example.com");

        let err = registry.delete(&user, "mysql").await.unwrap_err();
        assert!(matches!(err, ServiceError::PreconditionFailed(_)));

        store.delete_instance("my-mysql").await?;
        registry.delete(&user, "mysql").await?;
        assert!(store.get_service("mysql").await?.is_none());
        assert!(matches!(registry.delete(&user, "mysql").await, Err(ServiceError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn outsiders_cannot_touch_a_service() -> anyhow::Result<()> {
        let store = temp_store().await?;
        seed_team(&*store, "ops", &["ops@example.com"]).await?;
        seed_team(&*store, "web", &["web@example.com"]).await?;
        seed_service(&*store, "mysql", Some("http://x"), &["ops"]).await?;
        let registry = ServiceRegistry::new(store.clone());
        let outsider = User::new("web@example.com");

        let err = registry.get_for_user(&outsider, "mysql").await.unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(messages::NO_SERVICE_ACCESS.into()));
        assert!(matches!(registry.delete(&outsider, "mysql").await, Err(ServiceError::Forbidden(_))));
        assert!(registry.list_for_user(&outsider).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn team_access_is_persisted() -> anyhow::Result<()> {
        let store = temp_store().await?;
        seed_team(&*store, "ops", &["ops@example.com"]).await?;
        seed_team(&*store, "web", &["web@example.com"]).await?;
        seed_service(&*store, "mysql", Some("http://x"), &["ops"]).await?;
        let registry = ServiceRegistry::new(store.clone());
        let user = User::new("ops@example.com");

        registry.grant_access(&user, "mysql", "web").await?;
        assert_eq!(store.get_service("mysql").await?.unwrap().teams, vec!["ops".to_string(), "web".to_string()]);
        assert!(matches!(registry.grant_access(&user, "mysql", "web").await, Err(ServiceError::Conflict(_))));
        assert!(matches!(registry.grant_access(&user, "mysql", "ghost").await, Err(ServiceError::NotFound(_))));

        registry.revoke_access(&user, "mysql", "ops").await?;
        // ops lost access along with its member
        assert!(matches!(registry.revoke_access(&user, "mysql", "web").await, Err(ServiceError::Forbidden(_))));
        let web = User::new("web@example.com");
        let err = registry.revoke_access(&web, "mysql", "web").await.unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(messages::ORPHAN_SERVICE.into()));
        Ok(())
    }

    #[tokio::test]
    async fn update_replaces_endpoints_and_doc_is_kept() -> anyhow::Result<()> {
        let store = temp_store().await?;
        seed_team(&*store, "ops", &["ops@example.com"]).await?;
        seed_service(&*store, "mysql", Some("http://old"), &["ops"]).await?;
        let registry = ServiceRegistry::new(store.clone());
        let user = User::new("ops@example.com");

        registry.add_doc(&user, "mysql", "connect with DATABASE_HOST".into()).await?;
        registry.update(&user, manifest("mysql", Some("http://new"))).await?;
        let svc = store.get_service("mysql").await?.unwrap();
        assert_eq!(svc.endpoint("production"), Some("http://new"));
        assert_eq!(registry.get_doc(&user, "mysql").await?, "connect with DATABASE_HOST");

        assert!(matches!(registry.update(&user, manifest("ghost", Some("http://x"))).await, Err(ServiceError::NotFound(_))));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_grant_and_revoke_both_land() -> anyhow::Result<()> {
        let store = temp_store().await?;
        for team in ["ops", "dev", "web"] {
            seed_team(&*store, team, &["ops@example.com"]).await?;
        }
        seed_service(&*store, "mysql", Some("http://x"), &["ops", "dev"]).await?;
        let registry = Arc::new(ServiceRegistry::new(store.clone()));
        let user = User::new("ops@example.com");

        let grant = tokio::spawn({
            let (registry, user) = (Arc::clone(&registry), user.clone());
            async move { registry.grant_access(&user, "mysql", "web").await }
        });
        let revoke = tokio::spawn({
            let (registry, user) = (Arc::clone(&registry), user.clone());
            async move { registry.revoke_access(&user, "mysql", "dev").await }
        });
        grant.await??;
        revoke.await??;
        assert_eq!(store.get_service("mysql").await?.unwrap().teams, vec!["ops".to_string(), "web".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn stale_update_keeps_granted_teams() -> anyhow::Result<()> {
        let store = temp_store().await?;
        seed_team(&*store, "ops", &["ops@example.com"]).await?;
        seed_team(&*store, "web", &["web@example.com"]).await?;
        seed_service(&*store, "mysql", Some("http://old"), &["ops"]).await?;
        let registry = ServiceRegistry::new(store.clone());
        let user = User::new("ops@example.com");

        let mut stale = store.get_service("mysql").await?.unwrap();
        registry.grant_access(&user, "mysql", "web").await?;
        stale.doc = "written from an old read".into();
        store.update_service(&stale).await?;

        let svc = store.get_service("mysql").await?.unwrap();
        assert_eq!(svc.teams, vec!["ops".to_string(), "web".to_string()]);
        assert_eq!(svc.doc, "written from an old read");
        Ok(())
    }
}

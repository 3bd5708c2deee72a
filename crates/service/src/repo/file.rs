use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use tracing::info;

use crate::domain::{App, EnvVar, Service, ServiceInstance, Team};
use crate::errors::{messages, ServiceError};
use crate::repository::EntityStore;
use crate::storage::json_map_store::JsonMapStore;

/// File-backed store: one JSON document map per collection under `data_dir`.
///
/// # Examples
/// ```
/// use service::repo::FileEntityStore;
/// use service::repository::EntityStore;
/// use service::domain::Team;
/// let dir = std::env::temp_dir().join(format!("broker_doc_{}", uuid::Uuid::new_v4()));
/// let store = tokio_test::block_on(FileEntityStore::open(&dir)).unwrap();
/// tokio_test::block_on(store.insert_team(&Team::new("ops", vec!["ops@example.com".into()]))).unwrap();
/// let teams = tokio_test::block_on(store.teams_of_user("ops@example.com")).unwrap();
/// assert_eq!(teams[0].name, "ops");
/// let _ = std::fs::remove_dir_all(&dir);
/// ```
pub struct FileEntityStore {
    services: Arc<JsonMapStore<String, Service>>,
    instances: Arc<JsonMapStore<String, ServiceInstance>>,
    apps: Arc<JsonMapStore<String, App>>,
    teams: Arc<JsonMapStore<String, Team>>,
}

impl FileEntityStore {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Arc<Self>, ServiceError> {
        let dir = data_dir.as_ref();
        let store = Self {
            services: JsonMapStore::new(dir.join("services.json")).await?,
            instances: JsonMapStore::new(dir.join("service_instances.json")).await?,
            apps: JsonMapStore::new(dir.join("apps.json")).await?,
            teams: JsonMapStore::new(dir.join("teams.json")).await?,
        };
        info!(data_dir = %dir.display(), "file entity store opened");
        Ok(Arc::new(store))
    }
}

#[async_trait]
impl EntityStore for FileEntityStore {
    async fn insert_service(&self, service: &Service) -> Result<(), ServiceError> {
        self.services
            .update_map(|m| {
                if m.contains_key(&service.name) {
                    return Err(ServiceError::Conflict(messages::service_exists(&service.name)));
                }
                m.insert(service.name.clone(), service.clone());
                Ok(())
            })
            .await
    }

    async fn get_service(&self, name: &str) -> Result<Option<Service>, ServiceError> {
        Ok(self.services.get(&name.to_string()).await)
    }

    async fn update_service(&self, service: &Service) -> Result<(), ServiceError> {
        self.services
            .update_map(|m| match m.get_mut(&service.name) {
                Some(existing) => {
                    existing.endpoints = service.endpoints.clone();
                    existing.doc = service.doc.clone();
                    Ok(())
                }
                None => Err(ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into())),
            })
            .await
    }

    async fn add_team_to_service(&self, service: &str, team: &str) -> Result<Service, ServiceError> {
        self.services
            .update_map(|m| {
                let s = m.get_mut(service).ok_or_else(|| ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into()))?;
                s.grant_access(team)?;
                Ok(s.clone())
            })
            .await
    }

    async fn remove_team_from_service(&self, service: &str, team: &str) -> Result<Service, ServiceError> {
        self.services
            .update_map(|m| {
                let s = m.get_mut(service).ok_or_else(|| ServiceError::NotFound(messages::SERVICE_NOT_FOUND.into()))?;
                s.revoke_access(team)?;
                Ok(s.clone())
            })
            .await
    }

    async fn delete_service(&self, name: &str) -> Result<bool, ServiceError> {
        self.services.remove(&name.to_string()).await
    }

    async fn list_services(&self) -> Result<Vec<Service>, ServiceError> {
        let mut services = self.services.values().await;
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    async fn insert_instance(&self, instance: &ServiceInstance) -> Result<(), ServiceError> {
        self.instances
            .update_map(|m| {
                if m.contains_key(&instance.name) {
                    return Err(ServiceError::Conflict(messages::instance_exists(&instance.name)));
                }
                m.insert(instance.name.clone(), instance.clone());
                Ok(())
            })
            .await
    }

    async fn get_instance(&self, name: &str) -> Result<Option<ServiceInstance>, ServiceError> {
        Ok(self.instances.get(&name.to_string()).await)
    }

    async fn delete_instance(&self, name: &str) -> Result<bool, ServiceError> {
        self.instances.remove(&name.to_string()).await
    }

    async fn list_instances(&self) -> Result<Vec<ServiceInstance>, ServiceError> {
        let mut instances = self.instances.values().await;
        instances.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(instances)
    }

    async fn count_instances_of_service(&self, service_name: &str) -> Result<u64, ServiceError> {
        let instances = self.instances.values().await;
        Ok(instances.iter().filter(|i| i.service_name == service_name).count() as u64)
    }

    async fn add_app_to_instance(&self, instance: &str, app: &str) -> Result<bool, ServiceError> {
        self.instances
            .update_map(|m| {
                let si = m
                    .get_mut(instance)
                    .ok_or_else(|| ServiceError::NotFound(messages::INSTANCE_NOT_FOUND.into()))?;
                if si.is_bound(app) {
                    return Ok(false);
                }
                si.apps.push(app.to_string());
                Ok(true)
            })
            .await
    }

    async fn remove_app_from_instance(&self, instance: &str, app: &str) -> Result<bool, ServiceError> {
        self.instances
            .update_map(|m| {
                let si = m
                    .get_mut(instance)
                    .ok_or_else(|| ServiceError::NotFound(messages::INSTANCE_NOT_FOUND.into()))?;
                let before = si.apps.len();
                si.apps.retain(|a| a != app);
                Ok(si.apps.len() != before)
            })
            .await
    }

    async fn insert_app(&self, app: &App) -> Result<(), ServiceError> {
        self.apps
            .update_map(|m| {
                if m.contains_key(&app.name) {
                    return Err(ServiceError::Conflict(format!("App with name {} already exists.", app.name)));
                }
                m.insert(app.name.clone(), app.clone());
                Ok(())
            })
            .await
    }

    async fn get_app(&self, name: &str) -> Result<Option<App>, ServiceError> {
        Ok(self.apps.get(&name.to_string()).await)
    }

    async fn set_app_env(&self, app: &str, vars: &[EnvVar]) -> Result<(), ServiceError> {
        self.apps
            .update_map(|m| {
                let a = m.get_mut(app).ok_or_else(|| ServiceError::NotFound(messages::APP_NOT_FOUND.into()))?;
                a.set_env(vars.iter().cloned());
                Ok(())
            })
            .await
    }

    async fn unset_app_env(&self, app: &str, keys: &[String]) -> Result<(), ServiceError> {
        self.apps
            .update_map(|m| {
                let a = m.get_mut(app).ok_or_else(|| ServiceError::NotFound(messages::APP_NOT_FOUND.into()))?;
                for k in keys {
                    a.env.remove(k);
                }
                Ok(())
            })
            .await
    }

    async fn unset_app_env_from_instance(&self, app: &str, instance: &str) -> Result<(), ServiceError> {
        self.apps
            .update_map(|m| {
                let a = m.get_mut(app).ok_or_else(|| ServiceError::NotFound(messages::APP_NOT_FOUND.into()))?;
                a.unset_env_from_instance(instance);
                Ok(())
            })
            .await
    }

    async fn replace_app_env_from_instance(&self, app: &str, instance: &str, vars: &[EnvVar]) -> Result<(), ServiceError> {
        self.apps
            .update_map(|m| {
                let a = m.get_mut(app).ok_or_else(|| ServiceError::NotFound(messages::APP_NOT_FOUND.into()))?;
                a.unset_env_from_instance(instance);
                a.set_env(vars.iter().cloned());
                Ok(())
            })
            .await
    }

    async fn insert_team(&self, team: &Team) -> Result<(), ServiceError> {
        self.teams
            .update_map(|m| {
                if m.contains_key(&team.name) {
                    return Err(ServiceError::Conflict(format!("Team with name {} already exists.", team.name)));
                }
                m.insert(team.name.clone(), team.clone());
                Ok(())
            })
            .await
    }

    async fn get_team(&self, name: &str) -> Result<Option<Team>, ServiceError> {
        Ok(self.teams.get(&name.to_string()).await)
    }

    async fn teams_of_user(&self, email: &str) -> Result<Vec<Team>, ServiceError> {
        let mut teams: Vec<Team> = self.teams.values().await.into_iter().filter(|t| t.contains_user(email)).collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::access::{has_access, user_teams};
use crate::domain::User;
use crate::errors::ServiceError;
use crate::repository::EntityStore;

/// Read-only view of the services and instances a user can see.
pub struct CatalogQuery {
    store: Arc<dyn EntityStore>,
}

impl CatalogQuery {
    pub fn new(store: Arc<dyn EntityStore>) -> Self { Self { store } }

    /// Service name -> names of its instances visible to `user`, in creation
    /// order. Accessible services without visible instances map to an empty list.
    pub async fn services_and_instances(&self, user: &User) -> Result<BTreeMap<String, Vec<String>>, ServiceError> {
        let teams = user_teams(self.store.as_ref(), user).await?;
        let mut catalog: BTreeMap<String, Vec<String>> = self
            .store
            .list_services()
            .await?
            .into_iter()
            .filter(|s| has_access(&s.teams, &teams))
            .map(|s| (s.name, Vec::new()))
            .collect();
        for instance in self.store.list_instances().await? {
            if !has_access(&instance.teams, &teams) {
                continue;
            }
            if let Some(names) = catalog.get_mut(&instance.service_name) {
                names.push(instance.name);
            }
        }
        Ok(catalog)
    }
}

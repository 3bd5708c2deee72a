use std::sync::Arc;

use service::provisioner::Provisioner;
use service::repository::EntityStore;
use service::services::{BindingOrchestrator, CatalogQuery, ServiceInstanceRegistry, ServiceRegistry};

/// Shared handler state. Everything behind it is `Arc` and cheap to clone.
#[derive(Clone)]
pub struct ServerState {
    pub services: Arc<ServiceRegistry>,
    pub instances: Arc<ServiceInstanceRegistry>,
    pub binder: Arc<BindingOrchestrator>,
    pub catalog: Arc<CatalogQuery>,
}

impl ServerState {
    pub fn new(store: Arc<dyn EntityStore>, provisioner: Arc<dyn Provisioner>, environment: &str) -> Self {
        Self {
            services: Arc::new(ServiceRegistry::new(Arc::clone(&store))),
            instances: Arc::new(ServiceInstanceRegistry::new(Arc::clone(&store))),
            binder: Arc::new(BindingOrchestrator::new(Arc::clone(&store), provisioner, environment)),
            catalog: Arc::new(CatalogQuery::new(store)),
        }
    }
}

//! Business services: registries, the binding orchestrator and the catalog query.

pub mod service_registry;
pub mod instance_registry;
pub mod binding;
pub mod catalog;

pub use binding::BindingOrchestrator;
pub use catalog::CatalogQuery;
pub use instance_registry::ServiceInstanceRegistry;
pub use service_registry::ServiceRegistry;

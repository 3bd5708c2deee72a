use std::collections::BTreeMap;

use utoipa::OpenApi;
use utoipa::ToSchema;

#[derive(ToSchema)]
pub struct HealthResponse { pub status: String }

/// Service manifest; `endpoint` maps environment name to provisioner base URL.
#[derive(ToSchema)]
pub struct ManifestDoc {
    pub id: String,
    pub endpoint: BTreeMap<String, String>,
}

#[derive(ToSchema)]
pub struct ServiceInstancesDoc { pub service: String, pub instances: Vec<String> }

#[derive(ToSchema)]
pub struct CreateInstanceDoc { pub name: String, pub service_name: String }

#[derive(ToSchema)]
pub struct BindOutputDoc { pub app: String, pub instance: String, pub env: Vec<String> }

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::routes::services::list,
        crate::routes::services::create,
        crate::routes::services::update,
        crate::routes::services::get,
        crate::routes::services::delete,
        crate::routes::services::grant_access,
        crate::routes::services::revoke_access,
        crate::routes::services::add_doc,
        crate::routes::services::get_doc,
        crate::routes::instances::create,
        crate::routes::instances::get,
        crate::routes::instances::delete,
        crate::routes::instances::bind,
        crate::routes::instances::unbind,
    ),
    components(
        schemas(
            HealthResponse,
            ManifestDoc,
            ServiceInstancesDoc,
            CreateInstanceDoc,
            BindOutputDoc,
        )
    ),
    tags(
        (name = "health"),
        (name = "services"),
        (name = "instances")
    )
)]
pub struct ApiDoc;

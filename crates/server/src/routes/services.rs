use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use service::domain::{Service, ServiceManifest};

use crate::errors::JsonApiError;
use crate::routes::identity::CurrentUser;
use crate::state::ServerState;

#[derive(Debug, Serialize)]
pub struct ServiceInstancesView {
    pub service: String,
    pub instances: Vec<String>,
}

#[utoipa::path(
    get, path = "/services", tag = "services",
    responses(
        (status = 200, description = "Services visible to the caller with their instances", body = [crate::openapi::ServiceInstancesDoc]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list(State(state): State<ServerState>, CurrentUser(user): CurrentUser) -> Result<Json<Vec<ServiceInstancesView>>, JsonApiError> {
    let catalog = state.catalog.services_and_instances(&user).await?;
    let views = catalog
        .into_iter()
        .map(|(service, instances)| ServiceInstancesView { service, instances })
        .collect::<Vec<_>>();
    info!(count = views.len(), user = %user.email, "list services");
    Ok(Json(views))
}

#[utoipa::path(
    post, path = "/services", tag = "services",
    request_body = crate::openapi::ManifestDoc,
    responses(
        (status = 201, description = "Created"),
        (status = 400, description = "Validation Error"),
        (status = 403, description = "Caller belongs to no team"),
        (status = 409, description = "Conflict")
    )
)]
pub async fn create(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Json(manifest): Json<ServiceManifest>,
) -> Result<(StatusCode, Json<Service>), JsonApiError> {
    let service = state.services.create(&user, manifest).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

#[utoipa::path(
    put, path = "/services", tag = "services",
    request_body = crate::openapi::ManifestDoc,
    responses(
        (status = 200, description = "Updated"),
        (status = 400, description = "Validation Error"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Json(manifest): Json<ServiceManifest>,
) -> Result<Json<Service>, JsonApiError> {
    Ok(Json(state.services.update(&user, manifest).await?))
}

#[utoipa::path(
    get, path = "/services/{name}", tag = "services",
    params(("name" = String, Path, description = "Service name")),
    responses((status = 200, description = "OK"), (status = 403, description = "Forbidden"), (status = 404, description = "Not Found"))
)]
pub async fn get(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<Service>, JsonApiError> {
    Ok(Json(state.services.get_for_user(&user, &name).await?))
}

#[utoipa::path(
    delete, path = "/services/{name}", tag = "services",
    params(("name" = String, Path, description = "Service name")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
        (status = 412, description = "Service still has instances")
    )
)]
pub async fn delete(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> Result<StatusCode, JsonApiError> {
    state.services.delete(&user, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put, path = "/services/{name}/teams/{team}", tag = "services",
    params(("name" = String, Path, description = "Service name"), ("team" = String, Path, description = "Team name")),
    responses((status = 200, description = "Granted"), (status = 404, description = "Not Found"), (status = 409, description = "Team already has access"))
)]
pub async fn grant_access(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path((name, team)): Path<(String, String)>,
) -> Result<Json<Service>, JsonApiError> {
    Ok(Json(state.services.grant_access(&user, &name, &team).await?))
}

#[utoipa::path(
    delete, path = "/services/{name}/teams/{team}", tag = "services",
    params(("name" = String, Path, description = "Service name"), ("team" = String, Path, description = "Team name")),
    responses(
        (status = 200, description = "Revoked"),
        (status = 403, description = "Last team of the service"),
        (status = 404, description = "Team has no access")
    )
)]
pub async fn revoke_access(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path((name, team)): Path<(String, String)>,
) -> Result<Json<Service>, JsonApiError> {
    Ok(Json(state.services.revoke_access(&user, &name, &team).await?))
}

#[utoipa::path(
    put, path = "/services/{name}/doc", tag = "services",
    params(("name" = String, Path, description = "Service name")),
    request_body(content = String, content_type = "text/plain"),
    responses((status = 200, description = "Stored"), (status = 403, description = "Forbidden"))
)]
pub async fn add_doc(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
    doc: String,
) -> Result<StatusCode, JsonApiError> {
    state.services.add_doc(&user, &name, doc).await?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    get, path = "/services/{name}/doc", tag = "services",
    params(("name" = String, Path, description = "Service name")),
    responses((status = 200, description = "Documentation text"), (status = 403, description = "Forbidden"))
)]
pub async fn get_doc(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> Result<String, JsonApiError> {
    Ok(state.services.get_doc(&user, &name).await?)
}

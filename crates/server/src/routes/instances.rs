use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use service::domain::ServiceInstance;

use crate::errors::JsonApiError;
use crate::routes::identity::CurrentUser;
use crate::state::ServerState;

#[derive(Debug, Deserialize)]
pub struct CreateInstanceInput {
    pub name: String,
    pub service_name: String,
}

/// Bind result. Values are private to the app and never echoed back.
#[derive(Debug, Serialize)]
pub struct BindOutput {
    pub app: String,
    pub instance: String,
    pub env: Vec<String>,
}

#[utoipa::path(
    post, path = "/instances", tag = "instances",
    request_body = crate::openapi::CreateInstanceDoc,
    responses(
        (status = 201, description = "Created"),
        (status = 403, description = "No access to the service"),
        (status = 404, description = "Service not found"),
        (status = 409, description = "Conflict")
    )
)]
pub async fn create(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateInstanceInput>,
) -> Result<(StatusCode, Json<ServiceInstance>), JsonApiError> {
    let instance = state.instances.create(&user, &input.name, &input.service_name).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

#[utoipa::path(
    get, path = "/instances/{name}", tag = "instances",
    params(("name" = String, Path, description = "Service instance name")),
    responses((status = 200, description = "OK"), (status = 403, description = "Forbidden"), (status = 404, description = "Not Found"))
)]
pub async fn get(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<ServiceInstance>, JsonApiError> {
    Ok(Json(state.instances.get_for_user(&user, &name).await?))
}

#[utoipa::path(
    delete, path = "/instances/{name}", tag = "instances",
    params(("name" = String, Path, description = "Service instance name")),
    responses((status = 204, description = "Deleted"), (status = 403, description = "Forbidden"), (status = 404, description = "Not Found"))
)]
pub async fn delete(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path(name): Path<String>,
) -> Result<StatusCode, JsonApiError> {
    state.instances.delete(&user, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put, path = "/instances/{name}/apps/{app}", tag = "instances",
    params(("name" = String, Path, description = "Service instance name"), ("app" = String, Path, description = "App name")),
    responses(
        (status = 200, description = "Bound", body = crate::openapi::BindOutputDoc),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Already bound"),
        (status = 412, description = "App has no unit address"),
        (status = 500, description = "Provisioner or storage failure")
    )
)]
pub async fn bind(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path((name, app)): Path<(String, String)>,
) -> Result<Json<BindOutput>, JsonApiError> {
    let bound = state.binder.bind_app(&user, &name, &app).await?;
    let env = bound
        .env
        .values()
        .filter(|v| v.instance_name == name)
        .map(|v| v.name.clone())
        .collect::<Vec<_>>();
    info!(instance = %name, app = %app, keys = env.len(), "bind request served");
    Ok(Json(BindOutput { app: bound.name, instance: name, env }))
}

#[utoipa::path(
    delete, path = "/instances/{name}/apps/{app}", tag = "instances",
    params(("name" = String, Path, description = "Service instance name"), ("app" = String, Path, description = "App name")),
    responses(
        (status = 204, description = "Unbound; provisioner notified in the background"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
        (status = 412, description = "App is not bound")
    )
)]
pub async fn unbind(
    State(state): State<ServerState>,
    CurrentUser(user): CurrentUser,
    Path((name, app)): Path<(String, String)>,
) -> Result<StatusCode, JsonApiError> {
    state.binder.unbind_app(&user, &name, &app).await?;
    Ok(StatusCode::NO_CONTENT)
}

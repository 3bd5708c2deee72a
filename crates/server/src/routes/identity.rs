use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

use service::domain::User;

use crate::errors::JsonApiError;

/// Set by the authenticating proxy in front of the broker.
pub const USER_HEADER: &str = "x-user-email";

/// Caller identity taken from [`USER_HEADER`]; requests without it get 401.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = JsonApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                JsonApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized", Some("missing X-User-Email header".into()))
            })?;
        Ok(CurrentUser(User::new(email)))
    }
}

use thiserror::Error;

use models::errors::ModelError;

/// User-visible messages. CLI users match on these, keep them stable.
pub mod messages {
    pub const APP_ALREADY_BOUND: &str = "This app is already binded to this service instance.";
    pub const APP_NOT_BOUND: &str = "This app is not binded to this service instance.";
    pub const APP_WITHOUT_UNITS: &str = "This app does not have an IP yet.";
    pub const ORPHAN_SERVICE: &str = "You can not revoke the access from this team, because it is the unique team with access to this service, and a service can not be orphaned";
    pub const TEAM_ALREADY_HAS_ACCESS: &str = "This team already has access to this service";
    pub const TEAM_WITHOUT_ACCESS: &str = "This team does not have access to this service";
    pub const SERVICE_HAS_INSTANCES: &str = "This service cannot be removed because it has instances.\nPlease remove these instances before removing the service.";
    pub const PRODUCTION_ENDPOINT_REQUIRED: &str = "You must provide a production endpoint in the manifest file.";
    pub const USER_WITHOUT_TEAM: &str = "In order to create a service, you should be member of at least one team";
    pub const NO_SERVICE_ACCESS: &str = "This user does not have access to this service";
    pub const NO_INSTANCE_ACCESS: &str = "This user does not have access to this service instance";
    pub const NO_APP_ACCESS: &str = "This user does not have access to this app";
    pub const SERVICE_NOT_FOUND: &str = "Service not found";
    pub const INSTANCE_NOT_FOUND: &str = "Service instance not found";
    pub const APP_NOT_FOUND: &str = "App not found";
    pub const TEAM_NOT_FOUND: &str = "Team not found";

    pub fn service_exists(name: &str) -> String {
        format!("Service with name {name} already exists.")
    }

    pub fn instance_exists(name: &str) -> String {
        format!("Service instance with name {name} already exists.")
    }
}

/// Error taxonomy shared by the registries and the binding orchestrator.
///
/// `Display` is exactly the user-facing message; callers branch on the variant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Duplicate name, already bound, already has access.
    #[error("{0}")]
    Conflict(String),
    /// Missing prerequisite state: no unit address, not bound, instances left.
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Remote provisioner or persistence error.
    #[error("{0}")]
    Failure(String),
    /// Malformed input such as a manifest without a production endpoint.
    #[error("{0}")]
    Validation(String),
}

impl ServiceError {
    pub fn not_found(entity: &str) -> Self { Self::NotFound(format!("{} not found", entity)) }

    pub fn failure(err: impl std::fmt::Display) -> Self { Self::Failure(err.to_string()) }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 2001,
            ServiceError::Conflict(_) => 2002,
            ServiceError::PreconditionFailed(_) => 2003,
            ServiceError::Forbidden(_) => 2004,
            ServiceError::NotFound(_) => 2005,
            ServiceError::Failure(_) => 2100,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "Validation Error",
            ServiceError::Conflict(_) => "Conflict",
            ServiceError::PreconditionFailed(_) => "Precondition Failed",
            ServiceError::Forbidden(_) => "Forbidden",
            ServiceError::NotFound(_) => "Not Found",
            ServiceError::Failure(_) => "Failure",
        }
    }
}

impl From<ModelError> for ServiceError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Validation(msg) => ServiceError::Validation(msg),
            ModelError::Db(msg) => ServiceError::Failure(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_bare_message() {
        let e = ServiceError::Conflict(messages::APP_ALREADY_BOUND.into());
        assert_eq!(e.to_string(), "This app is already binded to this service instance.");
        assert_eq!(ServiceError::not_found("Team").to_string(), "Team not found");
        assert_eq!(messages::service_exists("mysql"), "Service with name mysql already exists.");
    }

    #[test]
    fn model_errors_keep_their_kind() {
        let v: ServiceError = ModelError::Validation("name required".into()).into();
        assert!(matches!(v, ServiceError::Validation(_)));
        let d: ServiceError = ModelError::Db("boom".into()).into();
        assert_eq!(d, ServiceError::Failure("boom".into()));
        assert_ne!(v.code(), d.code());
    }
}

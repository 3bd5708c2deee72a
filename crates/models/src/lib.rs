//! Persistence entities for the broker's Postgres backend.
//!
//! JSON-shaped attributes (endpoint maps, team lists, bound apps, units and
//! configuration records) live in `jsonb` columns so that each row keeps the
//! document shape the service layer works with.

pub mod errors;
pub mod db;
pub mod team;
pub mod service;
pub mod service_instance;
pub mod app;


/// Names travel in URL path segments and act as primary keys.
pub fn validate_name(kind: &str, name: &str) -> Result<(), errors::ModelError> {
    if name.trim().is_empty() {
        return Err(errors::ModelError::Validation(format!("{kind} name required")));
    }
    if name.len() > 128 {
        return Err(errors::ModelError::Validation(format!("{kind} name too long (<=128)")));
    }
    if name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(errors::ModelError::Validation(format!("{kind} name must not contain '/' or whitespace")));
    }
    Ok(())
}

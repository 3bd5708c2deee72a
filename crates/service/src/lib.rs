//! Service layer of the broker: registries, binding orchestration and the
//! persistence/provisioner ports they run on.
//! - `repository::EntityStore` is the document store port, with file and
//!   Postgres adapters under `repo`.
//! - `provisioner::Provisioner` talks to the out-of-process provisioner APIs.
//! - `services` holds the business operations called by the HTTP layer.

pub mod errors;
pub mod domain;
pub mod access;
pub mod repository;
pub mod repo;
pub mod storage;
pub mod provisioner;
pub mod observability;
pub mod services;
#[cfg(test)]
pub mod test_support;

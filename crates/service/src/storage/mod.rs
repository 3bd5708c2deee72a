//! Storage abstractions for service layer
//!
//! Contains the file-backed map store used by the JSON-file entity store
//! adapter.

pub mod json_map_store;

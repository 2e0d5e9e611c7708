//! Warden HTTP API: permission CRUD, health and OpenAPI schema.
pub mod error;
pub mod openapi;
pub mod permissions;
pub mod system;
pub mod types;

//! Warden access-control service library crate.
//!
//! # Purpose
//! Exposes the permission API, policy store backends, decision engine and
//! request guard for the `warden` binary, for tests and for host services
//! that embed access control into their own routers.
//!
//! # Notes
//! Policy evaluation itself lives in `warden-authz`; this crate adds storage,
//! HTTP and configuration around it.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod observability;
pub mod store;

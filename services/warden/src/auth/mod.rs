//! Access decisions and request authorization.
//!
//! - [`decision`]: evaluates requests against the stored rules, failing closed.
//! - [`principal`]: caller identities read from configured headers.
//! - [`guard`]: per-route middleware built on both.
pub mod decision;
pub mod guard;
pub mod principal;

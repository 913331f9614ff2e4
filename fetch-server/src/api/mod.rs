//! HTTP API.
//!
//! Exposes the acquisition pipeline as a handful of `GET` endpoints that
//! stream the resulting file (or archive) back to the caller.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};

//! fetch-server library crate.
//!
//! An HTTP service that acquires remote media with an external fetch tool,
//! optionally muxes or archives it, streams the result back, and cleans up
//! every file it created.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod utils;

pub use error::{Error, Result};

//! Post-fetch processors: stream muxing and archiving.

mod archive;
mod mux;

pub use archive::{ArchiveEntry, ArchiveStats, Archiver};
pub use mux::MuxProcessor;

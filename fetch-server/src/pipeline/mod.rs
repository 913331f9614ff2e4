//! Acquisition job pipeline.
//!
//! Drives an external fetch tool (yt-dlp) and, depending on the job shape, a
//! mux tool (ffmpeg) or the zip archiver, then hands the terminal artifact to
//! the delivery boundary. Every job owns its artifacts and disposes of them on
//! every exit path.

pub mod delivery;
pub mod detector;
pub mod fetch;
pub mod job;
pub mod manager;
pub mod naming;
pub mod processors;
pub mod runner;
pub mod selector;
pub mod workspace;

pub use delivery::{Delivery, DeliveryStream};
pub use detector::{WaitPolicy, await_artifacts};
pub use fetch::{FetchTool, FormatPreset, PlaylistItem, PlaylistListing};
pub use job::{Artifact, ArtifactRole, Job, JobFailure, JobShape, JobState};
pub use manager::{JobPipeline, JobRequest, validate_source_url};
pub use naming::{NamingPattern, Segment};
pub use runner::{ExternalProcessResult, ProcessRunner};
pub use selector::{SelectedFile, select};
pub use workspace::{JobWorkspace, WorkspaceMode};

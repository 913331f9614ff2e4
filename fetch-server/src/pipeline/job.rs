//! Job model: shape, state machine and owned artifacts.
//!
//! A [`Job`] records every file it creates before the file is produced, and
//! disposal works from that record. The working directory is never swept
//! wholesale: in a shared root a job only claims names tagged with its own
//! discriminator, so it can't delete a sibling's files.
//!
//! Disposal runs on every exit path. The pipeline disposes explicitly on
//! failure, and the delivery stream disposes when the transfer ends. If a job
//! is dropped anywhere else (a client disconnecting mid-fetch drops the whole
//! request future), `Drop` performs the same disposal synchronously.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pipeline::naming::DISCRIMINATOR_SEPARATOR;
use crate::pipeline::workspace::JobWorkspace;
use crate::utils::fs::{
    list_dir_names, remove_dir_all_if_exists, remove_dir_all_if_exists_sync,
    remove_file_if_exists, remove_file_if_exists_sync,
};
use crate::{Error, Result};

/// The stage sequence a job follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum JobShape {
    /// One media file, video and audio merged by the fetch tool.
    SingleFile,
    /// Every playlist item, bundled into one zip archive.
    PlaylistArchive,
    /// Video and audio fetched separately, then muxed.
    FetchAndMux,
    /// The best audio stream only.
    AudioOnly,
}

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
pub enum JobState {
    Created,
    Fetching,
    Detecting,
    Selecting,
    PostProcessing,
    Archiving,
    Delivering,
    Cleaned,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cleaned | Self::Failed)
    }

    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;
        match (self, target) {
            (Created, Fetching) => true,
            (Fetching, Detecting) => true,
            (Detecting, Selecting) => true,
            (Selecting, PostProcessing | Archiving | Delivering) => true,
            (PostProcessing, Archiving | Delivering) => true,
            (Archiving, Delivering) => true,
            (Delivering, Cleaned) => true,
            // Any live state can fail
            (s, Failed) => !s.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactRole {
    /// Consumed by a later stage, removed before delivery.
    Intermediate,
    /// The file handed to the caller.
    Terminal,
}

/// A file owned by a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub role: ArtifactRole,
    released: bool,
}

/// One acquisition request, from entry to disposal.
#[derive(Debug)]
pub struct Job {
    id: String,
    source_url: String,
    shape: JobShape,
    workspace: JobWorkspace,
    artifacts: Vec<Artifact>,
    state: JobState,
    delivered: bool,
    disposed: bool,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        source_url: impl Into<String>,
        shape: JobShape,
        workspace: JobWorkspace,
    ) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            shape,
            workspace,
            artifacts: Vec::new(),
            state: JobState::Created,
            delivered: false,
            disposed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn shape(&self) -> JobShape {
        self.shape
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }

    pub fn dir(&self) -> &Path {
        self.workspace.dir()
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    /// The artifact to deliver, once one has been recorded.
    pub fn terminal(&self) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .find(|a| a.role == ArtifactRole::Terminal)
    }

    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        debug!(job_id = %self.id, from = %self.state, to = %next, "Job state changed");
        self.state = next;
        Ok(())
    }

    /// Take ownership of `path`. Recording an already-owned path updates its role.
    pub fn record(&mut self, path: impl Into<PathBuf>, role: ArtifactRole) {
        let path = path.into();
        if let Some(existing) = self.artifacts.iter_mut().find(|a| a.path == path) {
            existing.role = role;
            return;
        }
        self.artifacts.push(Artifact {
            path,
            role,
            released: false,
        });
    }

    /// Whether a file name belongs to this job's namespace in the working directory.
    fn owns_name(&self, name: &str) -> bool {
        match self.workspace.discriminator() {
            None => true,
            Some(disc) => name
                .strip_prefix(disc)
                .is_some_and(|rest| rest.starts_with(DISCRIMINATOR_SEPARATOR)),
        }
    }

    /// Names currently in the working directory that belong to this job.
    ///
    /// Taken before disposal for failure diagnostics. In a shared root, files of
    /// other jobs are left out.
    pub async fn directory_listing(&self) -> Vec<String> {
        list_dir_names(self.dir())
            .await
            .into_iter()
            .filter(|name| self.owns_name(name))
            .collect()
    }

    /// Remove every intermediate artifact from disk. Returns how many were removed.
    pub async fn release_intermediates(&mut self) -> usize {
        let mut removed = 0;
        for artifact in self
            .artifacts
            .iter_mut()
            .filter(|a| a.role == ArtifactRole::Intermediate && !a.released)
        {
            match remove_file_if_exists(&artifact.path).await {
                Ok(existed) => {
                    artifact.released = true;
                    removed += usize::from(existed);
                }
                Err(e) => warn!(job_id = %self.id, error = %e, "Failed to remove intermediate artifact"),
            }
        }
        debug!(job_id = %self.id, removed, "Released intermediate artifacts");
        removed
    }

    /// Mark the job failed and dispose of everything it recorded.
    pub async fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = JobState::Failed;
        }
        self.dispose().await;
    }

    /// Signal that the delivery boundary has sent the whole terminal artifact.
    pub fn mark_delivered(&mut self) {
        self.delivered = true;
    }

    /// Record every file in a shared root that carries this job's discriminator.
    ///
    /// Covers the fetch tool's own scratch files (`.part`, fragments), whose names
    /// can't be known up front. Only names tagged with this job are claimed.
    fn claim_tagged(&mut self, names: Vec<String>) {
        if self.workspace.is_exclusive() {
            return;
        }
        let dir = self.workspace.dir().to_path_buf();
        for name in names {
            if self.owns_name(&name) {
                self.record(dir.join(name), ArtifactRole::Intermediate);
            }
        }
    }

    /// Dispose of every recorded artifact, and of the directory when it is exclusive.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if !self.workspace.is_exclusive() {
            let names = list_dir_names(self.workspace.dir()).await;
            self.claim_tagged(names);
        }
        for artifact in self.artifacts.iter_mut().filter(|a| !a.released) {
            if let Err(e) = remove_file_if_exists(&artifact.path).await {
                warn!(job_id = %self.id, error = %e, "Failed to remove artifact");
            }
            artifact.released = true;
        }
        if self.workspace.is_exclusive()
            && let Err(e) = remove_dir_all_if_exists(self.workspace.dir()).await
        {
            warn!(job_id = %self.id, error = %e, "Failed to remove job directory");
        }
        self.disposed = true;
        debug!(job_id = %self.id, state = %self.state, "Job disposed");
    }

    /// Disposal from `Drop`. Recorded files are unlinked in place; an exclusive
    /// directory tree goes to the blocking pool when a runtime is available, so
    /// a large tree can't stall the worker dropping the job.
    fn dispose_on_drop(&mut self) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) if self.workspace.is_exclusive() => handle,
            _ => return self.dispose_sync(),
        };

        self.remove_recorded_sync();
        let dir = self.workspace.dir().to_path_buf();
        let job_id = self.id.clone();
        handle.spawn_blocking(move || {
            if let Err(e) = remove_dir_all_if_exists_sync(&dir) {
                warn!(job_id = %job_id, error = %e, "Failed to remove job directory");
            }
        });
        self.disposed = true;
        debug!(job_id = %self.id, state = %self.state, "Job disposed");
    }

    fn remove_recorded_sync(&mut self) {
        for artifact in self.artifacts.iter_mut().filter(|a| !a.released) {
            if let Err(e) = remove_file_if_exists_sync(&artifact.path) {
                warn!(job_id = %self.id, error = %e, "Failed to remove artifact");
            }
            artifact.released = true;
        }
    }

    fn dispose_sync(&mut self) {
        if !self.workspace.is_exclusive() {
            let names = std::fs::read_dir(self.workspace.dir())
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            self.claim_tagged(names);
        }
        self.remove_recorded_sync();
        if self.workspace.is_exclusive()
            && let Err(e) = remove_dir_all_if_exists_sync(self.workspace.dir())
        {
            warn!(job_id = %self.id, error = %e, "Failed to remove job directory");
        }
        self.disposed = true;
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        match self.state {
            JobState::Delivering if self.delivered => {
                self.state = JobState::Cleaned;
                info!(job_id = %self.id, shape = %self.shape, "Job delivered");
            }
            JobState::Delivering => {
                self.state = JobState::Failed;
                warn!(job_id = %self.id, shape = %self.shape, "Delivery interrupted before completion");
            }
            state if !state.is_terminal() => {
                self.state = JobState::Failed;
                warn!(job_id = %self.id, shape = %self.shape, stage = %state, "Job abandoned");
            }
            _ => {}
        }
        self.dispose_on_drop();
    }
}

#[cfg(test)]
pub(crate) async fn wait_until_gone(path: &Path) -> bool {
    for _ in 0..100 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    !path.exists()
}

/// A failed job, reported after its artifacts have been disposed.
#[derive(Debug, Error)]
#[error("job {job_id} ({shape}) failed while {stage}: {error}")]
pub struct JobFailure {
    pub job_id: String,
    pub shape: JobShape,
    /// State the job was in when the error occurred.
    pub stage: JobState,
    #[source]
    pub error: Error,
    /// Working directory contents at the time of failure.
    pub directory: Vec<String>,
}

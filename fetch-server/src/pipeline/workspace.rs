//! Per-job working directories.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::utils::fs::ensure_dir_all;

/// How jobs share the filesystem.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WorkspaceMode {
    /// Every job gets an exclusive subdirectory of the work root.
    #[default]
    Scoped,
    /// All jobs write into the work root; names carry the job id as discriminator.
    Shared,
}

/// The directory a job runs in.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    dir: PathBuf,
    discriminator: Option<String>,
}

impl JobWorkspace {
    /// Acquire the working directory for `job_id` under `root`.
    pub async fn acquire(root: &Path, mode: WorkspaceMode, job_id: &str) -> Result<Self> {
        let workspace = match mode {
            WorkspaceMode::Scoped => Self {
                dir: root.join(job_id),
                discriminator: None,
            },
            WorkspaceMode::Shared => Self {
                dir: root.to_path_buf(),
                discriminator: Some(job_id.to_string()),
            },
        };
        ensure_dir_all(&workspace.dir).await?;
        Ok(workspace)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Job-unique token that output names must carry, in shared mode.
    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    /// Whether the directory belongs to this job alone (and is removed with it).
    pub fn is_exclusive(&self) -> bool {
        self.discriminator.is_none()
    }
}

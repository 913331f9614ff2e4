//! Job pipeline.
//!
//! One state machine drives every job shape; a shape is just the subset of
//! stages it passes through:
//!
//! | Shape             | Stages                                                  |
//! |-------------------|---------------------------------------------------------|
//! | `SingleFile`      | Fetching, Detecting, Selecting, Delivering              |
//! | `AudioOnly`       | Fetching, Detecting, Selecting, Delivering              |
//! | `FetchAndMux`     | Fetching (x2), Detecting, Selecting, PostProcessing, Delivering |
//! | `PlaylistArchive` | Fetching, Detecting, Selecting, Archiving, Delivering  |
//!
//! Any stage error fails the job: the directory listing is captured, every
//! recorded artifact is disposed, and the originating error is returned in a
//! [`JobFailure`].

use std::path::Path;

use chrono::Local;
use tracing::{Instrument, error, info, info_span};
use url::Url;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::pipeline::delivery::Delivery;
use crate::pipeline::detector::{WaitPolicy, await_artifacts};
use crate::pipeline::fetch::{FetchTool, FormatPreset, PlaylistListing};
use crate::pipeline::job::{ArtifactRole, Job, JobFailure, JobShape, JobState};
use crate::pipeline::naming::NamingPattern;
use crate::pipeline::processors::{ArchiveEntry, Archiver, MuxProcessor};
use crate::pipeline::runner::ProcessRunner;
use crate::pipeline::selector::SelectedFile;
use crate::pipeline::workspace::JobWorkspace;
use crate::utils::filename::sanitize_filename;
use crate::utils::fs::ensure_dir_all;
use crate::{Error, Result};

/// Check that `raw` is present and is an absolute http(s) URL.
pub fn validate_source_url(raw: Option<&str>) -> Result<String> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::validation("URL is required"))?;

    let url = Url::parse(raw).map_err(|e| Error::validation(format!("Invalid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        scheme => Err(Error::validation(format!(
            "Unsupported URL scheme '{}'",
            scheme
        ))),
    }
}

/// A validated acquisition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source_url: String,
    pub shape: JobShape,
    /// Sanitized stem for output names; the remote title is used when absent.
    pub title: Option<String>,
    /// Declared playlist size, used to bound detection.
    pub item_hint: Option<usize>,
}

impl JobRequest {
    pub fn new(source_url: Option<&str>, shape: JobShape) -> Result<Self> {
        Ok(Self {
            source_url: validate_source_url(source_url)?,
            shape,
            title: None,
            item_hint: None,
        })
    }

    pub fn with_title(mut self, title: Option<&str>) -> Self {
        self.title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(sanitize_filename);
        self
    }

    pub fn with_item_hint(mut self, items: Option<usize>) -> Self {
        self.item_hint = items.filter(|n| *n > 0);
        self
    }
}

/// Runs acquisition jobs. Holds no per-job state; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct JobPipeline {
    config: PipelineConfig,
    fetcher: FetchTool,
    muxer: MuxProcessor,
    archiver: Archiver,
}

impl JobPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let runner = ProcessRunner::new(config.process_timeout);
        Self {
            fetcher: FetchTool::new(
                config.fetch_tool.clone(),
                config.user_agent.clone(),
                runner.clone(),
            ),
            muxer: MuxProcessor::new(config.mux_tool.clone(), runner),
            archiver: Archiver::new(config.compression_level),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Create the work root if it does not exist yet.
    pub async fn prepare(&self) -> Result<()> {
        ensure_dir_all(&self.config.work_dir).await
    }

    /// List a playlist's items. Nothing is downloaded.
    pub async fn list_playlist(&self, url: Option<&str>) -> Result<PlaylistListing> {
        let url = validate_source_url(url)?;
        self.prepare().await?;
        self.fetcher.list_playlist(&url, &self.config.work_dir).await
    }

    /// Run `request` to the delivery boundary.
    ///
    /// On success the returned [`Delivery`] owns the job; disposal happens when
    /// its stream is dropped.
    pub async fn execute(&self, request: JobRequest) -> std::result::Result<Delivery, JobFailure> {
        let job_id = Uuid::new_v4().simple().to_string();
        let span = info_span!("job", job_id = %job_id, shape = %request.shape);
        self.execute_job(job_id, request).instrument(span).await
    }

    async fn execute_job(
        &self,
        job_id: String,
        request: JobRequest,
    ) -> std::result::Result<Delivery, JobFailure> {
        let workspace = match JobWorkspace::acquire(
            &self.config.work_dir,
            self.config.workspace_mode,
            &job_id,
        )
        .await
        {
            Ok(workspace) => workspace,
            Err(error) => {
                error!(error = %error, "Failed to acquire job workspace");
                return Err(JobFailure {
                    job_id,
                    shape: request.shape,
                    stage: JobState::Created,
                    error,
                    directory: Vec::new(),
                });
            }
        };

        let mut job = Job::new(job_id, &request.source_url, request.shape, workspace);
        info!(url = %job.source_url(), dir = %job.dir().display(), "Job started");

        let filename = match self.run_stages(&mut job, &request).await {
            Ok(filename) => filename,
            Err(error) => return Err(self.fail(job, error).await),
        };
        match self.begin_delivery(&mut job).await {
            Ok((path, size)) => {
                info!(filename = %filename, size, "Job ready for delivery");
                Ok(Delivery::new(job, path, filename, size))
            }
            Err(error) => Err(self.fail(job, error).await),
        }
    }

    /// Drive `job` through its shape's stages. Returns the caller-facing filename.
    async fn run_stages(&self, job: &mut Job, request: &JobRequest) -> Result<String> {
        match request.shape {
            JobShape::SingleFile => self.fetch_one(job, request, FormatPreset::Single).await,
            JobShape::AudioOnly => self.fetch_one(job, request, FormatPreset::AudioOnly).await,
            JobShape::FetchAndMux => self.fetch_and_mux(job, request).await,
            JobShape::PlaylistArchive => self.fetch_playlist(job, request).await,
        }
    }

    async fn fetch_one(&self, job: &mut Job, request: &JobRequest, preset: FormatPreset) -> Result<String> {
        let disc = job.workspace().discriminator().map(str::to_owned);
        let pattern = NamingPattern::single(disc.as_deref(), request.title.as_deref(), "")?;

        job.transition(JobState::Fetching)?;
        self.fetcher
            .download(&request.source_url, &pattern, preset, job.dir())
            .await?;

        job.transition(JobState::Detecting)?;
        let files = self.detect(job, &pattern, self.single_policy()).await?;

        job.transition(JobState::Selecting)?;
        let chosen = first_match(files, &pattern)?;
        job.record(&chosen.path, ArtifactRole::Terminal);
        Ok(pattern.display_name(file_name(&chosen.path)).to_string())
    }

    async fn fetch_and_mux(&self, job: &mut Job, request: &JobRequest) -> Result<String> {
        let disc = job.workspace().discriminator().map(str::to_owned);
        let title = request.title.as_deref();
        let video_pattern = NamingPattern::single(disc.as_deref(), title, ".video")?;
        let audio_pattern = NamingPattern::single(disc.as_deref(), title, ".audio")?;

        job.transition(JobState::Fetching)?;
        let video_run = self
            .fetcher
            .download(&request.source_url, &video_pattern, FormatPreset::VideoOnly, job.dir())
            .await?;
        let audio_run = self
            .fetcher
            .download(&request.source_url, &audio_pattern, FormatPreset::AudioOnly, job.dir())
            .await?;
        let fetch_stderr = format!("{}{}", video_run.stderr, audio_run.stderr);

        job.transition(JobState::Detecting)?;
        let policy = self.single_policy();
        let video = first_match(self.detect(job, &video_pattern, policy).await?, &video_pattern)?;
        let audio = first_match(self.detect(job, &audio_pattern, policy).await?, &audio_pattern)?;

        job.transition(JobState::Selecting)?;
        let output_name = format!(
            "{}.mp4",
            mux_stem(video_pattern.display_name(file_name(&video.path)))
        );
        let output = job
            .dir()
            .join(format!("{}{}", video_pattern.prefix(), output_name));
        job.record(&output, ArtifactRole::Terminal);

        job.transition(JobState::PostProcessing)?;
        self.muxer
            .mux(&video.path, &audio.path, &output, job.dir(), &fetch_stderr)
            .await?;
        Ok(output_name)
    }

    async fn fetch_playlist(&self, job: &mut Job, request: &JobRequest) -> Result<String> {
        let disc = job.workspace().discriminator().map(str::to_owned);
        let pattern = NamingPattern::playlist_item(disc.as_deref())?;

        job.transition(JobState::Fetching)?;
        self.fetcher
            .download(&request.source_url, &pattern, FormatPreset::Playlist, job.dir())
            .await?;

        job.transition(JobState::Detecting)?;
        let policy = WaitPolicy {
            max_wait: self.config.detector.playlist_wait(request.item_hint),
            ..self.single_policy()
        };
        let files = self.detect(job, &pattern, policy).await?;

        job.transition(JobState::Selecting)?;
        if files.len() < self.config.min_playlist_artifacts.max(1) {
            return Err(Error::NoArtifactsProduced {
                pattern: pattern.to_string(),
            });
        }

        job.transition(JobState::Archiving)?;
        let archive_name = format!("Playlist-{}.zip", Local::now().format("%Y%m%d"));
        let destination = job
            .dir()
            .join(format!("{}{}", pattern.prefix(), archive_name));
        job.record(Archiver::partial_path(&destination), ArtifactRole::Intermediate);
        job.record(&destination, ArtifactRole::Terminal);

        let entries = files
            .iter()
            .map(|f| ArchiveEntry::new(&f.path, pattern.display_name(file_name(&f.path))))
            .collect();
        self.archiver.archive(entries, &destination).await?;
        Ok(archive_name)
    }

    /// Wait for stable output under `pattern` and take ownership of it.
    async fn detect(
        &self,
        job: &mut Job,
        pattern: &NamingPattern,
        policy: WaitPolicy,
    ) -> Result<Vec<SelectedFile>> {
        let files = await_artifacts(job.dir(), pattern, &policy).await?;
        for file in &files {
            job.record(&file.path, ArtifactRole::Intermediate);
        }
        Ok(files)
    }

    fn single_policy(&self) -> WaitPolicy {
        let detector = &self.config.detector;
        WaitPolicy {
            poll_interval: detector.poll_interval,
            max_wait: detector.single_max_wait,
            no_output_grace: detector.no_output_grace,
        }
    }

    /// Enter `Delivering`: drop intermediates and size up the terminal artifact.
    async fn begin_delivery(&self, job: &mut Job) -> Result<(std::path::PathBuf, u64)> {
        job.transition(JobState::Delivering)?;
        job.release_intermediates().await;

        let path = job
            .terminal()
            .map(|a| a.path.clone())
            .ok_or_else(|| Error::Delivery("Job produced no terminal artifact".to_string()))?;
        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::Delivery(format!("Terminal artifact unavailable: {}", e)))?
            .len();
        Ok((path, size))
    }

    async fn fail(&self, mut job: Job, error: Error) -> JobFailure {
        let stage = job.state();
        let directory = job.directory_listing().await;
        error!(
            stage = %stage,
            kind = error.kind(),
            error = %error,
            directory = ?directory,
            "Job failed"
        );
        job.fail().await;

        JobFailure {
            job_id: job.id().to_string(),
            shape: job.shape(),
            stage,
            error,
            directory,
        }
    }
}

fn first_match(files: Vec<SelectedFile>, pattern: &NamingPattern) -> Result<SelectedFile> {
    files
        .into_iter()
        .next()
        .ok_or_else(|| Error::NoArtifactsProduced {
            pattern: pattern.to_string(),
        })
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// `Song.video.mp4` -> `Song`.
fn mux_stem(video_name: &str) -> &str {
    let without_ext = video_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(video_name);
    without_ext.strip_suffix(".video").unwrap_or(without_ext)
}

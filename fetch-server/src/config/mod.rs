//! Process-wide configuration loaded from the environment.
//!
//! Every value has a default so the server starts with an empty environment;
//! unparsable values are ignored with a warning and the default is kept.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::pipeline::WorkspaceMode;

/// Default user agent handed to the fetch tool.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3002,
            enable_cors: true,
        }
    }
}

/// An external program plus the arguments always placed before per-call arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub program: String,
    pub base_args: Vec<String>,
}

impl ToolConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Completion detector bounds.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub poll_interval: Duration,
    /// Bound for shapes producing one artifact (single, audio, each mux leg).
    pub single_max_wait: Duration,
    /// Playlist bound: `playlist_base_wait + playlist_per_item_wait * items`, capped by
    /// `playlist_max_wait`. Without an item hint the cap itself is used.
    pub playlist_base_wait: Duration,
    pub playlist_per_item_wait: Duration,
    pub playlist_max_wait: Duration,
    /// Give up early when nothing at all has matched after this long.
    pub no_output_grace: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            single_max_wait: Duration::from_secs(30),
            playlist_base_wait: Duration::from_secs(30),
            playlist_per_item_wait: Duration::from_secs(10),
            playlist_max_wait: Duration::from_secs(600),
            no_output_grace: Duration::from_secs(3),
        }
    }
}

impl DetectorConfig {
    /// Detector bound for a playlist job with an optional declared item count.
    pub fn playlist_wait(&self, item_hint: Option<usize>) -> Duration {
        match item_hint {
            Some(items) => {
                let per_item = self
                    .playlist_per_item_wait
                    .saturating_mul(u32::try_from(items).unwrap_or(u32::MAX));
                self.playlist_base_wait
                    .saturating_add(per_item)
                    .min(self.playlist_max_wait)
            }
            None => self.playlist_max_wait,
        }
    }
}

/// Everything the acquisition pipeline needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root directory under which job working directories live.
    pub work_dir: PathBuf,
    pub workspace_mode: WorkspaceMode,
    pub fetch_tool: ToolConfig,
    pub mux_tool: ToolConfig,
    pub user_agent: String,
    pub detector: DetectorConfig,
    /// Optional hard bound on any single external process.
    pub process_timeout: Option<Duration>,
    /// Deflate level used by the archiver (0 stores entries uncompressed).
    pub compression_level: u8,
    /// A playlist archive with fewer matched artifacts than this fails.
    pub min_playlist_artifacts: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./downloads"),
            workspace_mode: WorkspaceMode::Scoped,
            fetch_tool: ToolConfig::new("yt-dlp"),
            mux_tool: ToolConfig::new("ffmpeg"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            detector: DetectorConfig::default(),
            process_timeout: None,
            compression_level: 9,
            min_playlist_artifacts: 1,
        }
    }
}

/// Logging destination and retention.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    pub retention_days: i64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            retention_days: 7,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: PipelineConfig,
    pub logging: LogConfig,
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `PORT` / `API_PORT`, `ENABLE_CORS`
    /// - `WORK_DIR`, `WORKSPACE_MODE` (`scoped` | `shared`)
    /// - `YTDLP_PATH`, `YTDLP_ARGS`, `FFMPEG_PATH`, `USER_AGENT`
    /// - `POLL_INTERVAL_MS`, `SINGLE_MAX_WAIT_SECS`, `PLAYLIST_BASE_WAIT_SECS`,
    ///   `PLAYLIST_PER_ITEM_WAIT_SECS`, `PLAYLIST_MAX_WAIT_SECS`, `NO_OUTPUT_GRACE_MS`
    /// - `PROCESS_TIMEOUT_SECS`, `COMPRESSION_LEVEL`
    /// - `LOG_DIR`, `LOG_RETENTION_DAYS`
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            config.server.bind_address = bind_address;
        }
        for key in ["PORT", "API_PORT"] {
            if let Some(port) = parse_var(key, get(key)) {
                config.server.port = port;
            }
        }
        if let Some(enable) = parse_var("ENABLE_CORS", get("ENABLE_CORS")) {
            config.server.enable_cors = enable;
        }

        let pipeline = &mut config.pipeline;
        if let Some(dir) = get("WORK_DIR") {
            pipeline.work_dir = PathBuf::from(dir);
        }
        if let Some(mode) = parse_var("WORKSPACE_MODE", get("WORKSPACE_MODE")) {
            pipeline.workspace_mode = mode;
        }
        if let Some(program) = get("YTDLP_PATH") {
            pipeline.fetch_tool.program = program;
        }
        if let Some(args) = get("YTDLP_ARGS") {
            pipeline.fetch_tool.base_args = args.split_whitespace().map(String::from).collect();
        }
        if let Some(program) = get("FFMPEG_PATH") {
            pipeline.mux_tool.program = program;
        }
        if let Some(ua) = get("USER_AGENT") {
            pipeline.user_agent = ua;
        }

        let detector = &mut pipeline.detector;
        if let Some(ms) = parse_var::<u64>("POLL_INTERVAL_MS", get("POLL_INTERVAL_MS")) {
            detector.poll_interval = Duration::from_millis(ms.max(10));
        }
        if let Some(ms) = parse_var::<u64>("NO_OUTPUT_GRACE_MS", get("NO_OUTPUT_GRACE_MS")) {
            detector.no_output_grace = Duration::from_millis(ms);
        }
        let secs = |key: &str| parse_var::<u64>(key, get(key)).map(Duration::from_secs);
        if let Some(d) = secs("SINGLE_MAX_WAIT_SECS") {
            detector.single_max_wait = d;
        }
        if let Some(d) = secs("PLAYLIST_BASE_WAIT_SECS") {
            detector.playlist_base_wait = d;
        }
        if let Some(d) = secs("PLAYLIST_PER_ITEM_WAIT_SECS") {
            detector.playlist_per_item_wait = d;
        }
        if let Some(d) = secs("PLAYLIST_MAX_WAIT_SECS") {
            detector.playlist_max_wait = d;
        }

        pipeline.process_timeout = secs("PROCESS_TIMEOUT_SECS").filter(|d| !d.is_zero());
        if let Some(level) = parse_var::<u8>("COMPRESSION_LEVEL", get("COMPRESSION_LEVEL")) {
            pipeline.compression_level = level.min(9);
        }

        if let Some(dir) = get("LOG_DIR") {
            config.logging.log_dir = PathBuf::from(dir);
        }
        if let Some(days) = parse_var("LOG_RETENTION_DAYS", get("LOG_RETENTION_DAYS")) {
            config.logging.retention_days = days;
        }

        config
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %value, "Ignoring unparsable environment variable");
            None
        }
    }
}

//! Fetch-tool (yt-dlp) invocation.
//!
//! The tool is a black box driven through its CLI: an output template, a
//! format-selection chain and a handful of behaviour flags. The source URL is
//! always passed after `--` so it can never be read as an option.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::config::ToolConfig;
use crate::pipeline::naming::NamingPattern;
use crate::pipeline::runner::{ExternalProcessResult, ProcessRunner};

/// Title used when the listing carries none.
pub const UNKNOWN_PLAYLIST_TITLE: &str = "Unknown Playlist";

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Format-selection presets, one per fetch leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatPreset {
    /// Best mp4 video between 720p and 1080p (falling back through 480p) plus m4a audio.
    Single,
    /// Best combined format of at least 1080p.
    Playlist,
    /// Video stream only, for muxing.
    VideoOnly,
    /// Audio stream only.
    AudioOnly,
}

impl FormatPreset {
    pub fn selector(&self) -> &'static str {
        match self {
            Self::Single => concat!(
                "(bestvideo[height<=1080][height>=720])[ext=mp4]+bestaudio[ext=m4a]/",
                "(bestvideo[height<=720][height>=480])[ext=mp4]+bestaudio[ext=m4a]/",
                "(bestvideo[height<=480])[ext=mp4]+bestaudio[ext=m4a]/",
                "best"
            ),
            Self::Playlist => "best[height>=1080]/best",
            Self::VideoOnly => "bestvideo[ext=mp4]/bestvideo",
            Self::AudioOnly => "bestaudio[ext=m4a]/bestaudio",
        }
    }

    /// Container for the tool's own merge step, when the preset can merge.
    pub fn merge_output_format(&self) -> Option<&'static str> {
        match self {
            Self::Single | Self::Playlist => Some("mp4"),
            Self::VideoOnly | Self::AudioOnly => None,
        }
    }

    fn is_playlist(&self) -> bool {
        matches!(self, Self::Playlist)
    }
}

/// One playlist entry as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
}

/// A playlist's title and its items, in playlist order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistListing {
    pub playlist: String,
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    title: Option<String>,
    #[serde(default)]
    entries: Vec<Option<RawEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
}

/// Parse the tool's `--dump-single-json` output for a flat playlist.
pub fn parse_playlist_listing(json: &str) -> Result<PlaylistListing> {
    let raw: RawPlaylist = serde_json::from_str(json)?;

    let items = raw
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            let url = match (entry.id, entry.url) {
                (Some(id), _) if !id.is_empty() => format!("{}{}", WATCH_URL_PREFIX, id),
                (_, Some(url)) if !url.is_empty() => url,
                _ => return None,
            };
            Some(PlaylistItem {
                title: entry.title,
                url,
            })
        })
        .collect();

    Ok(PlaylistListing {
        playlist: raw
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_PLAYLIST_TITLE.to_string()),
        items,
    })
}

/// Drives the fetch tool for one or many jobs.
#[derive(Debug, Clone)]
pub struct FetchTool {
    tool: ToolConfig,
    user_agent: String,
    runner: ProcessRunner,
}

impl FetchTool {
    pub fn new(tool: ToolConfig, user_agent: impl Into<String>, runner: ProcessRunner) -> Self {
        Self {
            tool,
            user_agent: user_agent.into(),
            runner,
        }
    }

    /// Arguments for downloading `url` under `pattern` with `preset`.
    pub fn download_args(&self, url: &str, pattern: &NamingPattern, preset: FormatPreset) -> Vec<String> {
        let mut args = vec![
            "--output".to_string(),
            pattern.template(),
            "--format".to_string(),
            preset.selector().to_string(),
        ];
        if let Some(container) = preset.merge_output_format() {
            args.push("--merge-output-format".to_string());
            args.push(container.to_string());
        }
        args.push(
            if preset.is_playlist() {
                "--yes-playlist"
            } else {
                "--no-playlist"
            }
            .to_string(),
        );
        args.extend([
            "--user-agent".to_string(),
            self.user_agent.clone(),
            "--no-mtime".to_string(),
            "--no-progress".to_string(),
            "--".to_string(),
            url.to_string(),
        ]);
        args
    }

    /// Download `url` into `dir`, naming outputs by `pattern`.
    pub async fn download(
        &self,
        url: &str,
        pattern: &NamingPattern,
        preset: FormatPreset,
        dir: &Path,
    ) -> Result<ExternalProcessResult> {
        let args = self.download_args(url, pattern, preset);
        debug!(url, ?preset, template = %pattern, "Starting fetch");
        self.runner.run(&self.tool, &args, dir).await
    }

    /// List the items of the playlist at `url` without downloading anything.
    pub async fn list_playlist(&self, url: &str, dir: &Path) -> Result<PlaylistListing> {
        let args = vec![
            "--flat-playlist".to_string(),
            "--dump-single-json".to_string(),
            "--user-agent".to_string(),
            self.user_agent.clone(),
            "--".to_string(),
            url.to_string(),
        ];
        let result = self.runner.run(&self.tool, &args, dir).await?;
        let listing = parse_playlist_listing(&result.stdout)?;
        debug!(url, items = listing.items.len(), "Listed playlist");
        Ok(listing)
    }
}

//! Request and response models for the HTTP API.

use serde::{Deserialize, Serialize};

/// Query for the single-file, merged and audio endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
    /// Display title; names the delivered file.
    pub title: Option<String>,
}

/// Query for the playlist archive endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvertQuery {
    pub url: Option<String>,
    /// Declared number of playlist items. Unparsable values are ignored.
    pub items: Option<String>,
}

impl ConvertQuery {
    pub fn item_hint(&self) -> Option<usize> {
        self.items.as_deref().and_then(|s| s.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistItemsQuery {
    #[serde(rename = "playlistUrl")]
    pub playlist_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

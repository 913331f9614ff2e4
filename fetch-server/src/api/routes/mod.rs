//! API route modules.

pub mod health;
pub mod media;
pub mod playlist;

use axum::{Router, routing::get};

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/download-single", get(media::download_single))
        .route("/download-merged", get(media::download_merged))
        .route("/download-audio", get(media::download_audio))
        .route("/convert", get(media::convert_playlist))
        .route("/get-playlist-items", get(playlist::get_playlist_items))
        .merge(health::router())
        .with_state(state)
}

//! Playlist listing route.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::api::error::ApiResult;
use crate::api::models::PlaylistItemsQuery;
use crate::api::server::AppState;
use crate::pipeline::PlaylistListing;

/// `GET /get-playlist-items?playlistUrl=...`
pub async fn get_playlist_items(
    State(state): State<AppState>,
    Query(query): Query<PlaylistItemsQuery>,
) -> ApiResult<Json<PlaylistListing>> {
    let listing = state
        .pipeline
        .list_playlist(query.playlist_url.as_deref())
        .await?;
    Ok(Json(listing))
}

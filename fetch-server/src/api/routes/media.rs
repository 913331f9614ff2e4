//! Media delivery routes.
//!
//! Each route validates its query, runs one job, and streams the terminal
//! artifact back as an attachment. The job is disposed when the response body
//! is dropped, whether or not the client read it to the end.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{ConvertQuery, DownloadQuery};
use crate::api::server::AppState;
use crate::pipeline::{JobRequest, JobShape};
use crate::utils::filename::content_disposition;

/// `GET /download-single?url=...&title=...`
pub async fn download_single(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let request = JobRequest::new(query.url.as_deref(), JobShape::SingleFile)?
        .with_title(query.title.as_deref());
    deliver(&state, request).await
}

/// `GET /download-merged?url=...&title=...`
pub async fn download_merged(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let request = JobRequest::new(query.url.as_deref(), JobShape::FetchAndMux)?
        .with_title(query.title.as_deref());
    deliver(&state, request).await
}

/// `GET /download-audio?url=...&title=...`
pub async fn download_audio(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let request = JobRequest::new(query.url.as_deref(), JobShape::AudioOnly)?
        .with_title(query.title.as_deref());
    deliver(&state, request).await
}

/// `GET /convert?url=...&items=...`: the whole playlist as one zip.
pub async fn convert_playlist(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> ApiResult<Response> {
    let request = JobRequest::new(query.url.as_deref(), JobShape::PlaylistArchive)?
        .with_item_hint(query.item_hint());
    deliver(&state, request).await
}

async fn deliver(state: &AppState, request: JobRequest) -> ApiResult<Response> {
    let delivery = state.pipeline.execute(request).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(delivery.content_type()),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(delivery.size()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition(delivery.filename()))
            .map_err(|e| ApiError::internal(format!("Invalid header value: {e}")))?,
    );

    let stream = delivery.open().await?;
    Ok((headers, Body::from_stream(stream)).into_response())
}

//! Movie export and download.
//!
//! - `POST /albums/make_movie/`      -> movie of the globally most viewed photos
//! - `POST /albums/make_user_movie/` -> movie of the caller's most viewed photos
//! - `GET  /downloads/{id}/`         -> the rendered file as an attachment

use crate::{
    errors::AppError,
    handlers::auth::AuthUser,
    models::photo::Photo,
    routes::routes::API_PREFIX,
    services::photo_service::TOP_PHOTOS_LIMIT,
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::io::ReaderStream;

pub const MOVIE_CONTENT_TYPE: &str = "audio/webm";

/// Response of the make-movie endpoints.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DownloadLinkResp {
    pub id: i64,
    pub url: String,
}

/// `POST /albums/make_movie/`
pub async fn make_movie(
    State(state): State<AppState>,
    _user: AuthUser,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<DownloadLinkResp>), AppError> {
    let photos = state.photos.top_photos(None, TOP_PHOTOS_LIMIT).await?;
    render_movie(&state, &photos, &headers).await
}

/// `POST /albums/make_user_movie/`
pub async fn make_user_movie(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<DownloadLinkResp>), AppError> {
    let photos = state
        .photos
        .top_photos(Some(user.id()), TOP_PHOTOS_LIMIT)
        .await?;
    render_movie(&state, &photos, &headers).await
}

/// `GET /downloads/{id}/`: streams the movie; links may be fetched repeatedly.
pub async fn download_movie(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let (link, file) = state.links.open(id).await?;
    let length = file.metadata().await.ok().map(|meta| meta.len());

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(MOVIE_CONTENT_TYPE),
    );
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", link.file_name))
        .map_err(|err| AppError::internal(format!("bad file name header: {}", err)))?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

/// Reject empty selections, otherwise allocate a link, render into it and
/// answer with its URL. A failed render takes the link with it.
async fn render_movie(
    state: &AppState,
    photos: &[Photo],
    headers: &HeaderMap,
) -> Result<(StatusCode, Json<DownloadLinkResp>), AppError> {
    if photos.is_empty() {
        return Err(AppError::bad_request("Photos does not exist"));
    }

    let link = state.links.allocate().await?;
    let images: Vec<PathBuf> = photos
        .iter()
        .map(|photo| state.media.absolute(&photo.image))
        .collect();

    if let Err(err) = state.movies.assemble(&images, link.path()).await {
        if let Err(discard_err) = state.links.discard(&link).await {
            tracing::warn!(link_id = link.id, "failed to discard link: {}", discard_err);
        }
        return Err(err.into());
    }

    let url = format!(
        "{}{}/downloads/{}/",
        base_url(state, headers),
        API_PREFIX,
        link.id
    );
    Ok((StatusCode::CREATED, Json(DownloadLinkResp { id: link.id, url })))
}

fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.public_base_url {
        return base.clone();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

//! HTTP handlers for photo CRUD under `/api/v1/albums/`.
//! Uploads arrive as multipart (`image` file + `title`); everything else is
//! JSON. Storage and validation live in `PhotoService`.

use crate::{
    errors::AppError,
    handlers::auth::AuthUser,
    models::photo::Photo,
    services::{media_store::MediaStore, photo_service::NewPhoto},
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Photo as shown in listings and to non-owners.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PhotoSummary {
    pub id: i64,
    pub title: String,
    pub image: String,
    pub creator: i64,
    pub created_at: DateTime<Utc>,
    pub views: i64,
}

/// Photo as shown to its owner, including the derived blobs.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PhotoDetail {
    #[serde(flatten)]
    pub summary: PhotoSummary,
    pub cropped_image: String,
    pub webp_image: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PhotoBody {
    Summary(PhotoSummary),
    Detail(PhotoDetail),
}

impl From<&Photo> for PhotoSummary {
    fn from(photo: &Photo) -> Self {
        Self {
            id: photo.id,
            title: photo.title.clone(),
            image: MediaStore::url_for(&photo.image),
            creator: photo.creator_id,
            created_at: photo.created_at,
            views: photo.views,
        }
    }
}

impl From<&Photo> for PhotoDetail {
    fn from(photo: &Photo) -> Self {
        Self {
            summary: PhotoSummary::from(photo),
            cropped_image: MediaStore::url_for(&photo.cropped_image),
            webp_image: MediaStore::url_for(&photo.webp_image),
        }
    }
}

/// Body of `PUT`/`PATCH /albums/{id}/`. Only the title is editable.
#[derive(Debug, Deserialize)]
pub struct UpdatePhotoReq {
    pub title: Option<String>,
}

/// `GET /albums/`
pub async fn list_photos(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<PhotoSummary>>, AppError> {
    let photos = state.photos.list().await?;
    Ok(Json(photos.iter().map(PhotoSummary::from).collect()))
}

/// `POST /albums/`: multipart upload.
pub async fn create_photo(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let upload = read_upload(multipart).await?;
    let photo = state.photos.create(user.id(), upload).await?;
    Ok((StatusCode::CREATED, Json(PhotoDetail::from(&photo))))
}

/// `GET /albums/{id}/`: counts as a view. The response carries the count
/// from before this retrieval.
pub async fn get_photo(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PhotoBody>, AppError> {
    let photo = state.photos.get(id).await?;
    let body = if photo.creator_id == user.id() {
        PhotoBody::Detail(PhotoDetail::from(&photo))
    } else {
        PhotoBody::Summary(PhotoSummary::from(&photo))
    };

    state.photos.record_view(id).await?;
    Ok(Json(body))
}

/// `PUT /albums/{id}/`: owner only. A full update, so the title is required.
pub async fn replace_photo(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePhotoReq>,
) -> Result<Json<PhotoDetail>, AppError> {
    let title = req
        .title
        .ok_or_else(|| AppError::bad_request("Title is required."))?;
    let photo = state.photos.update_title(user.id(), id, &title).await?;
    Ok(Json(PhotoDetail::from(&photo)))
}

/// `PATCH /albums/{id}/`: owner only. Fields left out stay as they are.
pub async fn update_photo(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePhotoReq>,
) -> Result<Json<PhotoDetail>, AppError> {
    let photo = match req.title {
        Some(title) => state.photos.update_title(user.id(), id, &title).await?,
        None => {
            let photo = state.photos.get(id).await?;
            if photo.creator_id != user.id() {
                return Err(AppError::new(
                    StatusCode::FORBIDDEN,
                    format!("only the owner may change photo {}", id),
                ));
            }
            photo
        }
    };
    Ok(Json(PhotoDetail::from(&photo)))
}

/// `DELETE /albums/{id}/`: owner only; removes all blobs.
pub async fn delete_photo(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.photos.delete(user.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn read_upload(mut multipart: Multipart) -> Result<NewPhoto, AppError> {
    let mut title: Option<String> = None;
    let mut image: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("title") => title = Some(field.text().await?),
            Some("image") => {
                let filename = field
                    .file_name()
                    .map(str::to_owned)
                    .ok_or_else(|| AppError::bad_request("The submitted data was not a file."))?;
                image = Some((filename, field.bytes().await?));
            }
            _ => {}
        }
    }

    let (filename, bytes) = image.ok_or_else(|| AppError::bad_request("No file was submitted."))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("The submitted file is empty."));
    }
    let title = title.ok_or_else(|| AppError::bad_request("Title is required."))?;

    Ok(NewPhoto {
        title,
        filename,
        bytes,
    })
}

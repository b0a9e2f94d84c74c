//! src/services/photo_service.rs
//!
//! PhotoService: photo metadata in SQLite, blobs through `MediaStore`.
//!
//! Derived blobs are generated only by `create`. `update_title` and
//! `record_view` touch their own columns and nothing else, so the derived
//! copies stay byte-for-byte what the upload produced.

use crate::{
    models::photo::Photo,
    services::{
        imaging::{self, DerivedImages, ImagingError},
        media_store::{MediaError, MediaStore, UPLOADS_DIR, sanitize_file_name},
    },
};
use bytes::Bytes;
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on the size of any top-photos selection.
pub const TOP_PHOTOS_LIMIT: usize = 10;
pub const MAX_TITLE_LEN: usize = 100;

const PHOTO_COLUMNS: &str =
    "id, title, creator_id, image, cropped_image, webp_image, created_at, views";

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("{0}")]
    Validation(String),
    #[error("photo {0} not found")]
    NotFound(i64),
    #[error("only the owner may change photo {0}")]
    NotOwner(i64),
    #[error(transparent)]
    Imaging(#[from] ImagingError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("image processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type PhotoResult<T> = Result<T, PhotoError>;

/// Admission rules applied to uploads before any image work starts.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub accepted_mime_types: Vec<String>,
    pub max_bytes: usize,
}

impl UploadPolicy {
    /// Sniff the payload's mime type from its magic bytes and check it, then
    /// check the size.
    pub fn check(&self, bytes: &[u8]) -> PhotoResult<()> {
        let mime = image::guess_format(bytes)
            .map(|format| format.to_mime_type())
            .unwrap_or("application/octet-stream");

        if !self.accepted_mime_types.iter().any(|m| m == mime) {
            return Err(PhotoError::Validation(format!(
                "Image mime must be: {}",
                self.accepted_mime_types.join(", ")
            )));
        }
        if bytes.len() > self.max_bytes {
            return Err(PhotoError::Validation(format!(
                "Image size must be not more {} bytes",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

/// An upload as received from the client.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub title: String,
    pub filename: String,
    pub bytes: Bytes,
}

struct StoredBlobs {
    image: String,
    cropped_image: String,
    webp_image: String,
}

#[derive(Clone)]
pub struct PhotoService {
    db: Arc<SqlitePool>,
    media: MediaStore,
    policy: UploadPolicy,
}

impl PhotoService {
    pub fn new(db: Arc<SqlitePool>, media: MediaStore, policy: UploadPolicy) -> Self {
        Self { db, media, policy }
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Validate an upload, derive its copies, store all three blobs and
    /// insert the row.
    ///
    /// Nothing is written to disk until validation and decoding succeed, and
    /// written blobs are removed again if the insert fails.
    pub async fn create(&self, owner_id: i64, upload: NewPhoto) -> PhotoResult<Photo> {
        let title = validate_title(&upload.title)?;
        self.policy.check(&upload.bytes)?;
        let filename = sanitize_file_name(&upload.filename)
            .map_err(|_| PhotoError::Validation("Image file name is invalid".into()))?;

        let derived = {
            let bytes = upload.bytes.clone();
            let name = filename.clone();
            tokio::task::spawn_blocking(move || imaging::generate(&bytes, &name)).await?
        }
        .map_err(|err| match err {
            encode @ ImagingError::Encode { .. } => PhotoError::Imaging(encode),
            other => PhotoError::Validation(format!("Upload a valid image: {}", other)),
        })?;

        let blobs = self.store_blobs(&filename, &upload.bytes, &derived).await?;

        let inserted = sqlx::query_as::<_, Photo>(&format!(
            "INSERT INTO photos (title, creator_id, image, cropped_image, webp_image, created_at, views)
             VALUES (?, ?, ?, ?, ?, ?, 0)
             RETURNING {}",
            PHOTO_COLUMNS
        ))
        .bind(&title)
        .bind(owner_id)
        .bind(&blobs.image)
        .bind(&blobs.cropped_image)
        .bind(&blobs.webp_image)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match inserted {
            Ok(photo) => {
                info!(photo_id = photo.id, owner_id, image = %photo.image, "photo created");
                Ok(photo)
            }
            Err(err) => {
                self.remove_blobs(&[
                    blobs.image.as_str(),
                    blobs.cropped_image.as_str(),
                    blobs.webp_image.as_str(),
                ])
                .await;
                Err(PhotoError::Sqlx(err))
            }
        }
    }

    pub async fn list(&self) -> PhotoResult<Vec<Photo>> {
        let photos = sqlx::query_as::<_, Photo>(&format!(
            "SELECT {} FROM photos ORDER BY id",
            PHOTO_COLUMNS
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(photos)
    }

    pub async fn get(&self, id: i64) -> PhotoResult<Photo> {
        sqlx::query_as::<_, Photo>(&format!(
            "SELECT {} FROM photos WHERE id = ?",
            PHOTO_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(PhotoError::NotFound(id))
    }

    /// Count one retrieval. The increment happens inside SQLite, so
    /// concurrent readers never lose a view. Returns the new count.
    pub async fn record_view(&self, id: i64) -> PhotoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE photos SET views = views + 1 WHERE id = ? RETURNING views",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(PhotoError::NotFound(id))
    }

    /// Administrative override of a photo's view counter.
    pub async fn set_views(&self, id: i64, views: i64) -> PhotoResult<()> {
        if views < 0 {
            return Err(PhotoError::Validation("Views may not be negative".into()));
        }
        let result = sqlx::query("UPDATE photos SET views = ? WHERE id = ?")
            .bind(views)
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PhotoError::NotFound(id));
        }
        Ok(())
    }

    /// Change a photo's title. Only its owner may do this.
    pub async fn update_title(&self, owner_id: i64, id: i64, title: &str) -> PhotoResult<Photo> {
        let title = validate_title(title)?;
        let photo = self.get(id).await?;
        if photo.creator_id != owner_id {
            return Err(PhotoError::NotOwner(id));
        }

        let updated = sqlx::query_as::<_, Photo>(&format!(
            "UPDATE photos SET title = ? WHERE id = ? RETURNING {}",
            PHOTO_COLUMNS
        ))
        .bind(&title)
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(PhotoError::NotFound(id))?;

        debug!(photo_id = id, "photo title updated");
        Ok(updated)
    }

    /// Delete a photo and all three of its blobs. Only its owner may do this.
    pub async fn delete(&self, owner_id: i64, id: i64) -> PhotoResult<Photo> {
        let photo = self.get(id).await?;
        if photo.creator_id != owner_id {
            return Err(PhotoError::NotOwner(id));
        }

        let result = sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PhotoError::NotFound(id));
        }

        self.remove_blobs(&photo.blobs()).await;
        info!(photo_id = id, "photo deleted");
        Ok(photo)
    }

    /// Most viewed photos, highest count first, optionally limited to one
    /// owner. `limit` is capped at `TOP_PHOTOS_LIMIT`; equal counts keep
    /// upload order.
    pub async fn top_photos(&self, owner_id: Option<i64>, limit: usize) -> PhotoResult<Vec<Photo>> {
        let limit = limit.min(TOP_PHOTOS_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM photos",
            PHOTO_COLUMNS
        ));
        if let Some(owner) = owner_id {
            builder.push(" WHERE creator_id = ");
            builder.push_bind(owner);
        }
        builder.push(" ORDER BY views DESC, id ASC LIMIT ");
        builder.push_bind(limit as i64);

        let photos = builder.build_query_as::<Photo>().fetch_all(&*self.db).await?;
        Ok(photos)
    }

    async fn store_blobs(
        &self,
        filename: &str,
        original: &[u8],
        derived: &DerivedImages,
    ) -> PhotoResult<StoredBlobs> {
        let image = self.media.write(UPLOADS_DIR, filename, original).await?;

        let cropped_image = match self.media.write(UPLOADS_DIR, filename, &derived.cropped).await {
            Ok(path) => path,
            Err(err) => {
                self.remove_blobs(&[image.as_str()]).await;
                return Err(err.into());
            }
        };

        let webp_image = match self
            .media
            .write(UPLOADS_DIR, &derived.alternate_name, &derived.alternate)
            .await
        {
            Ok(path) => path,
            Err(err) => {
                self.remove_blobs(&[image.as_str(), cropped_image.as_str()])
                    .await;
                return Err(err.into());
            }
        };

        Ok(StoredBlobs {
            image,
            cropped_image,
            webp_image,
        })
    }

    async fn remove_blobs(&self, blobs: &[&str]) {
        for blob in blobs {
            if let Err(err) = self.media.remove(blob).await {
                warn!("failed to remove blob {}: {}", blob, err);
            }
        }
    }
}

fn validate_title(title: &str) -> PhotoResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PhotoError::Validation("Title may not be blank".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(PhotoError::Validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

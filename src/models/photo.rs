//! A photo uploaded by an owner, with its two derived blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored photo.
///
/// Blob columns hold paths relative to the media root
/// (e.g. `uploads/sunset.jpg`), never absolute paths.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Photo {
    /// Autoincrement identifier.
    pub id: i64,

    /// Free-text title, at most 100 characters.
    pub title: String,

    /// Owner (`users.id`). Edit permission is decided by equality on this.
    pub creator_id: i64,

    /// The original upload.
    pub image: String,

    /// Re-encoded copy in the upload's own format, same dimensions.
    pub cropped_image: String,

    /// Re-encoded copy in WebP.
    pub webp_image: String,

    /// Upload time.
    pub created_at: DateTime<Utc>,

    /// Retrieval counter.
    pub views: i64,
}

impl Photo {
    /// Relative paths of every blob belonging to this photo.
    pub fn blobs(&self) -> [&str; 3] {
        [&self.image, &self.cropped_image, &self.webp_image]
    }
}

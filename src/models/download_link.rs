//! A persisted pointer to a generated movie file.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::Path;

/// Download link for a rendered movie.
///
/// `file_path` is unique across all links; rows are never mutated.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct DownloadLink {
    pub id: i64,

    /// Display name sent in `Content-Disposition`, e.g. `movie_1.webm`.
    pub file_name: String,

    /// Absolute path of the movie on disk.
    pub file_path: String,
}

impl DownloadLink {
    pub fn path(&self) -> &Path {
        Path::new(&self.file_path)
    }
}

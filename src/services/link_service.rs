//! src/services/link_service.rs
//!
//! LinkService: issues and resolves download links for rendered movies.
//!
//! A link is allocated before its movie is rendered: the file name is
//! claimed on disk right away (see `MediaStore::reserve`), then the row is
//! inserted. Links never expire and may be downloaded any number of times.

use crate::{
    models::download_link::DownloadLink,
    services::media_store::{MediaError, MediaStore, VIDEOS_DIR, remove_if_exists},
};
use sqlx::SqlitePool;
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::fs::File;
use tracing::{info, warn};

/// Base name every movie file is derived from.
pub const MOVIE_FILE_NAME: &str = "movie.webm";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("download link {0} not found")]
    NotFound(i64),
    #[error("file for download link {0} is missing")]
    FileMissing(i64),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type LinkResult<T> = Result<T, LinkError>;

#[derive(Clone)]
pub struct LinkService {
    db: Arc<SqlitePool>,
    media: MediaStore,
}

impl LinkService {
    pub fn new(db: Arc<SqlitePool>, media: MediaStore) -> Self {
        Self { db, media }
    }

    /// Claim a fresh movie path under `videos/` and persist a link to it.
    pub async fn allocate(&self) -> LinkResult<DownloadLink> {
        let reserved = self.media.reserve(VIDEOS_DIR, MOVIE_FILE_NAME).await?;
        let file_path = reserved.absolute.to_string_lossy().into_owned();
        let file_name = reserved.file_name().to_string();

        let inserted = sqlx::query_as::<_, DownloadLink>(
            "INSERT INTO download_links (file_name, file_path) VALUES (?, ?)
             RETURNING id, file_name, file_path",
        )
        .bind(&file_name)
        .bind(&file_path)
        .fetch_one(&*self.db)
        .await;

        match inserted {
            Ok(link) => {
                info!(link_id = link.id, path = %link.file_path, "download link allocated");
                Ok(link)
            }
            Err(err) => {
                let _ = remove_if_exists(&reserved.absolute).await;
                Err(LinkError::Sqlx(err))
            }
        }
    }

    pub async fn get(&self, id: i64) -> LinkResult<DownloadLink> {
        sqlx::query_as::<_, DownloadLink>(
            "SELECT id, file_name, file_path FROM download_links WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(LinkError::NotFound(id))
    }

    /// Resolve a link to its metadata and an open handle on the movie.
    pub async fn open(&self, id: i64) -> LinkResult<(DownloadLink, File)> {
        let link = self.get(id).await?;
        let file = File::open(link.path()).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                LinkError::FileMissing(id)
            } else {
                LinkError::Io(err)
            }
        })?;
        Ok((link, file))
    }

    /// Drop a link and its file, e.g. after the movie failed to render.
    pub async fn discard(&self, link: &DownloadLink) -> LinkResult<()> {
        sqlx::query("DELETE FROM download_links WHERE id = ?")
            .bind(link.id)
            .execute(&*self.db)
            .await?;

        if let Err(err) = remove_if_exists(link.path()).await {
            warn!(link_id = link.id, "could not remove movie file: {}", err);
        }
        Ok(())
    }
}

//! Shared application state handed to every handler.

use crate::services::{
    link_service::LinkService,
    media_store::MediaStore,
    movie_service::{MovieAssembler, VideoEncoder},
    photo_service::{PhotoService, UploadPolicy},
    user_service::UserService,
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
    pub media: MediaStore,
    pub photos: PhotoService,
    pub links: LinkService,
    pub movies: MovieAssembler,
    pub users: UserService,
    /// Prefix for absolute URLs in responses; falls back to the `Host` header.
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(
        db: Arc<SqlitePool>,
        media: MediaStore,
        policy: UploadPolicy,
        encoder: Arc<dyn VideoEncoder>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            photos: PhotoService::new(db.clone(), media.clone(), policy),
            links: LinkService::new(db.clone(), media.clone()),
            movies: MovieAssembler::new(encoder),
            users: UserService::new(db.clone()),
            db,
            media,
            public_base_url,
        }
    }
}

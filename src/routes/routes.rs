//! Defines routes for the photo album API.
//!
//! ## Structure
//! - **Photos** (`/api/v1/albums/`)
//!   - `GET    /albums/`                  - list photos
//!   - `POST   /albums/`                  - upload a photo (multipart)
//!   - `GET    /albums/{id}/`             - retrieve a photo, counts a view
//!   - `PUT    /albums/{id}/`             - replace the title (owner only, title required)
//!   - `PATCH  /albums/{id}/`             - partial update (owner only)
//!   - `DELETE /albums/{id}/`             - delete photo and blobs (owner only)
//!   - `POST   /albums/make_movie/`       - movie of the top photos
//!   - `POST   /albums/make_user_movie/`  - movie of the caller's top photos
//!
//! - **Downloads**
//!   - `GET    /api/v1/downloads/{id}/`   - rendered movie as attachment
//!
//! - **Static**: `/media/uploads/*` serves uploaded images. Rendered movies
//!   are only reachable through `/downloads/{id}/`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        movie_handlers::{download_movie, make_movie, make_user_movie},
        photo_handlers::{
            create_photo, delete_photo, get_photo, list_photos, replace_photo, update_photo,
        },
    },
    services::media_store::UPLOADS_DIR,
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::path::Path;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub const API_PREFIX: &str = "/api/v1";

/// Room for multipart boundaries and the title field on top of the image.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the router.
///
/// `max_upload_bytes` sizes the request body limit; uploads larger than the
/// limit itself are still rejected by the upload policy with a clear message
/// as long as they fit in the framing headroom.
pub fn routes(max_upload_bytes: usize, media_root: &Path) -> Router<AppState> {
    let api = Router::new()
        .route("/albums/", get(list_photos).post(create_photo))
        .route("/albums/make_movie/", post(make_movie))
        .route("/albums/make_user_movie/", post(make_user_movie))
        .route(
            "/albums/{id}/",
            get(get_photo)
                .put(replace_photo)
                .patch(update_photo)
                .delete(delete_photo),
        )
        .route("/downloads/{id}/", get(download_movie))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
        ));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest(API_PREFIX, api)
        .nest_service("/media/uploads", ServeDir::new(media_root.join(UPLOADS_DIR)))
        .layer(TraceLayer::new_for_http())
}

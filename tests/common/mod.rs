//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use photo_album::{
    db,
    models::user::User,
    routes,
    services::{
        media_store::MediaStore,
        movie_service::{MovieError, MovieResult, VideoEncoder},
        photo_service::UploadPolicy,
    },
    state::AppState,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{io::Cursor, path::Path, sync::Arc};
use tempfile::TempDir;

pub const FAKE_MOVIE: &[u8] = b"\x1a\x45\xdf\xa3 not really a webm";
pub const BOUNDARY: &str = "photo-album-test-boundary";

/// Writes a fixed payload instead of running ffmpeg.
pub struct StubEncoder;

#[async_trait]
impl VideoEncoder for StubEncoder {
    async fn encode(&self, _frames_dir: &Path, _frame_count: usize, output: &Path) -> MovieResult<()> {
        tokio::fs::write(output, FAKE_MOVIE).await?;
        Ok(())
    }
}

pub struct BrokenEncoder;

#[async_trait]
impl VideoEncoder for BrokenEncoder {
    async fn encode(&self, _frames_dir: &Path, _frame_count: usize, _output: &Path) -> MovieResult<()> {
        Err(MovieError::Encoder("exit status: 1".into()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with(1024 * 1024, Arc::new(StubEncoder)).await
    }

    pub async fn with(max_bytes: usize, encoder: Arc<dyn VideoEncoder>) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();

        let media = tempfile::tempdir().unwrap();
        let state = AppState::new(
            Arc::new(pool),
            MediaStore::new(media.path()),
            UploadPolicy {
                accepted_mime_types: vec!["image/jpeg".into(), "image/png".into()],
                max_bytes,
            },
            encoder,
            None,
        );
        let router = routes::routes::routes(max_bytes, media.path()).with_state(state.clone());

        Self {
            router,
            state,
            media,
        }
    }

    pub async fn user(&self, name: &str) -> User {
        self.state
            .users
            .create(name, &format!("{}@site.com", name))
            .await
            .unwrap()
    }

    pub fn media_path(&self, relative: &str) -> std::path::PathBuf {
        self.media.path().join(relative)
    }
}

pub fn encoded_image(format: ImageFormat) -> Vec<u8> {
    let img = ImageBuffer::from_fn(48, 32, |x, y| Rgb([(x * 5) as u8, (y * 7) as u8, 200u8]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn auth(token: &str) -> String {
    format!("Token {}", token)
}

pub fn upload_request(token: &str, filename: &str, bytes: &[u8], title: &str) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{t}\r\n",
            b = BOUNDARY,
            t = title
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            b = BOUNDARY,
            f = filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/albums/")
        .header(header::AUTHORIZATION, auth(token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "testserver");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, auth(token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, token: &str, json: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, auth(token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

//! Slideshow movie assembly.
//!
//! Every input image becomes one 800x600 frame shown for one second. Frames
//! are rendered to PNG in a scratch directory and handed to a
//! `VideoEncoder`, which writes a WebM at 24 fps; the encoder repeats each
//! still to fill its second.

use crate::services::media_store::remove_if_exists;
use async_trait::async_trait;
use image::{DynamicImage, ImageError, RgbImage, imageops, imageops::FilterType};
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const FRAME_WIDTH: u32 = 800;
pub const FRAME_HEIGHT: u32 = 600;
pub const OUTPUT_FPS: u32 = 24;

/// printf-style pattern of frame files inside the scratch directory.
pub const FRAME_PATTERN: &str = "frame_%05d.png";

#[derive(Debug, Error)]
pub enum MovieError {
    #[error("no images to assemble")]
    Empty,
    #[error("failed to prepare frame from {path}: {source}")]
    Frame {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
    #[error("ffmpeg binary not found; set PHOTO_ALBUM_FFMPEG_PATH or install ffmpeg")]
    EncoderMissing,
    #[error("video encoder failed: {0}")]
    Encoder(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("frame preparation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type MovieResult<T> = Result<T, MovieError>;

/// Turns a directory of numbered frames into a video file.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode `frame_count` frames named after `FRAME_PATTERN` in `frames_dir`
    /// into `output`, one second per frame.
    async fn encode(&self, frames_dir: &Path, frame_count: usize, output: &Path) -> MovieResult<()>;
}

/// `VideoEncoder` backed by the ffmpeg command line tool.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: Option<PathBuf>,
}

impl FfmpegEncoder {
    /// Use `configured` when given, otherwise look ffmpeg up on `PATH`.
    /// A missing binary is reported at encode time, not here.
    pub fn locate(configured: Option<&Path>) -> Self {
        let binary = configured
            .map(Path::to_path_buf)
            .or_else(|| which::which("ffmpeg").ok());

        match &binary {
            Some(path) => info!("Using ffmpeg at {}", path.display()),
            None => warn!("ffmpeg not found on PATH; movie requests will fail"),
        }

        Self { binary }
    }

    /// Arguments for one encode: stills read at 1 fps, output resampled to
    /// `OUTPUT_FPS`, VP8 in WebM.
    pub fn build_args(frames_dir: &Path, frame_count: usize, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-framerate".into(),
            "1".into(),
            "-i".into(),
            frames_dir.join(FRAME_PATTERN).to_string_lossy().into_owned(),
            "-t".into(),
            frame_count.to_string(),
            "-r".into(),
            OUTPUT_FPS.to_string(),
            "-c:v".into(),
            "libvpx".into(),
            "-b:v".into(),
            "2M".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-an".into(),
            "-f".into(),
            "webm".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, frames_dir: &Path, frame_count: usize, output: &Path) -> MovieResult<()> {
        let binary = self.binary.as_ref().ok_or(MovieError::EncoderMissing)?;
        let args = Self::build_args(frames_dir, frame_count, output);
        debug!("Running {} {}", binary.display(), args.join(" "));

        let result = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(MovieError::Encoder(format!(
                "{} ({})",
                result.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct MovieAssembler {
    encoder: Arc<dyn VideoEncoder>,
}

impl MovieAssembler {
    pub fn new(encoder: Arc<dyn VideoEncoder>) -> Self {
        Self { encoder }
    }

    /// Render `images`, in order, into a movie at `output`.
    ///
    /// Any failing image or a failing encode aborts the whole movie and
    /// removes `output`; callers must not pass an empty list.
    pub async fn assemble(&self, images: &[PathBuf], output: &Path) -> MovieResult<()> {
        if images.is_empty() {
            return Err(MovieError::Empty);
        }

        let result = self.render(images, output).await;
        match &result {
            Ok(()) => info!(
                frames = images.len(),
                output = %output.display(),
                "movie assembled"
            ),
            Err(err) => {
                warn!(output = %output.display(), "movie assembly failed: {}", err);
                if let Err(cleanup) = remove_if_exists(output).await {
                    warn!("could not remove partial movie {}: {}", output.display(), cleanup);
                }
            }
        }
        result
    }

    async fn render(&self, images: &[PathBuf], output: &Path) -> MovieResult<()> {
        let frames_dir = tempfile::Builder::new()
            .prefix("movie-frames-")
            .tempdir()?;

        let sources = images.to_vec();
        let dir = frames_dir.path().to_path_buf();
        tokio::task::spawn_blocking(move || write_frames(&sources, &dir)).await??;

        self.encoder
            .encode(frames_dir.path(), images.len(), output)
            .await
    }
}

/// Write one normalized PNG per source into `dir`, numbered from zero.
pub fn write_frames(sources: &[PathBuf], dir: &Path) -> MovieResult<()> {
    for (index, path) in sources.iter().enumerate() {
        let frame_error = |source| MovieError::Frame {
            path: path.clone(),
            source,
        };

        let image = image::open(path).map_err(frame_error)?;
        normalize_frame(&image)
            .save(dir.join(format!("frame_{:05}.png", index)))
            .map_err(frame_error)?;
    }
    Ok(())
}

/// Fit `image` inside the frame, keeping its aspect ratio, and center it on
/// a black 800x600 canvas.
pub fn normalize_frame(image: &DynamicImage) -> RgbImage {
    let fitted = image
        .resize(FRAME_WIDTH, FRAME_HEIGHT, FilterType::Lanczos3)
        .to_rgb8();

    let mut canvas = RgbImage::new(FRAME_WIDTH, FRAME_HEIGHT);
    let x = (FRAME_WIDTH - fitted.width().min(FRAME_WIDTH)) / 2;
    let y = (FRAME_HEIGHT - fitted.height().min(FRAME_HEIGHT)) / 2;
    imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);
    canvas
}

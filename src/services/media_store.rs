//! src/services/media_store.rs
//!
//! MediaStore: on-disk home for uploaded blobs (`uploads/`) and rendered
//! movies (`videos/`) beneath one media root. The root is made absolute
//! on construction; photo rows hold paths relative to it.
//!
//! Name allocation claims files with an exclusive create, so two concurrent
//! callers asking for `movie.webm` can never end up with the same path:
//! the loser of the race simply moves on to `movie_1.webm`.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

pub const UPLOADS_DIR: &str = "uploads";
pub const VIDEOS_DIR: &str = "videos";
pub const MEDIA_URL_PREFIX: &str = "/media/";

const MAX_NAME_ATTEMPTS: u32 = 10_000;
const MAX_FILE_NAME_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid file name `{0}`")]
    InvalidName(String),
    #[error("no free file name left for `{0}`")]
    NamesExhausted(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// A file name that has been claimed on disk (the file exists and is empty).
#[derive(Debug)]
pub struct Reserved {
    /// Path relative to the media root, `/`-separated.
    pub relative: String,
    /// Absolute path on disk.
    pub absolute: PathBuf,
    file: File,
}

impl Reserved {
    /// The final path component, e.g. `movie_2.webm`.
    pub fn file_name(&self) -> &str {
        self.relative
            .rsplit('/')
            .next()
            .unwrap_or(self.relative.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// A relative `root` is resolved against the current directory once,
    /// here, so later paths do not depend on where the process runs from.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Claim the first free variant of `name` inside `dir`, creating `dir`
    /// when it does not exist yet.
    ///
    /// Candidates are tried in order: `name`, `stem_1.ext`, `stem_2.ext`, ...
    pub async fn reserve(&self, dir: &str, name: &str) -> MediaResult<Reserved> {
        let name = sanitize_file_name(name)?;
        let dir_path = self.root.join(dir);
        fs::create_dir_all(&dir_path).await?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = numbered_name(&name, attempt);
            let absolute = dir_path.join(&candidate);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&absolute)
                .await
            {
                Ok(file) => {
                    debug!("reserved {}", absolute.display());
                    return Ok(Reserved {
                        relative: format!("{}/{}", dir, candidate),
                        absolute,
                        file,
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(MediaError::Io(err)),
            }
        }

        Err(MediaError::NamesExhausted(name))
    }

    /// Store `bytes` under a free variant of `name` and return its relative path.
    pub async fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> MediaResult<String> {
        let mut reserved = self.reserve(dir, name).await?;

        let written = async {
            reserved.file.write_all(bytes).await?;
            reserved.file.flush().await?;
            reserved.file.sync_all().await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&reserved.absolute).await;
            return Err(MediaError::Io(err));
        }

        Ok(reserved.relative)
    }

    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Delete a blob by relative path. A missing file is not an error.
    pub async fn remove(&self, relative: &str) -> MediaResult<()> {
        remove_if_exists(&self.absolute(relative)).await
    }

    /// Public URL for a relative blob path.
    pub fn url_for(relative: &str) -> String {
        format!("{}{}", MEDIA_URL_PREFIX, relative)
    }
}

/// Remove `path`, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> MediaResult<()> {
    match fs::remove_file(path).await {
        Ok(_) => {
            debug!("removed file {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("file {} already missing", path.display());
            Ok(())
        }
        Err(err) => Err(MediaError::Io(err)),
    }
}

/// Reduce an uploaded file name to a safe single path component.
///
/// Directory parts are dropped, spaces become underscores and anything that
/// is not alphanumeric (in any script) or one of `._-` is discarded. A name
/// whose stem disappears entirely gets a generated stem and keeps its
/// extension.
pub fn sanitize_file_name(name: &str) -> MediaResult<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let sanitized = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => {
            let stem = stem.trim_start_matches('.');
            if stem.is_empty() {
                format!("{}.{}", Uuid::new_v4().simple(), ext)
            } else {
                format!("{}.{}", stem, ext)
            }
        }
        _ => cleaned.trim_matches('.').to_string(),
    };

    if sanitized.is_empty() || sanitized.chars().count() > MAX_FILE_NAME_LEN {
        return Err(MediaError::InvalidName(name.to_string()));
    }

    Ok(sanitized)
}

fn numbered_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, attempt, ext),
        _ => format!("{}_{}", name, attempt),
    }
}

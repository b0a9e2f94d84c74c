use crate::services::notification_service::SmtpTls;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

const ENV_PREFIX: &str = "PHOTO_ALBUM_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub media_root: String,
    pub database_url: String,
    pub accepted_mime_types: Vec<String>,
    pub max_upload_bytes: usize,
    /// Base for absolute link URLs; the request `Host` header is used when unset.
    pub public_base_url: Option<String>,
    pub ffmpeg_path: Option<PathBuf>,
    pub smtp: Option<SmtpConfig>,
    pub mail_from: String,
    /// Body of the best-photo notification mail.
    pub notification_text: String,
    /// Zero disables the dispatcher.
    pub notification_interval_secs: u64,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub username: Option<String>,
    pub password: Option<String>,
}

// The config is logged at startup; keep the password out of it.
impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// What the process should do once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupAction {
    Serve,
    Migrate,
    Seed,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Photo album API")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_ALBUM_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_ALBUM_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding uploads and rendered movies (overrides PHOTO_ALBUM_MEDIA_ROOT)
    #[arg(long)]
    pub media_root: Option<String>,

    /// Database URL (overrides PHOTO_ALBUM_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Path to the ffmpeg binary (overrides PHOTO_ALBUM_FFMPEG_PATH)
    #[arg(long)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "seed")]
    pub migrate: bool,

    /// Create sample owners and a sample photo, then exit
    #[arg(long)]
    pub seed: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the startup action.
    pub fn from_env_and_args() -> Result<(Self, StartupAction)> {
        let args = Args::parse();
        let action = if args.migrate {
            StartupAction::Migrate
        } else if args.seed {
            StartupAction::Seed
        } else {
            StartupAction::Serve
        };
        Ok((Self::from_env_with(args)?, action))
    }

    /// Merge `args` over the environment over built-in defaults.
    pub fn from_env_with(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env_string("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = env_parse("PORT", 3000u16)?;
        let env_media = env_string("MEDIA_ROOT").unwrap_or_else(|| "./data/media".into());
        let env_db = env_string("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://./data/meta/photo_album.db".into());
        let env_ffmpeg = env_string("FFMPEG_PATH").map(PathBuf::from);

        let accepted_mime_types = env_string("ACCEPTED_MIME_TYPES")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|| vec!["image/jpeg".into(), "image/png".into()]);
        if accepted_mime_types.is_empty() {
            anyhow::bail!("{}ACCEPTED_MIME_TYPES must list at least one type", ENV_PREFIX);
        }

        let smtp = match env_string("SMTP_HOST") {
            Some(host) => {
                let tls = smtp_tls(env_string("SMTP_TLS").as_deref())?;
                Some(SmtpConfig {
                    host,
                    port: env_parse("SMTP_PORT", tls.default_port())?,
                    tls,
                    username: env_string("SMTP_USERNAME"),
                    password: env_string("SMTP_PASSWORD"),
                })
            }
            None => None,
        };

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            media_root: args.media_root.unwrap_or(env_media),
            database_url: args.database_url.unwrap_or(env_db),
            accepted_mime_types,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", 5 * 1024 * 1024usize)?,
            public_base_url: env_string("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            ffmpeg_path: args.ffmpeg_path.or(env_ffmpeg),
            smtp,
            mail_from: env_string("MAIL_FROM").unwrap_or_else(|| "album@localhost".into()),
            notification_text: env_string("NOTIFICATION_TEXT").unwrap_or_default(),
            notification_interval_secs: env_parse("NOTIFICATION_INTERVAL_SECS", 86_400u64)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn notification_interval(&self) -> Option<Duration> {
        (self.notification_interval_secs > 0)
            .then(|| Duration::from_secs(self.notification_interval_secs))
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, key))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let name = format!("{}{}", ENV_PREFIX, key);
    match env::var(&name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

/// `none`, `starttls` (default) or `tls`.
fn smtp_tls(raw: Option<&str>) -> Result<SmtpTls> {
    match raw {
        None => Ok(SmtpTls::StartTls),
        Some(value) => SmtpTls::parse(value).with_context(|| {
            format!(
                "{}SMTP_TLS must be one of none, starttls, tls (got `{}`)",
                ENV_PREFIX, value
            )
        }),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

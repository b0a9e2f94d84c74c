use anyhow::Result;
use axum::Router;
use photo_album::{
    config::{AppConfig, StartupAction},
    db, routes, seed,
    services::{
        media_store::MediaStore,
        movie_service::FfmpegEncoder,
        notification_service::{LogMailer, Mailer, NotificationDispatcher, SmtpMailer},
        photo_service::UploadPolicy,
    },
    state::AppState,
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + startup action ---
    let (cfg, action) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting photo-album with config: {:?}", cfg);

    // --- Ensure media directory exists ---
    if !Path::new(&cfg.media_root).exists() {
        fs::create_dir_all(&cfg.media_root)?;
        tracing::info!("Created media directory at {}", cfg.media_root);
    }

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle one-shot modes ---
    if action == StartupAction::Migrate {
        db::run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    let state = AppState::new(
        db.clone(),
        MediaStore::new(&cfg.media_root),
        UploadPolicy {
            accepted_mime_types: cfg.accepted_mime_types.clone(),
            max_bytes: cfg.max_upload_bytes,
        },
        Arc::new(FfmpegEncoder::locate(cfg.ffmpeg_path.as_deref())),
        cfg.public_base_url.clone(),
    );

    if action == StartupAction::Seed {
        db::run_migrations(&db).await?;
        seed::seed(&state).await?;
        tracing::info!("Initial data created.");
        return Ok(());
    }

    // --- Background notification dispatcher ---
    match cfg.notification_interval() {
        Some(every) => {
            let mailer: Arc<dyn Mailer> = match &cfg.smtp {
                Some(smtp) => Arc::new(SmtpMailer::new(
                    &smtp.host,
                    smtp.port,
                    smtp.tls,
                    smtp.username.clone().zip(smtp.password.clone()),
                )?),
                None => Arc::new(LogMailer),
            };
            let dispatcher = NotificationDispatcher::new(
                state.photos.clone(),
                state.users.clone(),
                mailer,
                cfg.mail_from.clone(),
                cfg.notification_text.clone(),
            );
            tokio::spawn(dispatcher.run(every));
        }
        None => tracing::info!("Notification dispatcher disabled"),
    }

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes, Path::new(&cfg.media_root))
        .with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

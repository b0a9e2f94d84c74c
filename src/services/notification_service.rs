//! Periodic "best photos" notification mail.
//!
//! One dispatch reads the configured message, looks up the owners of the
//! current global top three photos and, if there is anyone to tell, sends
//! them a single multi-part (plain + HTML) mail addressed to all of them.

use crate::services::{
    photo_service::{PhotoError, PhotoService},
    user_service::{UserError, UserService},
};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

pub const NOTIFICATION_SUBJECT: &str = "New notification!";
/// How many of the top photos have their owners notified.
pub const NOTIFIED_TOP_PHOTOS: usize = 3;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid mail address `{address}`: {source}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("failed to build mail: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("failed to send mail: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error(transparent)]
    Photos(#[from] PhotoError),
    #[error(transparent)]
    Users(#[from] UserError),
}

pub type NotifyResult<T> = Result<T, NotifyError>;

/// A rendered mail ready for a `Mailer`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> NotifyResult<()>;
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpTls {
    /// Plaintext; only for local relays.
    None,
    /// Plain connect, then mandatory `STARTTLS`.
    StartTls,
    /// TLS from the first byte (SMTPS).
    Tls,
}

impl SmtpTls {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "plain" => Some(Self::None),
            "starttls" => Some(Self::StartTls),
            "tls" | "smtps" => Some(Self::Tls),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::StartTls => 587,
            Self::Tls => 465,
        }
    }
}

/// SMTP delivery through lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Relay on `host:port` secured per `tls`, with optional login.
    pub fn new(
        host: &str,
        port: u16,
        tls: SmtpTls,
        credentials: Option<(String, String)>,
    ) -> NotifyResult<Self> {
        let mut builder = match tls {
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?,
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host)?,
        }
        .port(port);
        if let Some((user, password)) = credentials {
            builder = builder.credentials(Credentials::new(user, password));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> NotifyResult<()> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&mail.from)?)
            .subject(mail.subject);
        for recipient in &mail.to {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        let message =
            builder.multipart(MultiPart::alternative_plain_html(mail.text_body, mail.html_body))?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// Logs mail instead of sending it; used when no SMTP host is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> NotifyResult<()> {
        info!(
            to = %mail.to.join(", "),
            subject = %mail.subject,
            "SMTP not configured, mail not delivered:\n{}",
            mail.text_body
        );
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> NotifyResult<Mailbox> {
    address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    photos: PhotoService,
    users: UserService,
    mailer: Arc<dyn Mailer>,
    from: String,
    message: String,
}

impl NotificationDispatcher {
    /// `message` is the administrator-configured notification text.
    pub fn new(
        photos: PhotoService,
        users: UserService,
        mailer: Arc<dyn Mailer>,
        from: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            photos,
            users,
            mailer,
            from: from.into(),
            message: message.into(),
        }
    }

    /// Run one dispatch. Returns whether a mail went out.
    pub async fn dispatch(&self) -> NotifyResult<bool> {
        let top = self.photos.top_photos(None, NOTIFIED_TOP_PHOTOS).await?;
        let owner_ids: Vec<i64> = top.iter().map(|photo| photo.creator_id).collect();
        let recipients = self.users.emails_for(&owner_ids).await?;

        if recipients.is_empty() {
            return Ok(false);
        }

        let mail = OutgoingMail {
            from: self.from.clone(),
            to: recipients,
            subject: NOTIFICATION_SUBJECT.to_string(),
            text_body: render_text(&self.message),
            html_body: render_html(&self.message),
        };
        let count = mail.to.len();
        self.mailer.send(mail).await?;

        info!(recipients = count, "best photo notification sent");
        Ok(true)
    }

    /// Dispatch every `every`, forever. Failures are logged and the loop
    /// carries on with the next tick.
    pub async fn run(self, every: Duration) {
        info!("Starting notification dispatcher (interval: {:?})", every);

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = self.dispatch().await {
                error!("Notification dispatch error: {}", e);
            }
        }
    }
}

fn render_text(message: &str) -> String {
    format!(
        "Hello!\n\nOne of your photos is among the most viewed ones right now.\n\n{}\n",
        message
    )
}

fn render_html(message: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>",
            "<html><body>",
            "<h1>Hello!</h1>",
            "<p>One of your photos is among the most viewed ones right now.</p>",
            "<p>{}</p>",
            "</body></html>"
        ),
        html_escape(message).replace('\n', "<br>")
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

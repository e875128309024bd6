//! Publishing of newly discovered entries.
//!
//! The [`engine`] walks unpublished entries in a stable order and hands each
//! one to a [`Publisher`]. [`twitter`] implements the trait against the
//! Twitter API using [`oauth`] signing and [`credentials`] loaded from the
//! store.

pub mod credentials;
pub mod engine;
pub mod oauth;
pub mod twitter;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::{Database, DatabaseError, Entry};
use crate::util::compose_status;

pub use credentials::{import_credentials, CredentialError, TwitterCredentials};
pub use engine::{PublishEngine, PublishOptions, PublishReport};
pub use twitter::{TwitterEndpoints, TwitterPublisher};

/// A status ready to be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    /// URL of an image to attach
    pub image: Option<String>,
}

impl Message {
    pub fn for_entry(entry: &Entry) -> Self {
        Self {
            text: compose_status(&entry.title, entry.link.as_deref()),
            image: entry.image.clone(),
        }
    }
}

/// Failure to publish a single message.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    Response(String),

    #[error("Publish timed out")]
    Timeout,

    #[error("Request signing failed: {0}")]
    Signing(#[from] oauth::OAuthError),
}

/// Fatal errors for a publish run.
#[derive(Debug, Error)]
pub enum PublishRunError {
    #[error(transparent)]
    Configuration(#[from] CredentialError),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Destination for published messages.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &Message) -> Result<(), PublishError>;
}

/// Loads credentials, builds the publisher, and publishes every pending entry.
///
/// Credentials are checked before `make_publisher` runs, so missing keys
/// fail the run without any publish attempt.
pub async fn run_publish<P, F>(
    db: &Database,
    options: PublishOptions,
    make_publisher: F,
) -> Result<PublishReport, PublishRunError>
where
    P: Publisher,
    F: FnOnce(TwitterCredentials) -> P,
{
    let credentials = TwitterCredentials::load(db).await?;
    let engine = PublishEngine::new(make_publisher(credentials), options);
    Ok(engine.run(db).await?)
}

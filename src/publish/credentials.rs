use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::oauth::OAuthKeys;
use crate::storage::{Database, DatabaseError};

/// Settings category holding the Twitter credentials.
pub const CATEGORY: &str = "twitter";

const REQUIRED_KEYS: [&str; 4] = [
    "consumer_key",
    "consumer_secret",
    "access_token_key",
    "access_token_secret",
];

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Missing Twitter credentials: {}. Run `feedbird import-credentials <file>` first.", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Malformed credentials file: {0}")]
    Malformed(String),

    #[error("Failed to read credentials file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in credentials file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// OAuth 1.0a user-context credentials for the Twitter API.
pub struct TwitterCredentials {
    consumer_key: SecretString,
    consumer_secret: SecretString,
    access_token_key: SecretString,
    access_token_secret: SecretString,
}

impl std::fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterCredentials")
            .field("consumer_key", &"[REDACTED]")
            .field("consumer_secret", &"[REDACTED]")
            .field("access_token_key", &"[REDACTED]")
            .field("access_token_secret", &"[REDACTED]")
            .finish()
    }
}

impl TwitterCredentials {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token_key: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: SecretString::from(consumer_key.into()),
            consumer_secret: SecretString::from(consumer_secret.into()),
            access_token_key: SecretString::from(access_token_key.into()),
            access_token_secret: SecretString::from(access_token_secret.into()),
        }
    }

    /// Builds credentials from a settings map.
    ///
    /// Every required key that is absent or blank is reported at once.
    pub fn from_settings(settings: &BTreeMap<String, String>) -> Result<Self, CredentialError> {
        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| settings.get(**key).map_or(true, |v| v.trim().is_empty()))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CredentialError::Missing(missing));
        }

        let value = |key: &str| settings.get(key).map(String::as_str).unwrap_or_default();
        Ok(Self::new(
            value("consumer_key"),
            value("consumer_secret"),
            value("access_token_key"),
            value("access_token_secret"),
        ))
    }

    /// Loads credentials stored under [`CATEGORY`].
    pub async fn load(db: &Database) -> Result<Self, CredentialError> {
        let settings = db.get_settings(CATEGORY).await?;
        Self::from_settings(&settings)
    }

    pub(crate) fn oauth_keys(&self) -> OAuthKeys<'_> {
        OAuthKeys {
            consumer_key: self.consumer_key.expose_secret(),
            consumer_secret: self.consumer_secret.expose_secret(),
            token: self.access_token_key.expose_secret(),
            token_secret: self.access_token_secret.expose_secret(),
        }
    }
}

/// Imports a JSON object of credentials into the store under [`CATEGORY`].
///
/// String values are stored as-is; any other JSON value is stored as its
/// JSON text. Returns the number of keys written.
pub async fn import_credentials(db: &Database, path: &Path) -> Result<usize, CredentialError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let settings = parse_credentials(&content)?;
    db.put_settings(CATEGORY, &settings).await?;

    tracing::info!(path = %path.display(), keys = settings.len(), "Imported credentials");
    Ok(settings.len())
}

fn parse_credentials(content: &str) -> Result<BTreeMap<String, String>, CredentialError> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let serde_json::Value::Object(object) = value else {
        return Err(CredentialError::Malformed(
            "expected a JSON object of key/value pairs".to_string(),
        ));
    };

    Ok(object
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

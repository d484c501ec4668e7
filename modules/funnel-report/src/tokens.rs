use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use listok_client::{HttpTransport, OAuthClient};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::preview;
use crate::traits::TokenProvider;

/// A pre-issued access token, used as-is.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Trades a refresh token for an access token on first use and keeps it.
///
/// The CRM rotates refresh tokens: once the grant succeeds the token this
/// was built with is spent, and the replacement is only available from
/// [`RefreshingToken::rotated_refresh_token`].
pub struct RefreshingToken<T> {
    oauth: OAuthClient<T>,
    refresh_token: String,
    grant: Mutex<Option<Grant>>,
}

struct Grant {
    access_token: String,
    refresh_token: Option<String>,
}

impl<T: HttpTransport> RefreshingToken<T> {
    pub fn new(oauth: OAuthClient<T>, refresh_token: impl Into<String>) -> Self {
        Self {
            oauth,
            refresh_token: refresh_token.into(),
            grant: Mutex::new(None),
        }
    }

    /// The refresh token issued by the grant, when it differs from the one
    /// this provider started with. `None` before the first grant.
    pub async fn rotated_refresh_token(&self) -> Option<String> {
        self.grant
            .lock()
            .await
            .as_ref()
            .and_then(|grant| grant.refresh_token.clone())
            .filter(|issued| *issued != self.refresh_token)
    }

    /// Write the rotated refresh token to `file`. Returns whether anything
    /// was written.
    pub async fn save_rotation(&self, file: &TokenFile) -> Result<bool> {
        let Some(rotated) = self.rotated_refresh_token().await else {
            return Ok(false);
        };
        file.store(&rotated).await?;
        info!(
            path = %file.path().display(),
            token = %preview(&rotated),
            "Rotated refresh token saved"
        );
        Ok(true)
    }
}

#[async_trait]
impl<T: HttpTransport> TokenProvider for RefreshingToken<T> {
    async fn access_token(&self) -> Result<String> {
        let mut grant = self.grant.lock().await;
        if let Some(grant) = grant.as_ref() {
            return Ok(grant.access_token.clone());
        }
        let pair = self
            .oauth
            .refresh(&self.refresh_token)
            .await
            .context("Refresh token grant failed")?;
        let access_token = pair.access_token.clone();
        *grant = Some(Grant {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token.filter(|t| !t.trim().is_empty()),
        });
        Ok(access_token)
    }
}

/// A file holding the current refresh token, one line, nothing else.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token. A missing or blank file reads as `None`.
    pub async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let token = raw.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read token file {}", self.path.display())),
        }
    }

    /// Replace the stored token. Written beside the target and renamed over
    /// it, so a crash never leaves a truncated token behind.
    pub async fn store(&self, token: &str) -> Result<()> {
        let staging = self.path.with_extension("tmp");
        tokio::fs::write(&staging, format!("{token}\n"))
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("Failed to replace token file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listok_client::testing::ScriptedTransport;
    use listok_client::{OAuthCredentials, RetryPolicy, RetryingClient};

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.access_token().await.unwrap(), "abc");
    }

    fn provider(status: u16, body: &str) -> RefreshingToken<ScriptedTransport> {
        let transport =
            ScriptedTransport::new().respond("https://crm.test/oauth/token", status, body);
        let oauth = OAuthClient::new(
            RetryingClient::new(transport, RetryPolicy::default().without_delays()),
            "https://crm.test",
            OAuthCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
        );
        RefreshingToken::new(oauth, "stale")
    }

    #[tokio::test]
    async fn refreshing_token_grants_once() {
        let provider = provider(200, r#"{"access_token":"fresh","refresh_token":"next"}"#);

        assert_eq!(provider.access_token().await.unwrap(), "fresh");
        // second call is served from the cache; nothing else is queued
        assert_eq!(provider.access_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn refreshing_token_reports_rejected_grant() {
        let provider = provider(401, r#"{"error":"invalid_grant"}"#);

        let err = provider.access_token().await.unwrap_err();
        assert!(err.to_string().contains("Refresh token grant failed"));
        assert_eq!(provider.rotated_refresh_token().await, None);
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_kept() {
        let provider = provider(200, r#"{"access_token":"fresh","refresh_token":"next"}"#);
        assert_eq!(provider.rotated_refresh_token().await, None);

        provider.access_token().await.unwrap();

        assert_eq!(provider.rotated_refresh_token().await.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn unchanged_or_missing_refresh_token_is_not_a_rotation() {
        let same = provider(200, r#"{"access_token":"fresh","refresh_token":"stale"}"#);
        same.access_token().await.unwrap();
        assert_eq!(same.rotated_refresh_token().await, None);

        let absent = provider(200, r#"{"access_token":"fresh"}"#);
        absent.access_token().await.unwrap();
        assert_eq!(absent.rotated_refresh_token().await, None);
    }

    #[tokio::test]
    async fn rotation_is_saved_to_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("refresh_token"));
        let provider = provider(200, r#"{"access_token":"fresh","refresh_token":"next"}"#);

        assert!(!provider.save_rotation(&file).await.unwrap());
        assert_eq!(file.load().await.unwrap(), None);

        provider.access_token().await.unwrap();
        assert!(provider.save_rotation(&file).await.unwrap());

        assert_eq!(file.load().await.unwrap().as_deref(), Some("next"));
        assert!(!dir.path().join("refresh_token.tmp").exists());
    }

    #[tokio::test]
    async fn token_file_store_replaces_previous_token() {
        let dir = tempfile::tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("refresh_token"));

        file.store("first").await.unwrap();
        file.store("second").await.unwrap();

        assert_eq!(file.load().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn blank_token_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refresh_token");
        std::fs::write(&path, "  \n").unwrap();

        assert_eq!(TokenFile::new(path).load().await.unwrap(), None);
    }
}

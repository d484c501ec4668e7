use tracing::info;

use crate::error::Result;
use crate::retry::RetryingClient;
use crate::transport::{ApiRequest, HttpTransport};
use crate::types::TokenPair;

#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Token endpoint of the CRM (`/oauth/token`).
pub struct OAuthClient<T> {
    http: RetryingClient<T>,
    token_url: String,
    credentials: OAuthCredentials,
}

impl<T: HttpTransport> OAuthClient<T> {
    pub fn new(http: RetryingClient<T>, base_url: &str, credentials: OAuthCredentials) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth/token", base_url.trim_end_matches('/')),
            credentials,
        }
    }

    /// Trade an authorization code for a token pair.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenPair> {
        let fields = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("client_id".to_string(), self.credentials.client_id.clone()),
            ("client_secret".to_string(), self.credentials.client_secret.clone()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
        ];
        let pair = self.grant(fields).await?;
        info!("Authorization code exchanged for access token");
        Ok(pair)
    }

    /// Obtain a fresh access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let fields = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), self.credentials.client_id.clone()),
            ("client_secret".to_string(), self.credentials.client_secret.clone()),
        ];
        let pair = self.grant(fields).await?;
        info!(
            rotated = pair.refresh_token.is_some(),
            "Access token refreshed"
        );
        Ok(pair)
    }

    async fn grant(&self, fields: Vec<(String, String)>) -> Result<TokenPair> {
        let request = ApiRequest::post(&self.token_url)
            .header("Accept", "application/json")
            .form(fields);
        self.http.call_json(&request).await
    }
}

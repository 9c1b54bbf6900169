//! Google OAuth2 client
//!
//! Covers the three calls the assistant needs:
//! - consent URL for `orbit connect`
//! - authorization-code exchange (plus userinfo lookup)
//! - refresh-token grant

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::Result;

use super::token_store::{expiry_after, StoredTokenData};

/// Scopes requested at consent time
pub const GOOGLE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Google OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Default, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
    grant_type: &'a str,
}

#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    grant_type: &'a str,
}

/// Result of a refresh-token grant
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
}

/// Google OAuth2 web-server flow client
#[derive(Clone)]
pub struct GoogleOAuthClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    http_client: Client,
}

impl GoogleOAuthClient {
    /// Build from configuration.
    pub fn from_config(config: &Config, http_client: Client) -> Self {
        Self {
            client_id: config.google.client_id.clone(),
            client_secret: config.google.client_secret.clone(),
            redirect_uri: config.google.redirect_uri.clone(),
            auth_url: config.endpoints.oauth_auth_url.clone(),
            token_url: config.endpoints.oauth_token_url.clone(),
            userinfo_url: config.endpoints.userinfo_url.clone(),
            http_client,
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Consent URL requesting offline access so a refresh token is issued.
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        if self.client_id.is_empty() {
            return Err(Error::Config("Gmail OAuth not configured".to_string()));
        }

        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| Error::OAuth(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &GOOGLE_SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Exchange an authorization code and look up who granted it.
    pub async fn exchange_code(&self, code: &str) -> Result<StoredTokenData> {
        let request = TokenExchangeRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            code,
            redirect_uri: &self.redirect_uri,
            grant_type: "authorization_code",
        };

        let response = self.http_client
            .post(&self.token_url)
            .form(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::OAuth(format!("Token exchange failed: {}", error_text)));
        }

        let tokens: TokenResponse = response.json().await?;
        let user = self.fetch_user_info(&tokens.access_token).await?;

        tracing::info!("Connected Google account {}", user.email);

        Ok(StoredTokenData {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: expiry_after(tokens.expires_in),
            email: user.email,
            name: user.name,
        })
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let response = self.http_client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!("Userinfo lookup failed with HTTP {}", response.status());
            return Ok(UserInfo::default());
        }

        Ok(response.json().await?)
    }

    /// Refresh-token grant. Google does not rotate the refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let request = RefreshRequest {
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            refresh_token,
            grant_type: "refresh_token",
        };

        let response = self.http_client
            .post(&self.token_url)
            .form(&request)
            .send()
            .await
            .map_err(|e| Error::TokenRefreshFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::TokenRefreshFailed(format!("HTTP {}: {}", status.as_u16(), error_text)));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::TokenRefreshFailed(e.to_string()))?;

        Ok(RefreshedToken {
            access_token: tokens.access_token,
            expires_in: tokens.expires_in,
        })
    }
}

/// Random state string for CSRF protection
pub fn generate_state() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

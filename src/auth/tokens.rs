//! Access token lifecycle

use std::sync::Arc;

use crate::error::Error;
use crate::Result;

use super::oauth::GoogleOAuthClient;
use super::token_store::{expiry_after, now_ms, StoredTokenData, TokenStore};

/// Hands out a usable access token, refreshing through the OAuth client when
/// the stored one has expired.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    oauth: GoogleOAuthClient,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, oauth: GoogleOAuthClient) -> Self {
        Self { store, oauth }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn oauth(&self) -> &GoogleOAuthClient {
        &self.oauth
    }

    /// Return the stored access token, or refresh it first if expired.
    ///
    /// On refresh failure the stored record is left untouched.
    pub async fn get_valid_access_token(&self) -> Result<String> {
        let tokens = self.store.load()?.ok_or(Error::NotConnected)?;

        if !tokens.is_expired_at(now_ms()) {
            return Ok(tokens.access_token);
        }

        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::TokenExpiredNoRefresh)?;

        tracing::debug!("Access token for {} expired, refreshing", tokens.email);

        let refreshed = self.oauth.refresh(refresh_token).await.map_err(|e| {
            tracing::warn!("Token refresh failed: {}", e);
            match e {
                Error::TokenRefreshFailed(_) => e,
                other => Error::TokenRefreshFailed(other.to_string()),
            }
        })?;

        let updated = StoredTokenData {
            access_token: refreshed.access_token.clone(),
            expires_at: expiry_after(refreshed.expires_in),
            ..tokens
        };
        self.store.save(&updated)?;

        tracing::info!("Refreshed Google access token");
        Ok(refreshed.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token_store::MemoryTokenStore;
    use crate::config::Config;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(expires_at: i64, refresh: Option<&str>) -> StoredTokenData {
        StoredTokenData {
            access_token: "old-access".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at,
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
        }
    }

    fn manager(server: &MockServer, store: Arc<MemoryTokenStore>) -> TokenManager {
        let mut config = Config::default();
        config.google.client_id = "cid".to_string();
        config.google.client_secret = "secret".to_string();
        config.endpoints.oauth_token_url = format!("{}/token", server.uri());
        TokenManager::new(store, GoogleOAuthClient::from_config(&config, reqwest::Client::new()))
    }

    #[tokio::test]
    async fn test_fresh_token_makes_no_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with(record(now_ms() + 60_000, Some("rt"))));
        let token = manager(&server, store).get_valid_access_token().await.unwrap();
        assert_eq!(token, "old-access");
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=rt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access", "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with(record(now_ms() - 1, Some("rt"))));
        let before = now_ms();
        let token = manager(&server, store.clone()).get_valid_access_token().await.unwrap();
        let after = now_ms();

        assert_eq!(token, "new-access");
        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.access_token, "new-access");
        assert_eq!(saved.refresh_token.as_deref(), Some("rt"));
        assert!(saved.expires_at >= before + 3_600_000);
        assert!(saved.expires_at <= after + 3_600_000);
    }

    #[tokio::test]
    async fn test_oversized_lifetime_does_not_overflow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access", "expires_in": i64::MAX
            })))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryTokenStore::with(record(now_ms() - 1, Some("rt"))));
        let token = manager(&server, store.clone()).get_valid_access_token().await.unwrap();

        assert_eq!(token, "new-access");
        assert_eq!(store.load().unwrap().unwrap().expires_at, i64::MAX);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::with(record(0, None)));
        let err = manager(&server, store).get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, Error::TokenExpiredNoRefresh));
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_record_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let original = record(5, Some("rt"));
        let store = Arc::new(MemoryTokenStore::with(original.clone()));
        let err = manager(&server, store.clone()).get_valid_access_token().await.unwrap_err();

        assert!(matches!(err, Error::TokenRefreshFailed(_)));
        assert_eq!(store.load().unwrap(), Some(original));
    }

    #[tokio::test]
    async fn test_missing_record_is_not_connected() {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryTokenStore::new());
        let err = manager(&server, store).get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}

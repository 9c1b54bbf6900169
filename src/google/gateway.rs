//! Authenticated requests against the Gmail and Calendar REST APIs

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::auth::TokenManager;
use crate::config::Config;
use crate::error::Error;
use crate::Result;

/// Which Google API an endpoint is relative to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Gmail,
    Calendar,
}

/// Thin wrapper that attaches a valid bearer token to every call.
#[derive(Clone)]
pub struct GoogleApi {
    http_client: Client,
    tokens: TokenManager,
    gmail_base: String,
    calendar_base: String,
}

impl GoogleApi {
    pub fn new(config: &Config, http_client: Client, tokens: TokenManager) -> Self {
        Self {
            http_client,
            tokens,
            gmail_base: config.endpoints.gmail_api_base.trim_end_matches('/').to_string(),
            calendar_base: config.endpoints.calendar_api_base.trim_end_matches('/').to_string(),
        }
    }

    /// HTTP client shared by every outbound call, built with the configured timeout.
    pub fn build_http_client(config: &Config) -> Result<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .user_agent(concat!("orbit/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    fn url(&self, service: Service, endpoint: &str) -> String {
        let base = match service {
            Service::Gmail => &self.gmail_base,
            Service::Calendar => &self.calendar_base,
        };
        format!("{}/{}", base, endpoint.trim_start_matches('/'))
    }

    /// Issue a request and parse the JSON response.
    ///
    /// Status >= 400 becomes [`Error::Api`] carrying the raw body. An empty
    /// body (for example `204 No Content` on DELETE) is returned as `{}`.
    pub async fn request(
        &self,
        service: Service,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
    ) -> Result<Value> {
        let token = self.tokens.get_valid_access_token().await?;
        let url = self.url(service, endpoint);

        tracing::debug!("{} {}", method, url);

        let mut request = self.http_client
            .request(method.clone(), &url)
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("{} {} failed with HTTP {}", method, endpoint, status.as_u16());
            return Err(Error::Api { status: status.as_u16(), body });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Object(Default::default()));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn gmail_get(&self, endpoint: &str) -> Result<Value> {
        self.request(Service::Gmail, endpoint, Method::GET, None).await
    }

    pub async fn gmail_post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        self.request(Service::Gmail, endpoint, Method::POST, Some(body)).await
    }

    pub async fn calendar_get(&self, endpoint: &str) -> Result<Value> {
        self.request(Service::Calendar, endpoint, Method::GET, None).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use wiremock::MockServer;

    use super::*;
    use crate::auth::{now_ms, GoogleOAuthClient, MemoryTokenStore, StoredTokenData};

    /// Config whose Google endpoints all point at `server`.
    pub fn config_for(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.endpoints.gmail_api_base = format!("{}/gmail/v1", server.uri());
        config.endpoints.calendar_api_base = format!("{}/calendar/v3", server.uri());
        config.endpoints.oauth_token_url = format!("{}/token", server.uri());
        config
    }

    /// Gateway backed by a fresh, non-expired token.
    pub fn connected_api(server: &MockServer) -> GoogleApi {
        let config = config_for(server);
        let store = Arc::new(MemoryTokenStore::with(StoredTokenData {
            access_token: "test-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: now_ms() + 3_600_000,
            email: "me@example.com".to_string(),
            name: "Me".to_string(),
        }));
        let http = Client::new();
        let tokens = TokenManager::new(store, GoogleOAuthClient::from_config(&config, http.clone()));
        GoogleApi::new(&config, http, tokens)
    }

    /// Gateway with no stored account.
    pub fn disconnected_api(server: &MockServer) -> GoogleApi {
        let config = config_for(server);
        let http = Client::new();
        let tokens = TokenManager::new(
            Arc::new(MemoryTokenStore::new()),
            GoogleOAuthClient::from_config(&config, http.clone()),
        );
        GoogleApi::new(&config, http, tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_request_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/labels/UNREAD"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"messagesUnread": 3})))
            .expect(1)
            .mount(&server)
            .await;

        let value = connected_api(&server).gmail_get("users/me/labels/UNREAD").await.unwrap();
        assert_eq!(value["messagesUnread"], 3);
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Credentials"))
            .mount(&server)
            .await;

        let err = connected_api(&server).calendar_get("/calendars/primary/events").await.unwrap_err();
        match err {
            Error::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Invalid Credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_no_content_is_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calendar/v3/calendars/primary/events/ev1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let value = connected_api(&server)
            .request(Service::Calendar, "/calendars/primary/events/ev1", Method::DELETE, None)
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_not_connected_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = disconnected_api(&server).gmail_get("users/me/messages").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}

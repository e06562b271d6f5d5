/*
[INPUT]:  HTTP configuration (base URL, timeouts, token provider)
[OUTPUT]: Configured reqwest client ready for API calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;

use crate::auth::TokenProvider;
use crate::http::{ApiError, Result};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Main HTTP client for the fieldsync backend
#[derive(Clone)]
pub struct SyncClient {
    http_client: Client,
    base_url: Url,
    token_provider: Arc<dyn TokenProvider>,
}

impl SyncClient {
    /// Create a new client with default configuration
    pub fn new(base_url: &str, token_provider: Arc<dyn TokenProvider>) -> Result<Self> {
        Self::with_config(ClientConfig::default(), base_url, token_provider)
    }

    /// Create a new client with custom configuration
    pub fn with_config(
        config: ClientConfig,
        base_url: &str,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            token_provider,
        })
    }

    /// Build full URL for an endpoint
    fn url(&self, endpoint: &str) -> Result<Url> {
        Ok(self.base_url.join(endpoint)?)
    }

    /// Build request builder for an endpoint
    pub(crate) fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.url(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Send a request with bearer auth and parse the JSON response.
    ///
    /// A 401 triggers one transparent token refresh and one retry; a second
    /// 401 surfaces as `ApiError::Unauthorized`. The builder must be clonable
    /// (no streaming body) - streaming uploads rebuild their request instead.
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let retry = builder.try_clone();
        let token = self.token_provider.bearer_token().await?;
        let response = builder.bearer_auth(token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let Some(retry) = retry else {
                return Err(ApiError::Unauthorized {
                    message: "request rejected and not retryable".to_string(),
                });
            };
            tracing::debug!("received 401; refreshing token and retrying once");
            let token = self.token_provider.refresh_token().await?;
            let response = retry.bearer_auth(token).send().await?;
            return Self::parse_json(response).await;
        }

        Self::parse_json(response).await
    }

    pub(crate) async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Unauthorized { message });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::api_error(status, message));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|err| ApiError::InvalidResponse(format!("{err}: {body}")))
    }

    /// Token provider shared with streaming endpoints.
    pub(crate) fn token_provider(&self) -> &Arc<dyn TokenProvider> {
        &self.token_provider
    }
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;
    use serde::Deserialize;
    use tokio_test::assert_ok;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        ok: bool,
    }

    #[tokio::test]
    async fn test_send_json_attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"ok":true}"#, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = assert_ok!(SyncClient::new(
            &server.uri(),
            Arc::new(StaticTokenProvider::new("token-1")),
        ));

        let builder = assert_ok!(client.request(Method::GET, "/api/ping"));
        let pong: Pong = assert_ok!(client.send_json(builder).await);
        assert_eq!(pong, Pong { ok: true });
    }

    #[tokio::test]
    async fn test_send_json_refreshes_once_on_401() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"ok":true}"#, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = assert_ok!(SyncClient::new(
            &server.uri(),
            Arc::new(StaticTokenProvider::with_refresh("stale", "fresh")),
        ));

        let builder = assert_ok!(client.request(Method::GET, "/api/ping"));
        let pong: Pong = assert_ok!(client.send_json(builder).await);
        assert_eq!(pong, Pong { ok: true });
    }

    #[tokio::test]
    async fn test_send_json_second_401_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
            .expect(2)
            .mount(&server)
            .await;

        let client = SyncClient::new(
            &server.uri(),
            Arc::new(StaticTokenProvider::with_refresh("stale", "still-stale")),
        )
        .expect("client init");

        let builder = client.request(Method::GET, "/api/ping").expect("builder");
        let result: Result<Pong> = client.send_json(builder).await;
        assert!(matches!(result, Err(ApiError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_send_json_maps_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = SyncClient::new(
            &server.uri(),
            Arc::new(StaticTokenProvider::new("token")),
        )
        .expect("client init");

        let builder = client.request(Method::GET, "/api/ping").expect("builder");
        let result: Result<Pong> = client.send_json(builder).await;
        match result {
            Err(err @ ApiError::Api { code: 503, .. }) => assert!(err.is_retryable()),
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}

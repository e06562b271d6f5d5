/*
[INPUT]:  Bearer token sources (stored session, external refresh flow)
[OUTPUT]: Tokens for authenticated requests, refreshed on demand
[POS]:    Auth layer - token access seam injected into the HTTP client
[UPDATE]: When the token refresh contract changes
*/

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::http::{ApiError, Result};

/// Supplies bearer tokens for authenticated requests.
///
/// The host application owns the real session (login screen, secure storage);
/// the client only asks for the current token and, on a 401, for a refreshed
/// one. Implementations must be safe to call from multiple in-flight requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current bearer token.
    async fn bearer_token(&self) -> Result<String>;

    /// Obtain a fresh token after the current one was rejected.
    ///
    /// Called at most once per request; a second rejection surfaces as
    /// `ApiError::Unauthorized`.
    async fn refresh_token(&self) -> Result<String>;
}

/// Fixed-token provider for tests and headless tooling.
///
/// `refresh_token` rotates to the configured fallback if one was given,
/// otherwise it fails: a static token that got rejected cannot recover.
#[derive(Debug)]
pub struct StaticTokenProvider {
    current: RwLock<String>,
    refreshed: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(token.into()),
            refreshed: None,
        }
    }

    /// Provider that answers one refresh with the given replacement token.
    pub fn with_refresh(token: impl Into<String>, refreshed: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(token.into()),
            refreshed: Some(refreshed.into()),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.current.read().await.clone())
    }

    async fn refresh_token(&self) -> Result<String> {
        match &self.refreshed {
            Some(token) => {
                let mut current = self.current.write().await;
                *current = token.clone();
                Ok(token.clone())
            }
            None => Err(ApiError::Unauthorized {
                message: "static token rejected and no refresh configured".to_string(),
            }),
        }
    }
}

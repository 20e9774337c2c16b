//! Inventory token acquisition

use crate::config::{Credentials, InventoryConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Source of a bearer token for the inventory API
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Obtain a token; failures are fatal for the run
    async fn token(&self) -> Result<String>;
}

/// A token known up front
#[derive(Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
    client_context: u32,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: Option<String>,
}

/// Logs in to the inventory REST API with username and password
pub struct InventoryAuthenticator {
    client: reqwest::Client,
    url: String,
    credentials: Credentials,
    client_context: u32,
    timeout: Duration,
}

impl InventoryAuthenticator {
    /// Build from the inventory configuration
    pub fn new(client: reqwest::Client, config: &InventoryConfig) -> Self {
        Self {
            client,
            url: config.auth_url.clone(),
            credentials: config.credentials.clone(),
            client_context: config.client_context,
            timeout: config.request_timeout,
        }
    }
}

#[async_trait]
impl TokenProvider for InventoryAuthenticator {
    async fn token(&self) -> Result<String> {
        if self.credentials.is_incomplete() {
            return Err(Error::Auth("inventory credentials are not set".to_string()));
        }

        tracing::info!(url = %self.url, user = %self.credentials.username, "authenticating");
        let response = self
            .client
            .post(&self.url)
            .json(&AuthRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
                client_context: self.client_context,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail: String = body.chars().take(200).collect();
            tracing::error!(status = status.as_u16(), detail = %detail, "authentication rejected");
            return Err(Error::Auth(format!("HTTP {}: {}", status.as_u16(), detail)));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("response is not valid JSON: {e}")))?;

        match body.token.filter(|t| !t.is_empty()) {
            Some(token) => {
                tracing::info!("authentication succeeded");
                Ok(token)
            }
            None => Err(Error::Auth("response contains no token".to_string())),
        }
    }
}

//! Deletion targets
//!
//! Each downstream API is a [`DeletionTarget`]: it knows its endpoint layout,
//! its authentication, and which statuses count as success. Retry and the
//! simulation gate live in the orchestrator, not here.

use crate::config::{Credentials, InventoryConfig, RemovalMethod, ServiceDeskConfig};
use crate::error::DeleteError;
use crate::types::{DeletionTask, TargetKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Longest response excerpt kept in a failure detail
const DETAIL_LIMIT: usize = 200;

/// Inventory success statuses
const INVENTORY_SUCCESS: &[u16] = &[200, 202, 204];

/// Service-desk success statuses
const SERVICE_DESK_SUCCESS: &[u16] = &[200, 201, 202, 204];

/// A system relationships can be deleted from
#[async_trait]
pub trait DeletionTarget: Send + Sync {
    /// Which system this is
    fn kind(&self) -> TargetKind;

    /// URL the task is sent to
    fn endpoint(&self, task: &DeletionTask) -> String;

    /// Issue one delete request; returns the success status received
    async fn delete(&self, task: &DeletionTask) -> Result<u16, DeleteError>;
}

/// Inventory platform: `DELETE {base}/relation/{ucmdbId}` with a bearer token
pub struct InventoryTarget {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl InventoryTarget {
    /// Build from configuration and a previously obtained token
    pub fn new(client: reqwest::Client, config: &InventoryConfig, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: config.delete_base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            timeout: config.request_timeout,
        }
    }
}

#[async_trait]
impl DeletionTarget for InventoryTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Inventory
    }

    fn endpoint(&self, task: &DeletionTask) -> String {
        format!(
            "{}/relation/{}",
            self.base_url,
            urlencoding::encode(task.relationship_id())
        )
    }

    async fn delete(&self, task: &DeletionTask) -> Result<u16, DeleteError> {
        let response = self
            .client
            .delete(self.endpoint(task))
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DeleteError::from_reqwest(&e))?;

        check_status(response, INVENTORY_SUCCESS).await
    }
}

/// Service-management API: `{base}/{ucmdbid_fo}/{ucmdbId}` with basic auth
pub struct ServiceDeskTarget {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    removal: RemovalMethod,
    timeout: Duration,
}

impl ServiceDeskTarget {
    /// Build from configuration
    pub fn new(client: reqwest::Client, config: &ServiceDeskConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials: config.credentials.clone(),
            removal: config.removal,
            timeout: config.request_timeout,
        }
    }
}

#[async_trait]
impl DeletionTarget for ServiceDeskTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::ServiceDesk
    }

    fn endpoint(&self, task: &DeletionTask) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            urlencoding::encode(task.forward_object_id().unwrap_or_default()),
            urlencoding::encode(task.relationship_id())
        )
    }

    async fn delete(&self, task: &DeletionTask) -> Result<u16, DeleteError> {
        if task.forward_object_id().is_none() {
            return Err(DeleteError::InvalidTask(format!(
                "relationship {} has no forward object",
                task.relationship_id()
            )));
        }

        let url = self.endpoint(task);
        let request = match self.removal {
            RemovalMethod::Delete => self.client.delete(url),
            RemovalMethod::MarkRemoved => self.client.put(url).json(&serde_json::json!({
                "cirelationship1to1": { "status": "Removed" }
            })),
        };

        let response = request
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DeleteError::from_reqwest(&e))?;

        check_status(response, SERVICE_DESK_SUCCESS).await
    }
}

async fn check_status(response: reqwest::Response, success: &[u16]) -> Result<u16, DeleteError> {
    let status = response.status();
    if success.contains(&status.as_u16()) {
        return Ok(status.as_u16());
    }
    Err(classify_failure(status, response).await)
}

async fn classify_failure(status: StatusCode, response: reqwest::Response) -> DeleteError {
    if status.is_client_error() {
        let body = response.text().await.unwrap_or_default();
        DeleteError::Client {
            status: status.as_u16(),
            detail: body.chars().take(DETAIL_LIMIT).collect(),
        }
    } else if status.is_server_error() {
        DeleteError::Server {
            status: status.as_u16(),
        }
    } else {
        DeleteError::Unexpected {
            status: status.as_u16(),
        }
    }
}

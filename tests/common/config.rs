//! Configurations pointing every endpoint at one mock server

use cmdb_reconcile::config::Credentials;
use cmdb_reconcile::{Config, RunMode};
use std::time::Duration;

/// Path of the token endpoint on the mock server
pub const AUTH_PATH: &str = "/rest-api/authenticate";
/// Path of the topology report endpoint on the mock server
pub const TOPOLOGY_PATH: &str = "/rest-api/topology";
/// Inventory relation deletes match this
pub const INVENTORY_DELETE_REGEX: &str = r"^/rest-api/dataModel/relation/[^/]+$";
/// Service-desk relationship requests match this
pub const SERVICE_DESK_REGEX: &str = r"^/SM/9/rest/cirelationship1to1s/[^/]+/[^/]+$";

/// Full configuration against `server_uri` with millisecond retry delays
pub fn test_config(server_uri: &str, mode: RunMode) -> Config {
    let mut config = Config::default();
    config.mode = mode;

    config.inventory.auth_url = format!("{server_uri}{AUTH_PATH}");
    config.inventory.topology_url = format!("{server_uri}{TOPOLOGY_PATH}");
    config.inventory.delete_base_url = format!("{server_uri}/rest-api/dataModel");
    config.inventory.credentials = Credentials::new("admin", "secret");

    config.service_desk.base_url = format!("{server_uri}/SM/9/rest/cirelationship1to1s");
    config.service_desk.credentials = Credentials::new("sm-user", "sm-secret");

    config.download.retry_delay = Duration::from_millis(10);
    config.download.max_attempts = 3;
    config.deletion.retry.delay = Duration::from_millis(10);
    config.deletion.concurrency = 4;
    config.report.enabled = false;
    config
}

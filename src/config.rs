//! Configuration types for cmdb-reconcile
//!
//! Everything the core needs is supplied from outside: base URLs, credentials,
//! chunk size, retry counts, delays and timeout budgets. Nothing inside the
//! download, classify or delete stages reads process-wide state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Run mode gate applied identically to both deletion targets
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Dry run: no mutating request is ever sent
    #[default]
    Simulation,
    /// Deletions are really issued
    Execution,
}

impl RunMode {
    /// True when no mutating call may be issued
    pub fn is_simulation(&self) -> bool {
        matches!(self, RunMode::Simulation)
    }
}

impl FromStr for RunMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulation" => Ok(RunMode::Simulation),
            "execution" => Ok(RunMode::Execution),
            other => Err(Error::config(
                format!("mode must be 'simulation' or 'execution', not '{other}'"),
                "mode",
            )),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Simulation => write!(f, "simulation"),
            RunMode::Execution => write!(f, "execution"),
        }
    }
}

/// Username/password pair; the password never appears in debug output
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name
    #[serde(default)]
    pub username: String,
    /// Account secret (not serialized)
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl Credentials {
    /// Build a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// True when either half is missing
    pub fn is_incomplete(&self) -> bool {
        self.username.trim().is_empty() || self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Inventory platform (Target A) endpoints and authentication
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Token endpoint (default: ".../rest-api/authenticate")
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Topology report endpoint the snapshot is downloaded from
    #[serde(default = "default_topology_url")]
    pub topology_url: String,

    /// Data model base; deletions go to `{delete_base_url}/relation/{ucmdbId}`
    #[serde(default = "default_delete_base_url")]
    pub delete_base_url: String,

    /// Name of the stored topology report to run
    #[serde(default = "default_report_name")]
    pub report_name: String,

    /// Client context sent with the authentication request (default: 1)
    #[serde(default = "default_client_context")]
    pub client_context: u32,

    /// Timeout for authentication and single delete requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Credentials, normally supplied through the environment
    #[serde(default)]
    pub credentials: Credentials,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            topology_url: default_topology_url(),
            delete_base_url: default_delete_base_url(),
            report_name: default_report_name(),
            client_context: default_client_context(),
            request_timeout: default_request_timeout(),
            credentials: Credentials::default(),
        }
    }
}

/// How Target B removes a relationship
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMethod {
    /// HTTP DELETE on the relationship resource
    #[default]
    Delete,
    /// HTTP PUT marking the relationship status as "Removed"
    MarkRemoved,
}

/// Service-management API (Target B) settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServiceDeskConfig {
    /// Relationship collection base, e.g. "https://itsm/SM/9/rest/cirelationship1to1s"
    #[serde(default)]
    pub base_url: String,

    /// Removal semantics used by this deployment
    #[serde(default)]
    pub removal: RemovalMethod,

    /// Timeout for a single request (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Basic-auth credentials
    #[serde(default)]
    pub credentials: Credentials,
}

/// Snapshot download behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Bytes read per streaming step (default: 64 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Emit a progress event every this many bytes (default: 50 MiB)
    #[serde(default = "default_progress_interval")]
    pub progress_interval_bytes: u64,

    /// Whole-transfer attempts including the first (default: 5)
    #[serde(default = "default_download_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between transfer attempts (default: 15 seconds)
    #[serde(default = "default_download_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,

    /// TCP connect timeout (default: 60 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Upper bound for one attempt, connect to last byte (default: 1 hour)
    #[serde(default = "default_attempt_timeout", with = "duration_serde")]
    pub attempt_timeout: Duration,

    /// Wall-clock budget across all attempts and delays (default: 2 hours)
    #[serde(default = "default_total_budget", with = "duration_serde")]
    pub total_budget: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            progress_interval_bytes: default_progress_interval(),
            max_attempts: default_download_attempts(),
            retry_delay: default_download_retry_delay(),
            connect_timeout: default_connect_timeout(),
            attempt_timeout: default_attempt_timeout(),
            total_budget: default_total_budget(),
        }
    }
}

/// Retry policy shared by both deletion targets
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per task including the first (default: 3)
    #[serde(default = "default_delete_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts (default: 2 seconds)
    #[serde(default = "default_delete_delay", with = "duration_serde")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_delete_attempts(),
            delay: default_delete_delay(),
        }
    }
}

/// Deletion orchestration settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeletionConfig {
    /// Per-task retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Concurrent tasks per target (default: 1, sequential)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: default_concurrency(),
        }
    }
}

/// Classification parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// CI types analysed as relationship sources; empty means every CI
    #[serde(default = "default_include_types")]
    pub include_types: Vec<String>,

    /// NIT property read from the end1 CI
    #[serde(default = "default_nit_field_end1")]
    pub nit_field_end1: String,

    /// NIT property read from the end2 CI
    #[serde(default = "default_nit_field_end2")]
    pub nit_field_end2: String,

    /// Relationship type linking a forward object to the end2 CI
    #[serde(default = "default_containment_type")]
    pub containment_type: String,

    /// CI types that count as forward objects
    #[serde(default = "default_forward_object_types")]
    pub forward_object_types: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            include_types: default_include_types(),
            nit_field_end1: default_nit_field_end1(),
            nit_field_end2: default_nit_field_end2(),
            containment_type: default_containment_type(),
            forward_object_types: default_forward_object_types(),
        }
    }
}

/// Run report output
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Write report files after the run (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Parent directory for per-run folders (default: "./reports")
    #[serde(default = "default_report_dir")]
    pub directory: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_report_dir(),
        }
    }
}

/// Main configuration for a reconciliation run
///
/// Built once, validated, then passed by reference into the pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Simulation or execution, for both targets
    #[serde(default)]
    pub mode: RunMode,

    /// Read the snapshot from this file instead of downloading it
    #[serde(default)]
    pub local_snapshot: Option<PathBuf>,

    /// Inventory platform (Target A)
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Service-management API (Target B)
    #[serde(default)]
    pub service_desk: ServiceDeskConfig,

    /// Snapshot transfer
    #[serde(default)]
    pub download: DownloadConfig,

    /// Deletion retry and concurrency
    #[serde(default)]
    pub deletion: DeletionConfig,

    /// Classification parameters
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Report output
    #[serde(default)]
    pub report: ReportConfig,
}

/// Environment variables consulted by [`Config::apply_env`]
pub mod env_keys {
    /// Run mode override
    pub const MODE: &str = "RECONCILE_MODE";
    /// Inventory user
    pub const INVENTORY_USER: &str = "INVENTORY_USER";
    /// Inventory password
    pub const INVENTORY_PASSWORD: &str = "INVENTORY_PASSWORD";
    /// Service-desk base URL
    pub const SERVICE_DESK_URL: &str = "SERVICE_DESK_URL";
    /// Service-desk user
    pub const SERVICE_DESK_USER: &str = "SERVICE_DESK_USER";
    /// Service-desk password
    pub const SERVICE_DESK_PASSWORD: &str = "SERVICE_DESK_PASSWORD";
}

impl Config {
    /// Load a configuration file (JSON); missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                format!("cannot read {}: {}", path.display(), e),
                "config",
            )
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("invalid {}: {}", path.display(), e), "config"))
    }

    /// Overlay values from an environment lookup (credentials, service-desk URL, mode)
    ///
    /// Takes a lookup function so callers decide where values come from;
    /// the binary passes `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup(env_keys::MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(user) = lookup(env_keys::INVENTORY_USER) {
            self.inventory.credentials.username = user;
        }
        if let Some(password) = lookup(env_keys::INVENTORY_PASSWORD) {
            self.inventory.credentials.password = password;
        }
        if let Some(url) = lookup(env_keys::SERVICE_DESK_URL) {
            self.service_desk.base_url = url;
        }
        if let Some(user) = lookup(env_keys::SERVICE_DESK_USER) {
            self.service_desk.credentials.username = user;
        }
        if let Some(password) = lookup(env_keys::SERVICE_DESK_PASSWORD) {
            self.service_desk.credentials.password = password;
        }
        Ok(())
    }

    /// Whether the run must obtain an inventory token
    ///
    /// A local snapshot in simulation mode touches no inventory endpoint.
    pub fn requires_token(&self) -> bool {
        self.local_snapshot.is_none() || !self.mode.is_simulation()
    }

    /// Check the configuration before any network activity
    pub fn validate(&self) -> Result<()> {
        if self.requires_token() {
            if self.inventory.credentials.is_incomplete() {
                return Err(Error::config(
                    format!(
                        "inventory credentials missing (set {} and {})",
                        env_keys::INVENTORY_USER,
                        env_keys::INVENTORY_PASSWORD
                    ),
                    "inventory.credentials",
                ));
            }
            validate_url(&self.inventory.auth_url, "inventory.auth_url")?;
        }
        if self.local_snapshot.is_none() {
            validate_url(&self.inventory.topology_url, "inventory.topology_url")?;
        }
        validate_url(&self.inventory.delete_base_url, "inventory.delete_base_url")?;

        if self.service_desk.base_url.trim().is_empty() {
            return Err(Error::config(
                format!(
                    "service desk base URL missing (set {})",
                    env_keys::SERVICE_DESK_URL
                ),
                "service_desk.base_url",
            ));
        }
        validate_url(&self.service_desk.base_url, "service_desk.base_url")?;
        if !self.mode.is_simulation() && self.service_desk.credentials.is_incomplete() {
            return Err(Error::config(
                format!(
                    "service desk credentials missing (set {} and {})",
                    env_keys::SERVICE_DESK_USER,
                    env_keys::SERVICE_DESK_PASSWORD
                ),
                "service_desk.credentials",
            ));
        }

        if self.download.chunk_size == 0 {
            return Err(Error::config(
                "chunk_size must be greater than zero",
                "download.chunk_size",
            ));
        }
        if self.download.max_attempts == 0 {
            return Err(Error::config(
                "max_attempts must be at least 1",
                "download.max_attempts",
            ));
        }
        if self.deletion.retry.max_attempts == 0 {
            return Err(Error::config(
                "max_attempts must be at least 1",
                "deletion.retry.max_attempts",
            ));
        }
        if self.deletion.concurrency == 0 {
            return Err(Error::config(
                "concurrency must be at least 1",
                "deletion.concurrency",
            ));
        }
        if self.classifier.nit_field_end1.is_empty() || self.classifier.nit_field_end2.is_empty()
        {
            return Err(Error::config(
                "NIT field names must not be empty",
                "classifier.nit_field_end1",
            ));
        }
        Ok(())
    }
}

fn validate_url(value: &str, key: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| Error::config(format!("invalid URL '{value}': {e}"), key))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::config(
            format!("URL '{value}' must use http or https"),
            key,
        ));
    }
    Ok(())
}

// Default value functions
fn default_auth_url() -> String {
    "https://ucmdb.example.com:8443/rest-api/authenticate".to_string()
}

fn default_topology_url() -> String {
    "https://ucmdb.example.com:8443/rest-api/topology".to_string()
}

fn default_delete_base_url() -> String {
    "https://ucmdb.example.com:8443/rest-api/dataModel".to_string()
}

fn default_report_name() -> String {
    "Reporte_Clientes_Onyx-uCMDB".to_string()
}

fn default_client_context() -> u32 {
    1
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_progress_interval() -> u64 {
    50 * 1024 * 1024
}

fn default_download_attempts() -> u32 {
    5
}

fn default_download_retry_delay() -> Duration {
    Duration::from_secs(15)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_attempt_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_total_budget() -> Duration {
    Duration::from_secs(2 * 3600)
}

fn default_delete_attempts() -> u32 {
    3
}

fn default_delete_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_concurrency() -> usize {
    1
}

fn default_include_types() -> Vec<String> {
    vec!["clr_onyxservicecodes".to_string()]
}

fn default_nit_field_end1() -> String {
    "clr_onyxdb_company_nit".to_string()
}

fn default_nit_field_end2() -> String {
    "clr_onyxdb_companynit".to_string()
}

fn default_containment_type() -> String {
    "containment".to_string()
}

fn default_forward_object_types() -> Vec<String> {
    [
        "clr_service_catalog_fo_e",
        "clr_service_catalog_fo_n",
        "clr_service_catalog_fo_p",
        "clr_service_catalog_fo_cloud",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("./reports")
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

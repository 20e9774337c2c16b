//! Core types for cmdb-reconcile

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Placeholder written where an optional value is absent in report output
pub const NOT_AVAILABLE: &str = "N/A";

/// A configuration item from the inventory snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigurationItem {
    id: String,
    ci_type: String,
    properties: HashMap<String, String>,
    relationships: Vec<String>,
}

impl ConfigurationItem {
    /// Build a CI; the id must not be blank
    pub fn new(
        id: impl Into<String>,
        ci_type: impl Into<String>,
        properties: HashMap<String, String>,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidRecord(
                "configuration item with empty ucmdbId".to_string(),
            ));
        }
        Ok(Self {
            id,
            ci_type: ci_type.into(),
            properties,
            relationships: Vec::new(),
        })
    }

    /// Inventory identifier (`ucmdbId`)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// CI type, e.g. `clr_onyxservicecodes`
    pub fn ci_type(&self) -> &str {
        &self.ci_type
    }

    /// Raw property value
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Normalized NIT read from `field`, trimmed of surrounding whitespace
    ///
    /// Returns `None` when the property is absent.
    pub fn nit(&self, field: &str) -> Option<&str> {
        self.property(field).map(str::trim)
    }

    /// Human-readable label, `"N/A"` when the CI has none
    pub fn label(&self) -> &str {
        self.property("display_label").unwrap_or(NOT_AVAILABLE)
    }

    /// Ids of relationships where this CI is `end1`, in snapshot order
    pub fn relationships(&self) -> &[String] {
        &self.relationships
    }

    pub(crate) fn push_relationship(&mut self, relationship_id: String) {
        self.relationships.push(relationship_id);
    }
}

/// A directed relationship between two CIs
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Relationship {
    #[serde(rename = "ucmdbId")]
    id: String,
    #[serde(rename = "type")]
    rel_type: String,
    #[serde(rename = "end1Id")]
    end1: String,
    #[serde(rename = "end2Id")]
    end2: String,
}

impl Relationship {
    /// Build a relationship; the id and both endpoints must not be blank
    pub fn new(
        id: impl Into<String>,
        rel_type: impl Into<String>,
        end1: impl Into<String>,
        end2: impl Into<String>,
    ) -> Result<Self> {
        let (id, end1, end2) = (id.into(), end1.into(), end2.into());
        if id.trim().is_empty() {
            return Err(Error::InvalidRecord(
                "relationship with empty ucmdbId".to_string(),
            ));
        }
        if end1.trim().is_empty() || end2.trim().is_empty() {
            return Err(Error::InvalidRecord(format!(
                "relationship {id} is missing an endpoint"
            )));
        }
        Ok(Self {
            id,
            rel_type: rel_type.into(),
            end1,
            end2,
        })
    }

    /// Relationship identifier (`ucmdbId`)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Relationship type, e.g. `containment`
    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    /// Source CI id
    pub fn end1(&self) -> &str {
        &self.end1
    }

    /// Target CI id
    pub fn end2(&self) -> &str {
        &self.end2
    }
}

/// Inconsistency category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// Safe to delete automatically
    Normal,
    /// Ambiguous; reported for manual review, never deleted
    Particular,
}

/// One side of an inconsistent relationship as seen at classification time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// CI id
    pub id: String,
    /// Normalized NIT
    pub nit: String,
    /// Display label (`"N/A"` when absent)
    pub label: String,
}

impl Endpoint {
    /// Capture the endpoint view of a CI with an already normalized NIT
    pub fn from_ci(ci: &ConfigurationItem, nit: &str) -> Self {
        Self {
            id: ci.id().to_string(),
            nit: nit.to_string(),
            label: ci.label().to_string(),
        }
    }
}

/// A relationship flagged as inconsistent
///
/// Serializes with the field names used by downstream tooling
/// (`ucmdbId`, `relacion_fo`, `ucmdbid_fo`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InconsistencyRecord {
    #[serde(rename = "ucmdbId")]
    relationship_id: String,
    kind: InconsistencyKind,
    #[serde(rename = "end1Id")]
    end1_id: String,
    #[serde(rename = "end2Id")]
    end2_id: String,
    nit_end1: String,
    nit_end2: String,
    display_label_end1: String,
    display_label_end2: String,
    #[serde(rename = "relacion_fo")]
    has_forward_link: bool,
    #[serde(rename = "ucmdbid_fo", serialize_with = "serialize_or_na")]
    forward_object_id: Option<String>,
    #[serde(
        rename = "end1Id_containment",
        skip_serializing_if = "Option::is_none"
    )]
    containment_parent: Option<String>,
}

fn serialize_or_na<S>(value: &Option<String>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or(NOT_AVAILABLE))
}

fn normalize_optional_id(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != NOT_AVAILABLE)
        .map(str::to_string)
}

impl InconsistencyRecord {
    /// Build a record with no forward-object link
    pub fn new(
        relationship_id: impl Into<String>,
        kind: InconsistencyKind,
        end1: Endpoint,
        end2: Endpoint,
    ) -> Result<Self> {
        let relationship_id = relationship_id.into();
        if relationship_id.trim().is_empty() {
            return Err(Error::InvalidRecord(
                "inconsistency with empty relationship id".to_string(),
            ));
        }
        Ok(Self {
            relationship_id,
            kind,
            end1_id: end1.id,
            end2_id: end2.id,
            nit_end1: end1.nit,
            nit_end2: end2.nit,
            display_label_end1: end1.label,
            display_label_end2: end2.label,
            has_forward_link: false,
            forward_object_id: None,
            containment_parent: None,
        })
    }

    /// Attach the forward-object relationship id; `""` and `"N/A"` count as absent
    pub fn with_forward_object(mut self, forward_object_id: Option<&str>) -> Self {
        self.forward_object_id = normalize_optional_id(forward_object_id);
        self.has_forward_link = self.forward_object_id.is_some();
        self
    }

    /// Record the CI containing `end2`
    pub fn with_containment_parent(mut self, parent: Option<&str>) -> Self {
        self.containment_parent = normalize_optional_id(parent);
        self
    }

    /// Relationship id (`ucmdbId`)
    pub fn relationship_id(&self) -> &str {
        &self.relationship_id
    }

    /// Normal or particular
    pub fn kind(&self) -> InconsistencyKind {
        self.kind
    }

    /// Source CI id
    pub fn end1_id(&self) -> &str {
        &self.end1_id
    }

    /// Target CI id
    pub fn end2_id(&self) -> &str {
        &self.end2_id
    }

    /// Normalized NITs of end1 and end2
    pub fn nits(&self) -> (&str, &str) {
        (&self.nit_end1, &self.nit_end2)
    }

    /// Display labels of end1 and end2
    pub fn labels(&self) -> (&str, &str) {
        (&self.display_label_end1, &self.display_label_end2)
    }

    /// Whether a forward-object relationship was found
    pub fn has_forward_link(&self) -> bool {
        self.has_forward_link
    }

    /// Forward-object relationship id, if any
    pub fn forward_object_id(&self) -> Option<&str> {
        self.forward_object_id.as_deref()
    }

    /// CI containing `end2` (particular records only)
    pub fn containment_parent(&self) -> Option<&str> {
        self.containment_parent.as_deref()
    }

    /// True when this record must also be removed from the service desk
    pub fn is_downstream_eligible(&self) -> bool {
        self.kind == InconsistencyKind::Normal
            && self.has_forward_link
            && self.forward_object_id.is_some()
    }
}

/// Downstream system a deletion is issued against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Inventory platform (source of truth)
    Inventory,
    /// Service-management API holding the derived subset
    ServiceDesk,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Inventory => write!(f, "inventory"),
            TargetKind::ServiceDesk => write!(f, "service_desk"),
        }
    }
}

/// One planned deletion
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeletionTask {
    target: TargetKind,
    relationship_id: String,
    forward_object_id: Option<String>,
}

impl DeletionTask {
    /// Inventory deletion of a relationship
    pub fn inventory(record: &InconsistencyRecord) -> Self {
        Self {
            target: TargetKind::Inventory,
            relationship_id: record.relationship_id().to_string(),
            forward_object_id: record.forward_object_id().map(str::to_string),
        }
    }

    /// Service-desk deletion; `None` when the record has no forward object
    pub fn service_desk(record: &InconsistencyRecord) -> Option<Self> {
        if !record.is_downstream_eligible() {
            return None;
        }
        Some(Self {
            target: TargetKind::ServiceDesk,
            relationship_id: record.relationship_id().to_string(),
            forward_object_id: record.forward_object_id().map(str::to_string),
        })
    }

    /// Target system
    pub fn target(&self) -> TargetKind {
        self.target
    }

    /// Relationship id (`ucmdbId`)
    pub fn relationship_id(&self) -> &str {
        &self.relationship_id
    }

    /// Forward-object relationship id; always present for service-desk tasks
    pub fn forward_object_id(&self) -> Option<&str> {
        self.forward_object_id.as_deref()
    }
}

/// Terminal state of a deletion task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    /// Simulation mode; no request was sent
    Simulated,
    /// Target answered with a success status
    Success,
    /// Non-retryable failure (4xx or unexpected status)
    FailedPermanent,
    /// Retryable failures until the attempt limit
    FailedTransient,
}

/// Outcome of one deletion task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionResult {
    /// Target system
    pub target: TargetKind,
    /// Relationship id (`ucmdbId`)
    pub relationship_id: String,
    /// Forward-object relationship id, if any
    pub forward_object_id: Option<String>,
    /// Endpoint the request was (or would have been) sent to
    pub endpoint: String,
    /// Terminal status
    pub status: DeletionStatus,
    /// Attempts made; zero in simulation
    pub attempts: u32,
    /// Last HTTP status received, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Last error detail for failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-target counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Tasks planned
    pub total: usize,
    /// Tasks resolved without a request
    pub simulated: usize,
    /// Successful deletions
    pub succeeded: usize,
    /// Permanent failures
    pub failed_permanent: usize,
    /// Transient failures after all attempts
    pub failed_transient: usize,
}

impl ResultSummary {
    /// Count the statuses of a result list
    pub fn from_results(results: &[DeletionResult]) -> Self {
        results.iter().fold(
            Self {
                total: results.len(),
                ..Self::default()
            },
            |mut summary, result| {
                match result.status {
                    DeletionStatus::Simulated => summary.simulated += 1,
                    DeletionStatus::Success => summary.succeeded += 1,
                    DeletionStatus::FailedPermanent => summary.failed_permanent += 1,
                    DeletionStatus::FailedTransient => summary.failed_transient += 1,
                }
                summary
            },
        )
    }

    /// Failures of either kind
    pub fn failed(&self) -> usize {
        self.failed_permanent + self.failed_transient
    }
}

/// Pipeline stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Token acquisition
    Authenticate,
    /// Snapshot download or local read
    Download,
    /// Decode and classification
    Classify,
    /// Inventory deletions
    DeleteInventory,
    /// Service-desk deletions
    DeleteServiceDesk,
}

/// Event emitted during a reconciliation run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A stage began
    StageStarted {
        /// Stage
        stage: Stage,
    },

    /// A stage completed
    StageFinished {
        /// Stage
        stage: Stage,
        /// Wall-clock time spent
        duration_ms: u64,
    },

    /// Snapshot bytes received so far in the current attempt
    DownloadProgress {
        /// Attempt number (1-based)
        attempt: u32,
        /// Bytes received in this attempt
        bytes_received: u64,
    },

    /// A snapshot transfer attempt failed and will be retried
    DownloadRetry {
        /// Attempt that failed
        attempt: u32,
        /// Attempt limit
        max_attempts: u32,
        /// Failure description
        error: String,
        /// Delay before the next attempt
        delay_secs: u64,
    },

    /// The snapshot was truncated and repaired
    SnapshotRecovered {
        /// Bytes before repair
        original_bytes: u64,
        /// Bytes after repair
        recovered_bytes: u64,
    },

    /// Classification finished
    ClassificationComplete {
        /// Relationships with both NITs present
        processed: usize,
        /// Normal inconsistencies
        normal: usize,
        /// Particular inconsistencies
        particular: usize,
        /// Normal records eligible for the service desk
        downstream: usize,
    },

    /// A deletion task reached its terminal state
    TaskFinished {
        /// Target system
        target: TargetKind,
        /// Relationship id
        relationship_id: String,
        /// Terminal status
        status: DeletionStatus,
        /// Attempts made
        attempts: u32,
    },

    /// All tasks of a target are done
    TargetFinished {
        /// Target system
        target: TargetKind,
        /// Counts
        summary: ResultSummary,
    },
}

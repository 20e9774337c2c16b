//! Inventory snapshot decoding and indexing
//!
//! The topology report is a JSON object with two arrays, `cis` and `relations`.
//! Entries are decoded loosely, then promoted to validated
//! [`ConfigurationItem`]s and [`Relationship`]s; entries that cannot be promoted
//! are counted and dropped.

use crate::error::{Error, Result};
use crate::types::{ConfigurationItem, Relationship};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    cis: Vec<RawCi>,
    #[serde(default)]
    relations: Vec<RawRelation>,
}

#[derive(Debug, Deserialize)]
struct RawCi {
    #[serde(rename = "ucmdbId", default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    ci_type: Option<String>,
    #[serde(default)]
    properties: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    #[serde(rename = "ucmdbId", default)]
    id: Option<String>,
    #[serde(rename = "type", default)]
    rel_type: Option<String>,
    #[serde(rename = "end1Id", default)]
    end1: Option<String>,
    #[serde(rename = "end2Id", default)]
    end2: Option<String>,
}

/// Counts of entries dropped while decoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DecodeStats {
    /// CIs without a usable `ucmdbId`
    pub skipped_cis: usize,
    /// Relations without an id or an endpoint
    pub skipped_relations: usize,
    /// CIs whose id appeared earlier in the snapshot (later entry kept)
    pub duplicate_cis: usize,
}

/// Decoded, validated and indexed inventory snapshot
#[derive(Debug, Clone)]
pub struct Snapshot {
    cis: Vec<ConfigurationItem>,
    ci_index: HashMap<String, usize>,
    relationships: Vec<Relationship>,
    outgoing: HashMap<String, Vec<usize>>,
    stats: DecodeStats,
}

impl Snapshot {
    /// Decode a snapshot from raw JSON bytes
    ///
    /// Fails with [`Error::MalformedData`] when the bytes are not a JSON object
    /// of the expected shape, or when either array ends up empty.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_slice(bytes)
            .map_err(|e| Error::MalformedData(format!("snapshot does not decode: {e}")))?;

        let mut stats = DecodeStats::default();

        let cis: Vec<ConfigurationItem> = raw
            .cis
            .into_iter()
            .filter_map(|ci| {
                let properties = ci
                    .properties
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|(key, value)| property_text(value).map(|text| (key, text)))
                    .collect();
                match ConfigurationItem::new(
                    ci.id.unwrap_or_default(),
                    ci.ci_type.unwrap_or_default(),
                    properties,
                ) {
                    Ok(ci) => Some(ci),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping configuration item");
                        stats.skipped_cis += 1;
                        None
                    }
                }
            })
            .collect();

        let relationships: Vec<Relationship> = raw
            .relations
            .into_iter()
            .filter_map(|rel| {
                match Relationship::new(
                    rel.id.unwrap_or_default(),
                    rel.rel_type.unwrap_or_default(),
                    rel.end1.unwrap_or_default(),
                    rel.end2.unwrap_or_default(),
                ) {
                    Ok(rel) => Some(rel),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping relation");
                        stats.skipped_relations += 1;
                        None
                    }
                }
            })
            .collect();

        let mut snapshot = Self::from_parts(cis, relationships)?;
        snapshot.stats.skipped_cis = stats.skipped_cis;
        snapshot.stats.skipped_relations = stats.skipped_relations;

        if snapshot.stats != DecodeStats::default() {
            tracing::warn!(
                skipped_cis = snapshot.stats.skipped_cis,
                skipped_relations = snapshot.stats.skipped_relations,
                duplicate_cis = snapshot.stats.duplicate_cis,
                "snapshot contained unusable entries"
            );
        }
        Ok(snapshot)
    }

    /// Read and decode a snapshot stored on disk
    pub async fn from_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "loaded local snapshot");
        Self::from_slice(&bytes)
    }

    /// Assemble a snapshot from already validated records
    ///
    /// CI ids are unique afterwards: a repeated id replaces the earlier entry in place.
    pub fn from_parts(
        cis: Vec<ConfigurationItem>,
        relationships: Vec<Relationship>,
    ) -> Result<Self> {
        if cis.is_empty() {
            return Err(Error::MalformedData("snapshot has no CIs".to_string()));
        }
        if relationships.is_empty() {
            return Err(Error::MalformedData(
                "snapshot has no relations".to_string(),
            ));
        }

        let mut stats = DecodeStats::default();
        let mut unique: Vec<ConfigurationItem> = Vec::with_capacity(cis.len());
        let mut ci_index: HashMap<String, usize> = HashMap::with_capacity(cis.len());
        for ci in cis {
            match ci_index.get(ci.id()) {
                Some(&pos) => {
                    stats.duplicate_cis += 1;
                    unique[pos] = ci;
                }
                None => {
                    ci_index.insert(ci.id().to_string(), unique.len());
                    unique.push(ci);
                }
            }
        }

        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, rel) in relationships.iter().enumerate() {
            outgoing.entry(rel.end1().to_string()).or_default().push(pos);
            if let Some(&ci_pos) = ci_index.get(rel.end1()) {
                unique[ci_pos].push_relationship(rel.id().to_string());
            }
        }

        tracing::info!(
            cis = unique.len(),
            relations = relationships.len(),
            "snapshot integrity validated"
        );

        Ok(Self {
            cis: unique,
            ci_index,
            relationships,
            outgoing,
            stats,
        })
    }

    /// All CIs in snapshot order
    pub fn cis(&self) -> &[ConfigurationItem] {
        &self.cis
    }

    /// Look up a CI by id
    pub fn ci(&self, id: &str) -> Option<&ConfigurationItem> {
        self.ci_index.get(id).map(|&pos| &self.cis[pos])
    }

    /// All relationships in snapshot order
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Relationships whose `end1` is `ci_id`, in snapshot order
    pub fn outgoing(&self, ci_id: &str) -> impl Iterator<Item = &Relationship> + '_ {
        self.outgoing
            .get(ci_id)
            .into_iter()
            .flatten()
            .map(|&pos| &self.relationships[pos])
    }

    /// Entries dropped during decoding
    pub fn decode_stats(&self) -> DecodeStats {
        self.stats
    }
}

fn property_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

//! Relationship classification
//!
//! Walks the relationships leaving every CI of the configured types, compares
//! the NIT recorded on both ends and sorts mismatches into normal
//! (auto-deletable) and particular (manual review) inconsistencies. Normal
//! records are then linked to their forward object, which decides whether
//! the service desk holds a mirror of the relationship.
//!
//! Classification is a pure function of the snapshot: no I/O, no mutation,
//! and the same snapshot always yields the same ordered result.

mod enrich;
mod rule;

pub use enrich::ContainmentIndex;
pub use rule::{InconsistencyRule, NitMismatchRule};

use crate::config::ClassifierConfig;
use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::types::{Endpoint, InconsistencyKind, InconsistencyRecord};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Counters gathered during classification
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationStats {
    /// CIs that passed the type filter
    pub filtered_cis: usize,
    /// Relationships with both CIs and both NITs present
    pub processed: usize,
    /// Relationships skipped because `end2` is not in the snapshot
    pub missing_nodes: usize,
    /// Relationships skipped because a NIT is absent
    pub missing_nits: usize,
    /// Relationship ids seen more than once
    pub duplicates: usize,
}

/// Result of classifying a snapshot
#[derive(Clone, Debug, Default, Serialize)]
pub struct Classification {
    /// Inconsistencies safe to delete, in traversal order
    pub normal: Vec<InconsistencyRecord>,
    /// Inconsistencies left for manual review
    pub particular: Vec<InconsistencyRecord>,
    /// Counters
    pub stats: ClassificationStats,
}

impl Classification {
    /// Normal records that also exist in the service desk, in normal-set order
    pub fn downstream_subset(&self) -> Vec<&InconsistencyRecord> {
        self.normal
            .iter()
            .filter(|record| record.is_downstream_eligible())
            .collect()
    }
}

/// Classifies snapshot relationships with a pluggable rule
#[derive(Clone)]
pub struct Classifier {
    config: ClassifierConfig,
    rule: Arc<dyn InconsistencyRule>,
}

impl Classifier {
    /// Classifier using [`NitMismatchRule`]
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_rule(config, NitMismatchRule)
    }

    /// Classifier using a custom rule
    pub fn with_rule(config: ClassifierConfig, rule: impl InconsistencyRule + 'static) -> Self {
        Self {
            config,
            rule: Arc::new(rule),
        }
    }

    /// Classify every relationship leaving a CI of an included type
    pub fn classify(&self, snapshot: &Snapshot) -> Result<Classification> {
        let include: HashSet<&str> = self
            .config
            .include_types
            .iter()
            .map(String::as_str)
            .collect();
        let containment = ContainmentIndex::build(
            snapshot,
            &self.config.containment_type,
            &self.config.forward_object_types,
        );

        let mut result = Classification::default();
        let mut seen: HashSet<&str> = HashSet::new();

        let sources: Vec<_> = snapshot
            .cis()
            .iter()
            .filter(|ci| include.is_empty() || include.contains(ci.ci_type()))
            .collect();
        result.stats.filtered_cis = sources.len();
        tracing::info!(
            filtered = sources.len(),
            total = snapshot.cis().len(),
            containments = containment.len(),
            "classifying relationships"
        );

        let report_every = (sources.len() / 5).max(1);
        for (idx, ci) in sources.iter().enumerate() {
            if (idx + 1) % report_every == 0 {
                tracing::debug!(
                    done = idx + 1,
                    of = sources.len(),
                    normal = result.normal.len(),
                    particular = result.particular.len(),
                    "classification progress"
                );
            }

            for rel in snapshot.outgoing(ci.id()) {
                if !seen.insert(rel.id()) {
                    result.stats.duplicates += 1;
                    continue;
                }
                let Some(target) = snapshot.ci(rel.end2()) else {
                    result.stats.missing_nodes += 1;
                    continue;
                };
                let (Some(nit_end1), Some(nit_end2)) = (
                    ci.nit(&self.config.nit_field_end1),
                    target.nit(&self.config.nit_field_end2),
                ) else {
                    result.stats.missing_nits += 1;
                    continue;
                };
                result.stats.processed += 1;

                let Some(kind) = self.rule.evaluate(nit_end1, nit_end2) else {
                    continue;
                };
                let record = InconsistencyRecord::new(
                    rel.id(),
                    kind,
                    Endpoint::from_ci(ci, nit_end1),
                    Endpoint::from_ci(target, nit_end2),
                )?;

                match kind {
                    InconsistencyKind::Normal => result
                        .normal
                        .push(record.with_forward_object(containment.forward_object_for(rel.end2()))),
                    InconsistencyKind::Particular => result.particular.push(
                        record.with_containment_parent(
                            containment.containment_of(rel.end2()).map(|c| c.end1()),
                        ),
                    ),
                }
            }
        }

        tracing::info!(
            processed = result.stats.processed,
            normal = result.normal.len(),
            particular = result.particular.len(),
            downstream = result.downstream_subset().len(),
            missing_nodes = result.stats.missing_nodes,
            missing_nits = result.stats.missing_nits,
            duplicates = result.stats.duplicates,
            "classification complete"
        );

        Ok(result)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfigurationItem, Relationship};
    use std::collections::HashMap;

    const SOURCE: &str = "clr_onyxservicecodes";
    const NIT1: &str = "clr_onyxdb_company_nit";
    const NIT2: &str = "clr_onyxdb_companynit";

    fn ci(id: &str, ci_type: &str, props: &[(&str, &str)]) -> ConfigurationItem {
        let properties: HashMap<String, String> = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigurationItem::new(id, ci_type, properties).unwrap()
    }

    fn rel(id: &str, rel_type: &str, end1: &str, end2: &str) -> Relationship {
        Relationship::new(id, rel_type, end1, end2).unwrap()
    }

    /// s1 -> c1 (numeric mismatch, FO-contained)
    /// s1 -> c2 (numeric mismatch, container is not an FO)
    /// s2 -> c3 (letter in NIT, contained by p1)
    /// s2 -> c4 (consistent)
    fn sample() -> Snapshot {
        let cis = vec![
            ci("s1", SOURCE, &[(NIT1, " 900111 ")]),
            ci("s2", SOURCE, &[(NIT1, "900222")]),
            ci("c1", "clr_onyxdb", &[(NIT2, "800111"), ("display_label", "C1")]),
            ci("c2", "clr_onyxdb", &[(NIT2, "800222")]),
            ci("c3", "clr_onyxdb", &[(NIT2, "NIT-X")]),
            ci("c4", "clr_onyxdb", &[(NIT2, "900222")]),
            ci("fo1", "clr_service_catalog_fo_e", &[]),
            ci("p1", "clr_service_catalog", &[]),
        ];
        let rels = vec![
            rel("r1", "usage", "s1", "c1"),
            rel("r2", "usage", "s1", "c2"),
            rel("r3", "usage", "s2", "c3"),
            rel("r4", "usage", "s2", "c4"),
            rel("k1", "containment", "fo1", "c1"),
            rel("k2", "containment", "p1", "c2"),
            rel("k3", "containment", "p1", "c3"),
        ];
        Snapshot::from_parts(cis, rels).unwrap()
    }

    fn ids(records: &[InconsistencyRecord]) -> Vec<&str> {
        records.iter().map(|r| r.relationship_id()).collect()
    }

    #[test]
    fn splits_normal_and_particular() {
        let result = Classifier::new(ClassifierConfig::default())
            .classify(&sample())
            .unwrap();

        assert_eq!(ids(&result.normal), ["r1", "r2"]);
        assert_eq!(ids(&result.particular), ["r3"]);
        assert_eq!(result.stats.processed, 4);
        assert_eq!(result.stats.filtered_cis, 2);

        let r1 = &result.normal[0];
        assert_eq!(r1.nits(), ("900111", "800111"), "NITs are trimmed");
        assert_eq!(r1.labels(), ("N/A", "C1"));
        assert_eq!((r1.end1_id(), r1.end2_id()), ("s1", "c1"));

        let r3 = &result.particular[0];
        assert_eq!((r3.end1_id(), r3.end2_id()), ("s2", "c3"));
    }

    #[test]
    fn forward_object_links_only_for_fo_containers() {
        let result = Classifier::new(ClassifierConfig::default())
            .classify(&sample())
            .unwrap();

        let r1 = &result.normal[0];
        assert!(r1.has_forward_link());
        assert_eq!(r1.forward_object_id(), Some("k1"));

        let r2 = &result.normal[1];
        assert!(!r2.has_forward_link());
        assert_eq!(r2.forward_object_id(), None);

        let downstream: Vec<_> = result
            .downstream_subset()
            .iter()
            .map(|r| r.relationship_id())
            .collect();
        assert_eq!(downstream, ["r1"]);
    }

    #[test]
    fn particular_records_name_their_container() {
        let result = Classifier::new(ClassifierConfig::default())
            .classify(&sample())
            .unwrap();
        assert_eq!(result.particular[0].containment_parent(), Some("p1"));
        assert!(!result.particular[0].has_forward_link());
    }

    #[test]
    fn missing_nodes_and_nits_are_counted() {
        let cis = vec![
            ci("s1", SOURCE, &[(NIT1, "1")]),
            ci("s2", SOURCE, &[]),
            ci("c1", "x", &[(NIT2, "2")]),
            ci("c2", "x", &[]),
        ];
        let rels = vec![
            rel("r1", "usage", "s1", "ghost"),
            rel("r2", "usage", "s1", "c2"),
            rel("r3", "usage", "s2", "c1"),
            rel("r4", "usage", "s1", "c1"),
        ];
        let snapshot = Snapshot::from_parts(cis, rels).unwrap();
        let result = Classifier::new(ClassifierConfig::default())
            .classify(&snapshot)
            .unwrap();

        assert_eq!(result.stats.missing_nodes, 1);
        assert_eq!(result.stats.missing_nits, 2);
        assert_eq!(result.stats.processed, 1);
        assert_eq!(ids(&result.normal), ["r4"]);
    }

    #[test]
    fn type_filter_limits_sources() {
        let cis = vec![
            ci("s1", SOURCE, &[(NIT1, "1")]),
            ci("o1", "other", &[(NIT1, "3")]),
            ci("c1", "x", &[(NIT2, "2")]),
        ];
        let rels = vec![
            rel("r1", "usage", "o1", "c1"),
            rel("r2", "usage", "s1", "c1"),
        ];
        let snapshot = Snapshot::from_parts(cis, rels).unwrap();

        let filtered = Classifier::new(ClassifierConfig::default())
            .classify(&snapshot)
            .unwrap();
        assert_eq!(ids(&filtered.normal), ["r2"]);

        let config = ClassifierConfig {
            include_types: Vec::new(),
            ..ClassifierConfig::default()
        };
        let all = Classifier::new(config).classify(&snapshot).unwrap();
        assert_eq!(ids(&all.normal), ["r2", "r1"], "CI order drives output order");
    }

    #[test]
    fn last_containment_wins() {
        let cis = vec![
            ci("s1", SOURCE, &[(NIT1, "1")]),
            ci("c1", "x", &[(NIT2, "2")]),
            ci("fo1", "clr_service_catalog_fo_n", &[]),
            ci("fo2", "clr_service_catalog_fo_cloud", &[]),
        ];
        let rels = vec![
            rel("r1", "usage", "s1", "c1"),
            rel("k1", "containment", "fo1", "c1"),
            rel("k2", "containment", "fo2", "c1"),
        ];
        let snapshot = Snapshot::from_parts(cis, rels).unwrap();
        let result = Classifier::new(ClassifierConfig::default())
            .classify(&snapshot)
            .unwrap();
        assert_eq!(result.normal[0].forward_object_id(), Some("k2"));
    }

    #[test]
    fn duplicate_relationship_ids_emitted_once() {
        let cis = vec![
            ci("s1", SOURCE, &[(NIT1, "1")]),
            ci("c1", "x", &[(NIT2, "2")]),
        ];
        let rels = vec![
            rel("r1", "usage", "s1", "c1"),
            rel("r1", "usage", "s1", "c1"),
        ];
        let snapshot = Snapshot::from_parts(cis, rels).unwrap();
        let result = Classifier::new(ClassifierConfig::default())
            .classify(&snapshot)
            .unwrap();

        assert_eq!(result.normal.len(), 1);
        assert_eq!(result.stats.duplicates, 1);
    }

    #[test]
    fn classification_is_deterministic() {
        let snapshot = sample();
        let classifier = Classifier::new(ClassifierConfig::default());

        let first = classifier.classify(&snapshot).unwrap();
        let second = classifier.classify(&snapshot).unwrap();
        assert_eq!(first.normal, second.normal);
        assert_eq!(first.particular, second.particular);
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn custom_rule_is_honoured() {
        struct EverythingParticular;
        impl InconsistencyRule for EverythingParticular {
            fn evaluate(&self, a: &str, b: &str) -> Option<InconsistencyKind> {
                (a != b).then_some(InconsistencyKind::Particular)
            }
        }

        let result = Classifier::with_rule(ClassifierConfig::default(), EverythingParticular)
            .classify(&sample())
            .unwrap();
        assert!(result.normal.is_empty());
        assert_eq!(result.particular.len(), 3);
        assert!(result.downstream_subset().is_empty());
    }
}

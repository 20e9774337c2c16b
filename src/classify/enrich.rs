//! Forward-object lookup
//!
//! A relationship is mirrored in the service desk when the CI at its `end2`
//! is contained by a service-catalog forward object. The containment
//! relationship's id is what the service desk keys the mirror under.

use crate::snapshot::Snapshot;
use crate::types::Relationship;
use std::collections::{HashMap, HashSet};

/// Containment relationships indexed by `end2`
pub struct ContainmentIndex<'a> {
    by_end2: HashMap<&'a str, &'a Relationship>,
    forward_types: HashSet<&'a str>,
    snapshot: &'a Snapshot,
}

impl<'a> ContainmentIndex<'a> {
    /// Index every relationship of `containment_type`; a later one replaces an
    /// earlier one with the same `end2`
    pub fn build(
        snapshot: &'a Snapshot,
        containment_type: &str,
        forward_object_types: &'a [String],
    ) -> Self {
        let by_end2 = snapshot
            .relationships()
            .iter()
            .filter(|rel| rel.rel_type() == containment_type)
            .map(|rel| (rel.end2(), rel))
            .collect();
        Self {
            by_end2,
            forward_types: forward_object_types.iter().map(String::as_str).collect(),
            snapshot,
        }
    }

    /// Containment relationship whose `end2` is `ci_id`
    pub fn containment_of(&self, ci_id: &str) -> Option<&'a Relationship> {
        self.by_end2.get(ci_id).copied()
    }

    /// Id of the forward-object containment for `ci_id`, if its container is a
    /// forward-object CI
    pub fn forward_object_for(&self, ci_id: &str) -> Option<&'a str> {
        let containment = self.containment_of(ci_id)?;
        let container = self.snapshot.ci(containment.end1())?;
        self.forward_types
            .contains(container.ci_type())
            .then_some(containment.id())
    }

    /// Number of indexed containment relationships
    pub fn len(&self) -> usize {
        self.by_end2.len()
    }

    /// True when the snapshot has no containment relationships
    pub fn is_empty(&self) -> bool {
        self.by_end2.is_empty()
    }
}

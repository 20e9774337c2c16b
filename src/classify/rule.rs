//! Inconsistency rules

use crate::types::InconsistencyKind;

/// Decides whether a pair of normalized NITs is inconsistent, and how
pub trait InconsistencyRule: Send + Sync {
    /// `None` when the relationship is consistent
    fn evaluate(&self, nit_end1: &str, nit_end2: &str) -> Option<InconsistencyKind>;
}

/// Default rule: differing NITs are an inconsistency
///
/// A NIT containing any alphabetic character is not a plain numeric tax id,
/// so a mismatch involving one is [`InconsistencyKind::Particular`] and left
/// for manual review. Purely numeric mismatches are
/// [`InconsistencyKind::Normal`].
#[derive(Clone, Copy, Debug, Default)]
pub struct NitMismatchRule;

impl InconsistencyRule for NitMismatchRule {
    fn evaluate(&self, nit_end1: &str, nit_end2: &str) -> Option<InconsistencyKind> {
        if nit_end1 == nit_end2 {
            return None;
        }
        if has_letters(nit_end1) || has_letters(nit_end2) {
            Some(InconsistencyKind::Particular)
        } else {
            Some(InconsistencyKind::Normal)
        }
    }
}

fn has_letters(s: &str) -> bool {
    s.chars().any(char::is_alphabetic)
}

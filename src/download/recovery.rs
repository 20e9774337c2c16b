//! Truncated JSON recovery
//!
//! A transfer that dies mid-body leaves a prefix of a valid document. The
//! scanner below walks that prefix once, remembering where array elements
//! end, and rebuilds the longest prefix that can be closed into a
//! well-formed document.

use crate::error::{Error, Result};
use std::collections::VecDeque;

/// Cut points retained while scanning; only the most recent ones matter
const CANDIDATE_WINDOW: usize = 16;

/// Check that `bytes` is one complete JSON document
pub fn is_well_formed(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok()
}

#[derive(Debug)]
struct Candidate {
    /// Bytes kept from the input
    cut: usize,
    /// Open containers at the cut, innermost last
    open: Vec<u8>,
}

impl Candidate {
    fn repaired_len(&self) -> usize {
        self.cut + self.open.len()
    }

    fn build(&self, bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.repaired_len());
        out.extend_from_slice(&bytes[..self.cut]);
        out.extend(self.open.iter().rev().map(|&c| match c {
            b'{' => b'}',
            _ => b']',
        }));
        out
    }
}

/// Repair a truncated JSON buffer
///
/// Cuts `bytes` at its last complete array-element boundary and closes every
/// container still open there. The result is strictly shorter than the input
/// and parses as JSON; it contains only elements that were complete in the
/// input. Fails with [`Error::MalformedData`] when no such boundary exists.
///
/// The length check counts the closing brackets added by the repair. A cut
/// landing zero to two bytes past the last complete element (`...{"b":2}`,
/// `...{"b":2},` or `...{"b":2},{`) would grow the buffer, so that element is
/// dropped as well and the previous boundary is used.
///
/// Callers should check [`is_well_formed`] first: a complete document is
/// never returned unchanged.
pub fn recover_truncated(bytes: &[u8]) -> Result<Vec<u8>> {
    let candidates = scan_boundaries(bytes);

    for candidate in candidates.iter().rev() {
        if candidate.repaired_len() >= bytes.len() {
            continue;
        }
        let repaired = candidate.build(bytes);
        if is_well_formed(&repaired) {
            tracing::debug!(
                original = bytes.len(),
                repaired = repaired.len(),
                depth = candidate.open.len(),
                "repaired truncated payload"
            );
            return Ok(repaired);
        }
    }

    Err(Error::MalformedData(format!(
        "no complete element boundary in {} bytes",
        bytes.len()
    )))
}

fn scan_boundaries(bytes: &[u8]) -> VecDeque<Candidate> {
    let mut candidates: VecDeque<Candidate> = VecDeque::with_capacity(CANDIDATE_WINDOW);
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    let mut remember = |cut: usize, open: &[u8]| {
        if candidates.len() == CANDIDATE_WINDOW {
            candidates.pop_front();
        }
        candidates.push_back(Candidate {
            cut,
            open: open.to_vec(),
        });
    };

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(b),
            b'}' | b']' => {
                let expected = if b == b'}' { b'{' } else { b'[' };
                if stack.pop() != Some(expected) {
                    // Structure is broken from here on
                    break;
                }
                if stack.last() == Some(&b'[') {
                    remember(i + 1, &stack);
                }
            }
            b',' if stack.last() == Some(&b'[') => remember(i, &stack),
            _ => {}
        }
    }

    candidates
}

//! Member selection strategies
//!
//! A strategy only orders candidates. Claiming the chosen member's slot stays
//! with the pool, so a strategy can never double-book a member.

use super::member::MemberSnapshot;

/// Orders model-qualified candidates by preference
pub trait SelectionStrategy: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &str;

    /// Return candidate indices in the order they should be tried.
    ///
    /// `candidates` is in registration order and already filtered to members
    /// serving the requested model. Indices that are omitted are not tried.
    fn rank(&self, candidates: &[MemberSnapshot]) -> Vec<usize>;
}

/// First non-busy member in registration order.
///
/// Not load or latency aware.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstAvailable;

impl SelectionStrategy for FirstAvailable {
    fn name(&self) -> &str {
        "first_available"
    }

    fn rank(&self, candidates: &[MemberSnapshot]) -> Vec<usize> {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.busy)
            .map(|(i, _)| i)
            .collect()
    }
}

use std::cmp::Ordering;

use crate::barcode::IdentityIndex;

// Entry of the greedy matcher's max-heap: the best edge pops first.
// Best means higher score, then higher decode confidence, then lower identity index, then lower candidate index.
#[derive(Debug, Clone, Copy)]
pub struct ScoredEdge {
    pub score: f32,
    pub confidence: f32,
    pub identity: IdentityIndex,
    pub candidate: usize,
    /// Position of the edge in the resolver's edge list
    pub edge: usize,
}

impl PartialEq for ScoredEdge {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredEdge {}

impl PartialOrd for ScoredEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.confidence.total_cmp(&other.confidence))
            .then(other.identity.cmp(&self.identity))
            .then(other.candidate.cmp(&self.candidate))
    }
}

use itertools::Itertools;
use pathfinding::{matrix::Matrix, prelude::kuhn_munkres};
use serde::Serialize;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, warn};

use crate::barcode::{CandidateBarcode, IdentityIndex, LabelOption};
use crate::mot::{MatchingAlgorithm, ScoredEdge, TrackerConfig};
use crate::utils::{euclidean_distance, Point};

// Quantization of the matching score; scores closer than this are ties
const SCORE_SCALE: f32 = 10_000.0;
const CONFIDENCE_SCALE: f32 = 100.0;

/// Where an identity is expected on the frame being resolved
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IdentityPrediction {
    pub identity: IdentityIndex,
    /// `None` when the identity was never seen or has been lost for too long
    pub position: Option<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectionReason {
    /// Decode confidence below the acceptance threshold
    LowConfidence,
    /// Farther from the predicted position than an individual can move in one frame
    BeyondCutoff,
    /// Valid pairing that lost to a better one
    Outmatched,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedMatch {
    pub identity: IdentityIndex,
    pub candidate: usize,
    pub reason: RejectionReason,
    pub confidence: f32,
    pub distance: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAssignment {
    pub identity: IdentityIndex,
    /// Index of the candidate in the frame's candidate list
    pub candidate: usize,
    pub option: LabelOption,
    pub distance: Option<f32>,
    pub score: f32,
}

/// Fully specified outcome of one frame: every identity is either assigned or missing
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FrameResolution {
    pub frame: usize,
    /// Sorted by identity
    pub assignments: Vec<FrameAssignment>,
    pub missing: Vec<IdentityIndex>,
    /// Decoded candidates that were not given to any identity
    pub unmatched_candidates: Vec<usize>,
    /// Candidates matching no catalog entry
    pub undecoded_candidates: Vec<usize>,
    pub rejected: Vec<RejectedMatch>,
}

impl FrameResolution {
    pub fn assignment_for(&self, identity: IdentityIndex) -> Option<&FrameAssignment> {
        self.assignments
            .binary_search_by_key(&identity, |a| a.identity)
            .ok()
            .map(|idx| &self.assignments[idx])
    }
}

#[derive(Debug, Clone)]
struct Edge {
    identity: IdentityIndex,
    candidate: usize,
    option: usize,
    confidence: f32,
    distance: Option<f32>,
    score: f32,
}

/// Weighted bipartite matching between identities and one frame's candidate barcodes
#[derive(Debug, Clone)]
pub struct FrameResolver {
    max_displacement: f32,
    min_confidence: f32,
    confidence_weight: f32,
    distance_weight: f32,
    algorithm: MatchingAlgorithm,
}

impl FrameResolver {
    pub fn new(config: &TrackerConfig) -> Self {
        FrameResolver {
            max_displacement: config.max_displacement,
            min_confidence: config.min_confidence,
            confidence_weight: config.confidence_weight,
            distance_weight: config.distance_weight,
            algorithm: config.algorithm,
        }
    }

    /// Matching score in [0, 1] of a label option: weighted mix of decode confidence and closeness to the prediction.
    /// Identities without a prediction get no closeness credit.
    pub fn score(&self, confidence: f32, distance: Option<f32>) -> f32 {
        let closeness = distance
            .map(|d| 1.0 / (1.0 + d / self.max_displacement))
            .unwrap_or(0.0);
        (self.confidence_weight * confidence + self.distance_weight * closeness)
            / (self.confidence_weight + self.distance_weight)
    }

    /// Assigns at most one candidate to every identity and every candidate to at most one identity
    pub fn resolve(
        &self,
        frame: usize,
        candidates: &[CandidateBarcode],
        predictions: &[IdentityPrediction],
    ) -> FrameResolution {
        let (edges, mut rejected) = self.build_edges(candidates, predictions);
        let chosen = match self.algorithm {
            MatchingAlgorithm::Hungarian => self.perform_hungarian(&edges),
            MatchingAlgorithm::Greedy => self.perform_greedy(&edges),
        };
        let chosen: HashSet<usize> = chosen.into_iter().collect();

        let mut assignments: Vec<FrameAssignment> = Vec::with_capacity(chosen.len());
        for (idx, edge) in edges.iter().enumerate() {
            if chosen.contains(&idx) {
                assignments.push(FrameAssignment {
                    identity: edge.identity,
                    candidate: edge.candidate,
                    option: candidates[edge.candidate].labels.options()[edge.option].clone(),
                    distance: edge.distance,
                    score: edge.score,
                });
            } else {
                rejected.push(RejectedMatch {
                    identity: edge.identity,
                    candidate: edge.candidate,
                    reason: RejectionReason::Outmatched,
                    confidence: edge.confidence,
                    distance: edge.distance,
                });
            }
        }
        assignments.sort_by_key(|a| a.identity);

        let assigned_identities: HashSet<IdentityIndex> =
            assignments.iter().map(|a| a.identity).collect();
        let assigned_candidates: HashSet<usize> =
            assignments.iter().map(|a| a.candidate).collect();
        let missing: Vec<IdentityIndex> = predictions
            .iter()
            .map(|p| p.identity)
            .filter(|id| !assigned_identities.contains(id))
            .sorted()
            .collect();
        let unmatched_candidates: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(idx, c)| c.is_decoded() && !assigned_candidates.contains(idx))
            .map(|(idx, _)| idx)
            .collect();
        let undecoded_candidates: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_decoded())
            .map(|(idx, _)| idx)
            .collect();
        rejected.sort_by_key(|r| (r.candidate, r.identity));

        debug!(
            frame,
            candidates = candidates.len(),
            assigned = assignments.len(),
            missing = missing.len(),
            undecoded = undecoded_candidates.len(),
            "frame resolved"
        );
        FrameResolution {
            frame,
            assignments,
            missing,
            unmatched_candidates,
            undecoded_candidates,
            rejected,
        }
    }

    fn build_edges(
        &self,
        candidates: &[CandidateBarcode],
        predictions: &[IdentityPrediction],
    ) -> (Vec<Edge>, Vec<RejectedMatch>) {
        let predicted: HashMap<IdentityIndex, Option<Point>> = predictions
            .iter()
            .map(|p| (p.identity, p.position))
            .collect();
        let mut edges = Vec::new();
        let mut rejected = Vec::new();
        for (candidate_idx, candidate) in candidates.iter().enumerate() {
            for (option_idx, option) in candidate.labels.options().iter().enumerate() {
                let prediction = match predicted.get(&option.identity) {
                    Some(prediction) => prediction,
                    None => continue,
                };
                let distance = prediction.map(|p| euclidean_distance(&p, &option.position));
                let reason = if option.confidence < self.min_confidence {
                    Some(RejectionReason::LowConfidence)
                } else {
                    match distance {
                        Some(d) if d > self.max_displacement => Some(RejectionReason::BeyondCutoff),
                        _ => None,
                    }
                };
                if let Some(reason) = reason {
                    rejected.push(RejectedMatch {
                        identity: option.identity,
                        candidate: candidate_idx,
                        reason,
                        confidence: option.confidence,
                        distance,
                    });
                    continue;
                }
                edges.push(Edge {
                    identity: option.identity,
                    candidate: candidate_idx,
                    option: option_idx,
                    confidence: option.confidence,
                    distance,
                    score: self.score(option.confidence, distance),
                });
            }
        }
        (edges, rejected)
    }

    // Maximum-weight matching. The integer weight encodes, in decreasing significance:
    // the quantized score, the quantized confidence and a bonus for lower identity indices.
    fn perform_hungarian(&self, edges: &[Edge]) -> Vec<usize> {
        if edges.is_empty() {
            return Vec::new();
        }
        let rows: Vec<IdentityIndex> = edges.iter().map(|e| e.identity).sorted().dedup().collect();
        let cols: Vec<usize> = edges.iter().map(|e| e.candidate).sorted().dedup().collect();
        let row_of: HashMap<IdentityIndex, usize> =
            rows.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let col_of: HashMap<usize, usize> = cols.iter().enumerate().map(|(i, c)| (*c, i)).collect();
        let num_rows = rows.len();
        // Ensure we have at least as many columns as rows for Hungarian
        let padded_cols = cols.len().max(num_rows);

        let (confidence_mult, score_mult) = match packed_weight_scales(num_rows) {
            Some(scales) => scales,
            None => {
                warn!(
                    identities = num_rows,
                    "packed weights would overflow, falling back to greedy matching"
                );
                return self.perform_greedy(edges);
            }
        };
        let n = num_rows as i64;

        let mut weights = vec![0i64; num_rows * padded_cols];
        let mut edge_at: Vec<Option<usize>> = vec![None; num_rows * padded_cols];
        for (idx, edge) in edges.iter().enumerate() {
            let (row, col) = match (row_of.get(&edge.identity), col_of.get(&edge.candidate)) {
                (Some(r), Some(c)) => (*r, *c),
                _ => continue,
            };
            let score_q = (edge.score.clamp(0.0, 1.0) * SCORE_SCALE).round() as i64;
            let confidence_q = (edge.confidence.clamp(0.0, 1.0) * CONFIDENCE_SCALE).round() as i64;
            let rank_bonus = n - row as i64;
            weights[row * padded_cols + col] =
                score_q * score_mult + confidence_q * confidence_mult + rank_bonus;
            edge_at[row * padded_cols + col] = Some(idx);
        }
        let weight_matrix = match Matrix::from_vec(num_rows, padded_cols, weights) {
            Ok(matrix) => matrix,
            Err(_) => return self.perform_greedy(edges),
        };
        let (_, assignments) = kuhn_munkres(&weight_matrix);
        // Filter out dummy and disallowed assignments
        assignments
            .iter()
            .enumerate()
            .filter_map(|(row, &col)| edge_at[row * padded_cols + col])
            .collect()
    }

    fn perform_greedy(&self, edges: &[Edge]) -> Vec<usize> {
        let mut priority_queue: BinaryHeap<ScoredEdge> = edges
            .iter()
            .enumerate()
            .map(|(idx, e)| ScoredEdge {
                score: e.score,
                confidence: e.confidence,
                identity: e.identity,
                candidate: e.candidate,
                edge: idx,
            })
            .collect();
        let mut reserved_identities: HashSet<IdentityIndex> = HashSet::new();
        let mut reserved_candidates: HashSet<usize> = HashSet::new();
        let mut matches = Vec::new();
        while let Some(best) = priority_queue.pop() {
            if reserved_identities.contains(&best.identity)
                || reserved_candidates.contains(&best.candidate)
            {
                continue;
            }
            reserved_identities.insert(best.identity);
            reserved_candidates.insert(best.candidate);
            matches.push(best.edge);
        }
        matches
    }
}

/// Multipliers packing score, confidence and rank bonus of an edge into one weight,
/// so that the Hungarian total orders by score sum first, then confidence sum, then rank.
/// `None` when the total of `rows` weights (with headroom for the solver's labels) would overflow `i64`.
fn packed_weight_scales(rows: usize) -> Option<(i64, i64)> {
    let n = i64::try_from(rows).ok()?;
    let confidence_scale = CONFIDENCE_SCALE as i64;
    let confidence_mult = n.checked_mul(n)?.checked_add(1)?;
    let score_mult = confidence_scale
        .checked_mul(confidence_mult)?
        .checked_add(n)?
        .checked_mul(n)?
        .checked_add(1)?;
    let max_weight = (SCORE_SCALE as i64)
        .checked_mul(score_mult)?
        .checked_add(confidence_scale.checked_mul(confidence_mult)?)?
        .checked_add(n)?;
    max_weight.checked_mul(n)?.checked_mul(2)?;
    Some((confidence_mult, score_mult))
}

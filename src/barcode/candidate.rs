use serde::Serialize;

use crate::barcode::IdentityIndex;
use crate::utils::Point;

/// One plausible reading of a candidate barcode as a catalog identity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelOption {
    pub identity: IdentityIndex,
    /// Decode confidence in [0, 1]
    pub confidence: f32,
    /// Estimated barcode center (corrected for a missing chip)
    pub position: Point,
    /// Radians, pointing towards chip 0
    pub orientation: f32,
    /// Blob index (within the frame) for every chip position, `None` where the chip was not found
    pub chips: Vec<Option<usize>>,
    pub missing: usize,
    pub mismatched: usize,
}

impl LabelOption {
    pub fn defects(&self) -> usize {
        self.missing + self.mismatched
    }
    pub fn blob_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.chips.iter().flatten().copied()
    }
    pub fn shares_blob_with(&self, other: &LabelOption) -> bool {
        self.blob_indices()
            .any(|a| other.blob_indices().any(|b| a == b))
    }
}

/// Decoded identity information of a candidate barcode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CandidateLabels {
    /// Matches no catalog entry (too few blobs or unknown color combination)
    Unlabeled,
    SingleLabel(LabelOption),
    /// Several identities are plausible on the same blobs
    MultiLabel(Vec<LabelOption>),
}

impl CandidateLabels {
    pub fn from_options(mut options: Vec<LabelOption>) -> Self {
        match options.len() {
            0 => CandidateLabels::Unlabeled,
            1 => CandidateLabels::SingleLabel(options.remove(0)),
            _ => CandidateLabels::MultiLabel(options),
        }
    }
    pub fn options(&self) -> &[LabelOption] {
        match self {
            CandidateLabels::Unlabeled => &[],
            CandidateLabels::SingleLabel(option) => std::slice::from_ref(option),
            CandidateLabels::MultiLabel(options) => options,
        }
    }
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, CandidateLabels::MultiLabel(_))
    }
}

/// Spatially coherent group of blobs on one frame together with its decoded identities.
/// Created fresh on every frame and consumed by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateBarcode {
    pub frame: usize,
    pub blob_indices: Vec<usize>,
    /// Centroid of the candidate blobs
    pub centroid: Point,
    pub labels: CandidateLabels,
}

impl CandidateBarcode {
    pub fn is_decoded(&self) -> bool {
        !matches!(self.labels, CandidateLabels::Unlabeled)
    }
    pub fn option_for(&self, identity: IdentityIndex) -> Option<&LabelOption> {
        self.labels.options().iter().find(|o| o.identity == identity)
    }
    pub fn identities(&self) -> Vec<IdentityIndex> {
        self.labels.options().iter().map(|o| o.identity).collect()
    }
}

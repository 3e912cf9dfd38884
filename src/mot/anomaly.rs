use serde::Serialize;
use std::fmt;

use crate::barcode::IdentityIndex;
use crate::mot::RejectionReason;
use crate::utils::Point;

/// Frame-level irregularity kept for diagnostics. Never interrupts processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Anomaly {
    /// Cluster matching no catalog entry
    UndecodedCandidate {
        frame: usize,
        position: Point,
        blobs: usize,
    },
    /// Cluster readable as several identities
    AmbiguousCandidate {
        frame: usize,
        position: Point,
        identities: Vec<IdentityIndex>,
    },
    RejectedMatch {
        frame: usize,
        identity: IdentityIndex,
        reason: RejectionReason,
        confidence: f32,
        distance: Option<f32>,
    },
    /// Decoded candidate that no identity took
    UnmatchedCandidate { frame: usize, position: Point },
    SustainedLoss {
        identity: IdentityIndex,
        first_frame: usize,
        frames: usize,
    },
    Reacquired {
        identity: IdentityIndex,
        frame: usize,
        missed_frames: usize,
    },
}

impl Anomaly {
    pub fn frame(&self) -> usize {
        match self {
            Anomaly::UndecodedCandidate { frame, .. }
            | Anomaly::AmbiguousCandidate { frame, .. }
            | Anomaly::RejectedMatch { frame, .. }
            | Anomaly::UnmatchedCandidate { frame, .. }
            | Anomaly::Reacquired { frame, .. } => *frame,
            Anomaly::SustainedLoss { first_frame, .. } => *first_frame,
        }
    }
}

/// Per-kind anomaly counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AnomalySummary {
    pub undecoded: usize,
    pub ambiguous: usize,
    pub low_confidence: usize,
    pub beyond_cutoff: usize,
    pub outmatched: usize,
    pub unmatched: usize,
    pub sustained_losses: usize,
    pub reacquisitions: usize,
}

impl AnomalySummary {
    pub fn total(&self) -> usize {
        self.undecoded
            + self.ambiguous
            + self.low_confidence
            + self.beyond_cutoff
            + self.outmatched
            + self.unmatched
            + self.sustained_losses
            + self.reacquisitions
    }
}

impl fmt::Display for AnomalySummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "undecoded: {}, ambiguous: {}, rejected (low confidence / cutoff / outmatched): {} / {} / {}, unmatched: {}, sustained losses: {}, reacquisitions: {}",
            self.undecoded,
            self.ambiguous,
            self.low_confidence,
            self.beyond_cutoff,
            self.outmatched,
            self.unmatched,
            self.sustained_losses,
            self.reacquisitions
        )
    }
}

/// Append-only list of anomalies in the order they were found
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnomalyLog {
    entries: Vec<Anomaly>,
}

impl AnomalyLog {
    pub fn new() -> Self {
        AnomalyLog::default()
    }
    pub fn push(&mut self, anomaly: Anomaly) {
        self.entries.push(anomaly);
    }
    pub fn entries(&self) -> &[Anomaly] {
        &self.entries
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn at_frame(&self, frame: usize) -> impl Iterator<Item = &Anomaly> {
        self.entries.iter().filter(move |a| a.frame() == frame)
    }
    pub fn summary(&self) -> AnomalySummary {
        let mut summary = AnomalySummary::default();
        for anomaly in &self.entries {
            match anomaly {
                Anomaly::UndecodedCandidate { .. } => summary.undecoded += 1,
                Anomaly::AmbiguousCandidate { .. } => summary.ambiguous += 1,
                Anomaly::RejectedMatch { reason, .. } => match reason {
                    RejectionReason::LowConfidence => summary.low_confidence += 1,
                    RejectionReason::BeyondCutoff => summary.beyond_cutoff += 1,
                    RejectionReason::Outmatched => summary.outmatched += 1,
                },
                Anomaly::UnmatchedCandidate { .. } => summary.unmatched += 1,
                Anomaly::SustainedLoss { .. } => summary.sustained_losses += 1,
                Anomaly::Reacquired { .. } => summary.reacquisitions += 1,
            }
        }
        summary
    }
}

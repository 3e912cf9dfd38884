use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::barcode::{BarcodeDecoder, Blob, CandidateBarcode, Catalog, FrameBlobs};
use crate::errors::TrackerError;
use crate::mot::{
    Anomaly, AnomalyLog, AnomalySummary, FrameResolution, FrameResolver, PointStatus,
    TrackerConfig, TrajectoryBuilder, TrajectoryStore,
};

/// Totals of one processed video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProcessingSummary {
    pub frames: usize,
    pub identities: usize,
    pub detected: usize,
    pub interpolated: usize,
    pub extrapolated: usize,
    pub missing: usize,
    pub detected_segments: usize,
    pub anomalies: AnomalySummary,
}

impl ProcessingSummary {
    pub fn new(store: &TrajectoryStore, anomalies: &AnomalyLog) -> Self {
        let mut summary = ProcessingSummary {
            frames: store.frame_range().map(|r| r.len()).unwrap_or(0),
            identities: store.trajectories().len(),
            anomalies: anomalies.summary(),
            ..Default::default()
        };
        for trajectory in store.trajectories() {
            summary.detected += trajectory.count(PointStatus::Detected);
            summary.interpolated += trajectory.count(PointStatus::Interpolated);
            summary.extrapolated += trajectory.count(PointStatus::Extrapolated);
            summary.missing += trajectory.count(PointStatus::Missing);
            summary.detected_segments += trajectory.detected_segments().len();
        }
        summary
    }
}

impl fmt::Display for ProcessingSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Frames: {}\n\tIdentities: {}\n\tPoints (detected / interpolated / extrapolated / missing): {} / {} / {} / {}\n\tDetected segments: {}\n\tAnomalies: {}",
            self.frames,
            self.identities,
            self.detected,
            self.interpolated,
            self.extrapolated,
            self.missing,
            self.detected_segments,
            self.anomalies
        )
    }
}

#[derive(Debug, Clone)]
pub struct TrackingOutput {
    pub store: TrajectoryStore,
    pub anomalies: AnomalyLog,
    pub summary: ProcessingSummary,
}

/// Sequential per-video driver: decode, resolve, build.
///
/// Basic usage:
///
/// ```
/// use tagtrack_rs::barcode::{Blob, Catalog, Color, IdentityIndex};
/// use tagtrack_rs::mot::{PointStatus, TrackerConfig, VideoTracker};
/// let catalog = Catalog::from_codes(&[("rat_07", "RGB")]).unwrap();
/// let mut tracker = VideoTracker::new(catalog, TrackerConfig::default()).unwrap();
/// let blobs = vec![
///     Blob::new(0, Color('R'), 100.0, 100.0, 4.0),
///     Blob::new(0, Color('G'), 115.0, 100.0, 4.0),
///     Blob::new(0, Color('B'), 130.0, 100.0, 4.0),
/// ];
/// tracker.process_frame(0, &blobs).unwrap();
/// let output = tracker.finish().unwrap();
/// let point = output.store.point(IdentityIndex(0), 0).unwrap();
/// assert_eq!(point.status, PointStatus::Detected);
/// ```
#[derive(Debug, Clone)]
pub struct VideoTracker {
    decoder: BarcodeDecoder,
    resolver: FrameResolver,
    builder: TrajectoryBuilder,
    anomalies: AnomalyLog,
    next_frame: usize,
}

impl VideoTracker {
    pub fn new(catalog: impl Into<Arc<Catalog>>, config: TrackerConfig) -> Result<Self, TrackerError> {
        VideoTracker::with_first_frame(catalog, config, 0)
    }
    /// Tracker whose trajectories start at `first_frame`
    pub fn with_first_frame(
        catalog: impl Into<Arc<Catalog>>,
        config: TrackerConfig,
        first_frame: usize,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        let catalog = catalog.into();
        info!(identities = catalog.len(), first_frame, "configuration:\n\t{}", config);
        Ok(VideoTracker {
            builder: TrajectoryBuilder::new(&catalog, &config, first_frame),
            resolver: FrameResolver::new(&config),
            decoder: BarcodeDecoder::new(catalog, config.decoder.clone()),
            anomalies: AnomalyLog::new(),
            next_frame: first_frame,
        })
    }
    pub fn decoder(&self) -> &BarcodeDecoder {
        &self.decoder
    }
    pub fn store(&self) -> &TrajectoryStore {
        self.builder.store()
    }
    pub fn anomalies(&self) -> &AnomalyLog {
        &self.anomalies
    }
    /// Frame the tracker expects next
    pub fn next_frame(&self) -> usize {
        self.next_frame
    }

    /// Decodes and resolves one frame of blobs
    pub fn process_frame(
        &mut self,
        frame: usize,
        blobs: &[Blob],
    ) -> Result<FrameResolution, TrackerError> {
        check_blob_frames(frame, blobs)?;
        self.check_order(frame)?;
        let candidates = self.decoder.decode_frame(frame, blobs);
        self.process_decoded(frame, &candidates)
    }

    /// Resolves one frame whose blobs were already decoded (e.g. by [`decode_frames_parallel`])
    pub fn process_decoded(
        &mut self,
        frame: usize,
        candidates: &[CandidateBarcode],
    ) -> Result<FrameResolution, TrackerError> {
        if let Some(candidate) = candidates.iter().find(|c| c.frame != frame) {
            return Err(TrackerError::CandidateFrameMismatch {
                frame,
                candidate_frame: candidate.frame,
            });
        }
        self.check_order(frame)?;
        for skipped in self.next_frame..frame {
            warn!(frame = skipped, "no detections for frame, processing it as empty");
            self.resolve(skipped, &[])?;
        }
        self.resolve(frame, candidates)
    }

    fn check_order(&self, frame: usize) -> Result<(), TrackerError> {
        if frame < self.next_frame {
            return Err(TrackerError::FrameOrder {
                last: self.next_frame.saturating_sub(1),
                found: frame,
            });
        }
        Ok(())
    }

    fn resolve(
        &mut self,
        frame: usize,
        candidates: &[CandidateBarcode],
    ) -> Result<FrameResolution, TrackerError> {
        let predictions = self.builder.predictions(frame);
        let resolution = self.resolver.resolve(frame, candidates, &predictions);
        self.record_anomalies(&resolution, candidates);
        self.builder.apply(&resolution, &mut self.anomalies)?;
        self.next_frame = frame + 1;
        Ok(resolution)
    }

    fn record_anomalies(&mut self, resolution: &FrameResolution, candidates: &[CandidateBarcode]) {
        let frame = resolution.frame;
        for &idx in &resolution.undecoded_candidates {
            self.anomalies.push(Anomaly::UndecodedCandidate {
                frame,
                position: candidates[idx].centroid,
                blobs: candidates[idx].blob_indices.len(),
            });
        }
        for candidate in candidates.iter().filter(|c| c.labels.is_ambiguous()) {
            debug!(frame, identities = ?candidate.identities(), "ambiguous candidate");
            self.anomalies.push(Anomaly::AmbiguousCandidate {
                frame,
                position: candidate.centroid,
                identities: candidate.identities(),
            });
        }
        for rejected in &resolution.rejected {
            self.anomalies.push(Anomaly::RejectedMatch {
                frame,
                identity: rejected.identity,
                reason: rejected.reason,
                confidence: rejected.confidence,
                distance: rejected.distance,
            });
        }
        for &idx in &resolution.unmatched_candidates {
            self.anomalies.push(Anomaly::UnmatchedCandidate {
                frame,
                position: candidates[idx].centroid,
            });
        }
    }

    /// Flushes open gaps and returns everything collected for the video
    pub fn finish(self) -> Result<TrackingOutput, TrackerError> {
        let store = self.builder.finish()?;
        let summary = ProcessingSummary::new(&store, &self.anomalies);
        info!("video processed:\n\t{}", summary);
        Ok(TrackingOutput {
            store,
            anomalies: self.anomalies,
            summary,
        })
    }
}

fn check_blob_frames(frame: usize, blobs: &[Blob]) -> Result<(), TrackerError> {
    match blobs.iter().find(|b| b.frame != frame) {
        Some(blob) => Err(TrackerError::BlobFrameMismatch {
            frame,
            blob_frame: blob.frame,
        }),
        None => Ok(()),
    }
}

/// Decodes independent frames concurrently. Output keeps the input frame order.
pub fn decode_frames_parallel(
    decoder: &BarcodeDecoder,
    frames: &[FrameBlobs],
) -> Vec<(usize, Vec<CandidateBarcode>)> {
    frames
        .par_iter()
        .map(|batch| (batch.frame, decoder.decode_frame(batch.frame, &batch.blobs)))
        .collect()
}

/// Runs one video end to end. Trajectories start at the first batch's frame.
pub fn track_video(
    catalog: impl Into<Arc<Catalog>>,
    config: TrackerConfig,
    frames: &[FrameBlobs],
) -> Result<TrackingOutput, TrackerError> {
    let first_frame = frames.first().map(|batch| batch.frame).unwrap_or(0);
    let mut tracker = VideoTracker::with_first_frame(catalog, config, first_frame)?;
    for batch in frames {
        check_blob_frames(batch.frame, &batch.blobs)?;
    }
    for (frame, candidates) in decode_frames_parallel(tracker.decoder(), frames) {
        tracker.process_decoded(frame, &candidates)?;
    }
    tracker.finish()
}

/// Runs independent videos concurrently; results keep the input order
pub fn track_videos_parallel(
    catalog: &Arc<Catalog>,
    config: &TrackerConfig,
    videos: &[Vec<FrameBlobs>],
) -> Vec<Result<TrackingOutput, TrackerError>> {
    videos
        .par_iter()
        .map(|frames| track_video(Arc::clone(catalog), config.clone(), frames))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::barcode::{Color, IdentityIndex};

    fn catalog() -> Catalog {
        Catalog::from_codes(&[("rat_01", "RGB"), ("rat_02", "RBY")]).unwrap()
    }

    fn barcode(frame: usize, code: &str, x: f32, y: f32) -> Vec<Blob> {
        code.chars()
            .enumerate()
            .map(|(i, c)| Blob::new(frame, Color(c), x + 15.0 * i as f32, y, 4.0))
            .collect()
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = TrackerConfig::default();
        config.max_displacement = -1.0;
        assert!(matches!(
            VideoTracker::new(catalog(), config),
            Err(TrackerError::Config(_))
        ));
    }

    #[test]
    fn test_frames_must_not_go_back() {
        let mut tracker = VideoTracker::new(catalog(), TrackerConfig::default()).unwrap();
        tracker.process_frame(3, &[]).unwrap();
        assert!(matches!(
            tracker.process_frame(2, &[]),
            Err(TrackerError::FrameOrder { last: 3, found: 2 })
        ));
    }

    #[test]
    fn test_blob_of_other_frame_is_rejected() {
        let mut tracker = VideoTracker::new(catalog(), TrackerConfig::default()).unwrap();
        let blobs = barcode(1, "RGB", 0.0, 0.0);
        assert!(matches!(
            tracker.process_frame(0, &blobs),
            Err(TrackerError::BlobFrameMismatch { frame: 0, blob_frame: 1 })
        ));
    }

    #[test]
    fn test_decoded_candidate_of_other_frame_is_rejected() {
        let mut tracker = VideoTracker::new(catalog(), TrackerConfig::default()).unwrap();
        let candidates = tracker.decoder().decode_frame(1, &barcode(1, "RGB", 0.0, 0.0));
        assert!(matches!(
            tracker.process_decoded(0, &candidates),
            Err(TrackerError::CandidateFrameMismatch { frame: 0, candidate_frame: 1 })
        ));
        // nothing was resolved
        assert_eq!(tracker.next_frame(), 0);
        assert!(tracker.process_decoded(1, &candidates).is_ok());
    }

    #[test]
    fn test_skipped_frames_are_filled() {
        let mut tracker = VideoTracker::new(catalog(), TrackerConfig::default()).unwrap();
        tracker.process_frame(0, &barcode(0, "RGB", 100.0, 100.0)).unwrap();
        tracker.process_frame(3, &barcode(3, "RGB", 103.0, 100.0)).unwrap();
        assert_eq!(tracker.next_frame(), 4);
        let output = tracker.finish().unwrap();
        let rat_01 = IdentityIndex(0);
        assert_eq!(output.store.frame_range(), Some(0..4));
        assert_eq!(output.store.point(rat_01, 1).unwrap().status, PointStatus::Interpolated);
        assert_eq!(output.store.point(rat_01, 2).unwrap().status, PointStatus::Interpolated);
        assert_eq!(output.summary.detected, 2);
        assert_eq!(output.summary.interpolated, 2);
        assert_eq!(output.summary.missing, 4);
    }

    #[test]
    fn test_anomalies_are_recorded() {
        let mut tracker = VideoTracker::new(catalog(), TrackerConfig::default()).unwrap();
        let mut blobs = barcode(0, "RGB", 100.0, 100.0);
        // lone blob far away
        blobs.push(Blob::new(0, Color('Y'), 400.0, 400.0, 4.0));
        tracker.process_frame(0, &blobs).unwrap();
        let output = tracker.finish().unwrap();
        assert_eq!(output.summary.anomalies.undecoded, 1);
        assert_eq!(output.summary.frames, 1);
    }

    #[test]
    fn test_parallel_decoding_matches_sequential() {
        let frames: Vec<FrameBlobs> = (0..20)
            .map(|f| FrameBlobs {
                frame: f,
                blobs: barcode(f, "RGB", 100.0 + f as f32, 100.0),
            })
            .collect();
        let mut tracker = VideoTracker::new(catalog(), TrackerConfig::default()).unwrap();
        for batch in &frames {
            tracker.process_frame(batch.frame, &batch.blobs).unwrap();
        }
        let sequential = tracker.finish().unwrap();
        let parallel = track_video(catalog(), TrackerConfig::default(), &frames).unwrap();
        for (seq, par, identity) in itertools::izip!(
            sequential.store.trajectories(),
            parallel.store.trajectories(),
            0..
        ) {
            assert_eq!(seq.identity, IdentityIndex(identity));
            assert_eq!(seq.points, par.points);
        }
        assert_eq!(sequential.summary, parallel.summary);

        let shared = Arc::new(catalog());
        let videos = vec![frames.clone(), frames];
        let results = track_videos_parallel(&shared, &TrackerConfig::default(), &videos);
        assert_eq!(results.len(), 2);
        for result in results {
            assert_eq!(result.unwrap().store, sequential.store);
        }
    }
}

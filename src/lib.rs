//! Decoding of multi-colored barcode tags from per-frame blob detections and
//! reconstruction of one trajectory per tagged individual.
//!
//! Processing of one video is strictly sequential:
//! blobs -> [`barcode::BarcodeDecoder`] -> [`mot::FrameResolver`] -> [`mot::TrajectoryBuilder`] -> [`mot::TrajectoryStore`].
//! [`mot::VideoTracker`] glues the stages together.
pub mod barcode;
pub mod errors;
pub mod mot;
pub mod utils;

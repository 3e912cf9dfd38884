use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ConfigError;

/// Algorithm type for matching candidates to identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchingAlgorithm {
    /// Use the Hungarian algorithm (Kuhn-Munkres) for optimal assignment
    Hungarian,
    /// Use a greedy algorithm for faster but potentially suboptimal assignment
    Greedy,
}

/// Thresholds of the barcode decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Max distance between neighbouring blobs of the same barcode (pixels). Default is 25.0
    pub max_inter_blob_distance: f32,
    /// Confidence lost for every chip that was not found. Default is 0.25
    pub missing_blob_penalty: f32,
    /// Confidence lost for a chip of the wrong color. Default is 0.3
    pub color_mismatch_penalty: f32,
    /// Confidence lost when the cluster holds blobs outside of the decoded chain. Default is 0.2
    pub crowding_penalty: f32,
    /// Smallest allowed angle at an interior chip of a barcode (degrees). Default is 100.0
    pub min_chain_angle_deg: f32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            max_inter_blob_distance: 25.0,
            missing_blob_penalty: 0.25,
            color_mismatch_penalty: 0.3,
            crowding_penalty: 0.2,
            min_chain_angle_deg: 100.0,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("max_inter_blob_distance", self.max_inter_blob_distance)?;
        within("missing_blob_penalty", self.missing_blob_penalty, 0.0, 1.0)?;
        within("color_mismatch_penalty", self.color_mismatch_penalty, 0.0, 1.0)?;
        within("crowding_penalty", self.crowding_penalty, 0.0, 1.0)?;
        within("min_chain_angle_deg", self.min_chain_angle_deg, 0.0, 180.0)?;
        Ok(())
    }
}

/// Every tunable threshold of the pipeline
///
/// Basic usage:
///
/// ```
/// use tagtrack_rs::mot::TrackerConfig;
/// let config = TrackerConfig::from_json_str(r#"{"max_gap_length": 4, "decoder": {"max_inter_blob_distance": 18.0}}"#).unwrap();
/// assert_eq!(config.max_gap_length, 4);
/// assert_eq!(config.decoder.max_inter_blob_distance, 18.0);
/// assert_eq!(config.max_displacement, TrackerConfig::default().max_displacement);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub decoder: DecoderConfig,
    /// Max distance an individual may move between two consecutive frames (pixels). Default is 40.0
    pub max_displacement: f32,
    /// Label options below this decode confidence are never assigned. Default is 0.5
    pub min_confidence: f32,
    /// Longest run of undetected frames that is still interpolated. Default is 10
    pub max_gap_length: usize,
    /// Frames a lost identity is still expected near its last position. Default is 25
    pub max_lost_before_reset: usize,
    /// Weight of the decode confidence in the matching score. Default is 1.0
    pub confidence_weight: f32,
    /// Weight of the closeness to the predicted position in the matching score. Default is 1.0
    pub distance_weight: f32,
    /// Number of recent detections used to estimate velocity. Default is 5
    pub velocity_depth: usize,
    pub algorithm: MatchingAlgorithm,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            decoder: DecoderConfig::default(),
            max_displacement: 40.0,
            min_confidence: 0.5,
            max_gap_length: 10,
            max_lost_before_reset: 25,
            confidence_weight: 1.0,
            distance_weight: 1.0,
            velocity_depth: 5,
            algorithm: MatchingAlgorithm::Hungarian,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decoder.validate()?;
        positive("max_displacement", self.max_displacement)?;
        within("min_confidence", self.min_confidence, 0.0, 1.0)?;
        within("confidence_weight", self.confidence_weight, 0.0, f32::MAX)?;
        within("distance_weight", self.distance_weight, 0.0, f32::MAX)?;
        if self.confidence_weight + self.distance_weight <= 0.0 {
            return Err(ConfigError::ZeroWeights);
        }
        if self.velocity_depth < 1 {
            return Err(ConfigError::TooSmall {
                name: "velocity_depth",
                value: self.velocity_depth,
                min: 1,
            });
        }
        Ok(())
    }
    /// Parses a (possibly partial) JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TrackerConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl fmt::Display for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Max inter-blob distance: {}\n\tMax displacement: {}\n\tMin confidence: {}\n\tMax gap length: {}\n\tMax lost before reset: {}\n\tAlgorithm: {:?}",
            self.decoder.max_inter_blob_distance,
            self.max_displacement,
            self.min_confidence,
            self.max_gap_length,
            self.max_lost_before_reset,
            self.algorithm
        )
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn within(name: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

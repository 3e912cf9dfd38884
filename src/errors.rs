use thiserror::Error;

use crate::barcode::IdentityIndex;

/// Integrity failures of the barcode catalog. Always fatal before frame processing starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("catalog contains no barcode definitions")]
    Empty,
    #[error("barcode definition #{position} has an empty name")]
    EmptyName { position: usize },
    #[error("barcode name '{name}' is defined more than once")]
    DuplicateName { name: String },
    #[error("barcode '{name}' contains invalid color symbol '{symbol}'")]
    InvalidColor { name: String, symbol: char },
    #[error("barcode '{name}' has {chips} chips, at least 2 are required")]
    TooShort { name: String, chips: usize },
    #[error("barcode '{name}' has {found} chips while the catalog uses {expected}")]
    InconsistentLength {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("barcodes '{first}' and '{second}' cannot be told apart (equal when read forward or backward)")]
    Indistinguishable { first: String, second: String },
}

/// Invalid tracker configuration. Always fatal before frame processing starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("'{name}' must be a positive finite number, got {value}")]
    NonPositive { name: &'static str, value: f32 },
    #[error("'{name}' must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    #[error("'{name}' must be at least {min}, got {value}")]
    TooSmall {
        name: &'static str,
        value: usize,
        min: usize,
    },
    #[error("matching weights must not both be zero")]
    ZeroWeights,
    #[error("can't parse configuration: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("identity {0} is not part of the store")]
    UnknownIdentity(IdentityIndex),
    #[error("point for identity {identity} at frame {found} is out of order, expected frame {expected}")]
    OutOfOrder {
        identity: IdentityIndex,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("frame {found} arrived after frame {last}, frames must be processed in increasing order")]
    FrameOrder { last: usize, found: usize },
    #[error("blob of frame {blob_frame} was passed as part of frame {frame}")]
    BlobFrameMismatch { frame: usize, blob_frame: usize },
    #[error("candidate of frame {candidate_frame} was passed as part of frame {frame}")]
    CandidateFrameMismatch { frame: usize, candidate_frame: usize },
}

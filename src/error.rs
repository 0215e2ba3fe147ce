//! Error types for subset generation.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Split;

/// Errors that can occur while building a subset.
#[derive(Error, Debug)]
pub enum SubsetError {
    /// The annotation record is neither a polygon record nor a class-index mask
    #[error("Unsupported label format in {path:?}: {reason}")]
    UnsupportedLabelFormat {
        /// Path of the offending annotation
        path: PathBuf,
        /// What did not match
        reason: String,
    },

    /// A raw image or annotation referenced by a frame is absent
    #[error("Missing raw asset for frame '{frame_id}': {path:?}")]
    MissingRawAsset {
        /// Frame the asset belongs to
        frame_id: String,
        /// Where the asset was expected
        path: PathBuf,
    },

    /// Normalization against a zero-sized frame
    #[error("Frame dimensions {width}x{height} cannot be used for normalization")]
    DivisionUndefined { width: u32, height: u32 },

    /// Split ratios are negative or do not sum to 1.0
    #[error("Invalid split ratios: train={train}, val={val}, test={test}")]
    InvalidRatios { train: f64, val: f64, test: f64 },

    /// Any other configuration problem
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl SubsetError {
    /// Create an unsupported label format error.
    pub fn unsupported(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedLabelFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing raw asset error.
    pub fn missing(frame_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingRawAsset {
            frame_id: frame_id.into(),
            path: path.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SubsetError>;

/// A frame that could not be materialized. Failures are isolated per frame.
#[derive(Debug)]
pub struct FrameFailure {
    pub frame_id: String,
    pub split: Option<Split>,
    pub error: SubsetError,
}

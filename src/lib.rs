//! RailSem19 to YOLO subset builder
//!
//! This library selects the frames of a RailSem19-style dataset that contain
//! (or lack) given classes, splits them reproducibly into train/val/test and
//! writes a YOLO detection dataset, from either polygon annotations or
//! segmentation-mask contours.

pub mod config;
pub mod conversion;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod io;
pub mod materialize;
pub mod relevance;
pub mod types;
pub mod utils;
pub mod yolo_dataset;

// Re-export commonly used types and functions
pub use config::{Args, Mode, SubsetConfig};
pub use conversion::{normalize, BoundingBox, BoxPolicy};
pub use dataset::{split_frames, SplitRatios};
pub use error::{FrameFailure, Result, SubsetError};
pub use geometry::{extract, Geometry, Object, RawAnnotation};
pub use io::{AnnotationKind, Idempotency, OutputLayout, RawStore};
pub use materialize::{materialize, MaterializeReport, MaterializeWarning, Materializer};
pub use relevance::{select, AnnotationCorpus, InclusionPredicate};
pub use types::{ClassKey, Partition, Split, TargetClasses};
pub use yolo_dataset::{process_dataset, DatasetRun};

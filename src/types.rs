use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifies a class inside a raw annotation: a label string in polygon
/// records, or a class index in segmentation masks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassKey {
    Index(u8),
    Label(String),
}

impl fmt::Display for ClassKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassKey::Index(index) => write!(f, "{}", index),
            ClassKey::Label(label) => f.write_str(label),
        }
    }
}

impl From<&str> for ClassKey {
    fn from(label: &str) -> Self {
        ClassKey::Label(label.to_string())
    }
}

impl From<u8> for ClassKey {
    fn from(index: u8) -> Self {
        ClassKey::Index(index)
    }
}

/// Mapping from raw class keys to output class ids, with optional
/// display names per class id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetClasses {
    classes: BTreeMap<ClassKey, usize>,
    names: BTreeMap<usize, String>,
}

impl TargetClasses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<ClassKey>, class_id: usize) -> Self {
        self.insert(key, class_id);
        self
    }

    pub fn insert(&mut self, key: impl Into<ClassKey>, class_id: usize) {
        self.classes.insert(key.into(), class_id);
    }

    pub fn with_name(mut self, class_id: usize, name: impl Into<String>) -> Self {
        self.set_name(class_id, name);
        self
    }

    pub fn set_name(&mut self, class_id: usize, name: impl Into<String>) {
        self.names.insert(class_id, name.into());
    }

    pub fn class_id(&self, key: &ClassKey) -> Option<usize> {
        self.classes.get(key).copied()
    }

    pub fn contains(&self, key: &ClassKey) -> bool {
        self.classes.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ClassKey> {
        self.classes.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Class names ordered by class id, for the dataset.yaml `names` table.
    /// An explicit name wins; otherwise the key is used (the raw index for
    /// mask classes), and when two keys share an id the first in key order wins.
    pub fn names_by_id(&self) -> Vec<(usize, String)> {
        let mut names: BTreeMap<usize, String> = BTreeMap::new();
        for (key, &id) in &self.classes {
            let name = self.names.get(&id).cloned().unwrap_or_else(|| key.to_string());
            names.entry(id).or_insert(name);
        }
        names.into_iter().collect()
    }
}

// One object of a RailSem19-style polygon record
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawObject {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<(f64, f64)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polyline: Option<Vec<(f64, f64)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundingbox: Option<[f64; 4]>,
}

// The per-frame polygon annotation record
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PolygonRecord {
    #[serde(default)]
    pub frame: Option<String>,
    pub img_width: u32,
    pub img_height: u32,
    pub objects: Vec<RawObject>,
}

impl PolygonRecord {
    /// Distinct labels present in the record.
    pub fn labels(&self) -> BTreeSet<ClassKey> {
        self.objects
            .iter()
            .map(|object| ClassKey::Label(object.label.clone()))
            .collect()
    }
}

/// One of the three dataset splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disjoint train/val/test assignment over frame ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub train: BTreeSet<String>,
    pub val: BTreeSet<String>,
    pub test: BTreeSet<String>,
}

impl Partition {
    pub fn get(&self, split: Split) -> &BTreeSet<String> {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn split_of(&self, frame_id: &str) -> Option<Split> {
        Split::ALL
            .into_iter()
            .find(|&split| self.get(split).contains(frame_id))
    }

    /// Every (split, frame id) pair, train first.
    pub fn iter(&self) -> impl Iterator<Item = (Split, &str)> {
        Split::ALL.into_iter().flat_map(move |split| {
            self.get(split)
                .iter()
                .map(move |frame_id| (split, frame_id.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sizes(&self) -> [usize; 3] {
        [self.train.len(), self.val.len(), self.test.len()]
    }
}

/// Whether a file was written or left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
}

/// What happened to one frame during materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    pub image: WriteOutcome,
    pub label: Option<WriteOutcome>,
    pub boxes: usize,
}

// Struct to hold processing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub total_frames: usize,
    pub images_copied: usize,
    pub images_skipped: usize,
    pub labels_written: usize,
    pub labels_skipped: usize,
    pub boxes_written: usize,
    pub failed_frames: usize,
}

impl ProcessingStats {
    pub fn record(&mut self, outcome: &FrameOutcome) {
        self.total_frames += 1;
        match outcome.image {
            WriteOutcome::Written => self.images_copied += 1,
            WriteOutcome::Skipped => self.images_skipped += 1,
        }
        match outcome.label {
            Some(WriteOutcome::Written) => {
                self.labels_written += 1;
                self.boxes_written += outcome.boxes;
            }
            Some(WriteOutcome::Skipped) => self.labels_skipped += 1,
            None => {}
        }
    }

    pub fn increment_failed(&mut self) {
        self.total_frames += 1;
        self.failed_frames += 1;
    }

    pub fn print_summary(&self) {
        log::info!("=== Processing Summary ===");
        log::info!("Total frames processed: {}", self.total_frames);
        log::info!(
            "Images copied: {} (already present: {})",
            self.images_copied,
            self.images_skipped
        );
        log::info!(
            "Label files written: {} with {} boxes (already present: {})",
            self.labels_written,
            self.boxes_written,
            self.labels_skipped
        );
        if self.failed_frames > 0 {
            log::warn!("Failed frames: {}", self.failed_frames);
        }
    }
}

use clap::ValueEnum;
use dashmap::DashMap;
use jwalk::WalkDir;
use log::{error, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{FrameFailure, Result, SubsetError};
use crate::geometry::RawAnnotation;
use crate::relevance::AnnotationCorpus;
use crate::types::{Split, TargetClasses, WriteOutcome};
use crate::utils::{create_output_directory, create_progress_bar};

/// Which raw annotation encoding a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Polygon,
    Mask,
}

impl AnnotationKind {
    fn dir_name(&self) -> &'static str {
        match self {
            AnnotationKind::Polygon => "jsons",
            AnnotationKind::Mask => "uint8",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            AnnotationKind::Polygon => "json",
            AnnotationKind::Mask => "png",
        }
    }
}

/// Read-only access to raw images and annotations laid out as
/// `<root>/{jpgs,jsons,uint8}/<subset>/<frame_id>.<ext>`.
#[derive(Debug, Clone)]
pub struct RawStore {
    root: PathBuf,
    subset: String,
    image_ext: String,
    kind: AnnotationKind,
}

impl RawStore {
    pub fn new(root: impl Into<PathBuf>, kind: AnnotationKind) -> Self {
        Self {
            root: root.into(),
            subset: "rs19_val".to_string(),
            image_ext: "jpg".to_string(),
            kind,
        }
    }

    pub fn with_subset(mut self, subset: impl Into<String>) -> Self {
        self.subset = subset.into();
        self
    }

    pub fn with_image_ext(mut self, image_ext: impl Into<String>) -> Self {
        self.image_ext = image_ext.into();
        self
    }

    pub fn image_ext(&self) -> &str {
        &self.image_ext
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.join("jpgs").join(&self.subset)
    }

    pub fn annotation_dir(&self) -> PathBuf {
        self.root.join(self.kind.dir_name()).join(&self.subset)
    }

    pub fn image_path(&self, frame_id: &str) -> PathBuf {
        self.image_dir()
            .join(format!("{}.{}", frame_id, self.image_ext))
    }

    pub fn annotation_path(&self, frame_id: &str) -> PathBuf {
        self.annotation_dir()
            .join(format!("{}.{}", frame_id, self.kind.extension()))
    }

    /// Load the annotation of a frame, failing with `MissingRawAsset` when absent.
    pub fn load_annotation(&self, frame_id: &str) -> Result<RawAnnotation> {
        let path = self.annotation_path(frame_id);
        if !path.is_file() {
            return Err(SubsetError::missing(frame_id, path));
        }
        RawAnnotation::load(&path)
    }

    /// Sorted frame ids with an annotation file.
    pub fn list_annotation_ids(&self) -> Result<Vec<String>> {
        list_frame_ids(&self.annotation_dir(), self.kind.extension())
    }

    /// Sorted frame ids with an image file.
    pub fn list_image_ids(&self) -> Result<Vec<String>> {
        list_frame_ids(&self.image_dir(), &self.image_ext)
    }
}

fn list_frame_ids(dir: &Path, extension: &str) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(SubsetError::InvalidConfig(format!(
            "raw store directory {:?} does not exist",
            dir
        )));
    }

    let mut frame_ids: Vec<String> = WalkDir::new(dir)
        .max_depth(1)
        .skip_hidden(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file()
                && e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .filter_map(|e| {
            e.path()
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .collect();
    frame_ids.sort();
    Ok(frame_ids)
}

/// Classes present per frame, plus the frames whose annotation could not be read.
#[derive(Debug, Default)]
pub struct CorpusScan {
    pub corpus: AnnotationCorpus,
    pub failures: Vec<FrameFailure>,
}

/// Scan every annotation of the store and record the classes present per frame.
/// Unreadable records are kept out of the corpus and returned as failures.
pub fn scan_corpus(store: &RawStore) -> Result<CorpusScan> {
    let frame_ids = store.list_annotation_ids()?;
    info!(
        "Scanning {} annotations in {:?}",
        frame_ids.len(),
        store.annotation_dir()
    );

    let pb = create_progress_bar(frame_ids.len() as u64, "Scan");
    let results: Vec<(String, Result<RawAnnotation>)> = frame_ids
        .into_par_iter()
        .map(|frame_id| {
            let result = store.load_annotation(&frame_id);
            pb.inc(1);
            (frame_id, result)
        })
        .collect();
    pb.finish_with_message("Scan complete");

    let mut scan = CorpusScan::default();
    for (frame_id, result) in results {
        match result {
            Ok(annotation) => {
                scan.corpus.insert(frame_id, annotation.classes_present());
            }
            Err(e) => {
                error!("Failed to scan frame {}: {}", frame_id, e);
                scan.failures.push(FrameFailure {
                    frame_id,
                    split: None,
                    error: e,
                });
            }
        }
    }

    Ok(scan)
}

/// The output dataset tree rooted at `root`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn images_dir(&self, split: Split) -> PathBuf {
        self.root.join("images").join(split.as_str())
    }

    pub fn labels_dir(&self, split: Split) -> PathBuf {
        self.root.join("labels").join(split.as_str())
    }

    pub fn image_path(&self, split: Split, frame_id: &str, image_ext: &str) -> PathBuf {
        self.images_dir(split)
            .join(format!("{}.{}", frame_id, image_ext))
    }

    pub fn label_path(&self, split: Split, frame_id: &str) -> PathBuf {
        self.labels_dir(split).join(format!("{}.txt", frame_id))
    }
}

/// Set up `images/{train,val,test}` and `labels/{train,val,test}`.
/// Returns the directories that already existed.
pub fn setup_output_directories(layout: &OutputLayout) -> std::io::Result<Vec<PathBuf>> {
    let mut existing = Vec::new();
    for split in Split::ALL {
        for dir in [layout.images_dir(split), layout.labels_dir(split)] {
            if create_output_directory(&dir)? {
                existing.push(dir);
            }
        }
    }
    Ok(existing)
}

/// When an output file that is already present gets rewritten.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Idempotency {
    /// Never touch a file that exists
    #[default]
    Presence,
    /// Rewrite a file only when its bytes differ from the new content
    Content,
}

/// Per-path locks so a presence check and the following write happen as one step.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = self
            .locks
            .entry(path.to_path_buf())
            .or_default()
            .clone();
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// Write `contents` to `path` unless the idempotency policy says to keep it.
pub fn write_file_once(
    path: &Path,
    contents: &[u8],
    idempotency: Idempotency,
    locks: &PathLocks,
) -> Result<WriteOutcome> {
    locks.with_lock(path, || -> Result<WriteOutcome> {
        if path.exists() {
            match idempotency {
                Idempotency::Presence => return Ok(WriteOutcome::Skipped),
                Idempotency::Content => {
                    if fs::read(path)? == contents {
                        return Ok(WriteOutcome::Skipped);
                    }
                }
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(contents)?;
        writer.flush()?;
        Ok(WriteOutcome::Written)
    })
}

/// Copy `source` to `destination` unless the idempotency policy says to keep it.
pub fn copy_file_once(
    source: &Path,
    destination: &Path,
    idempotency: Idempotency,
    locks: &PathLocks,
) -> Result<WriteOutcome> {
    locks.with_lock(destination, || -> Result<WriteOutcome> {
        if destination.exists() {
            match idempotency {
                Idempotency::Presence => return Ok(WriteOutcome::Skipped),
                Idempotency::Content => {
                    if fs::read(destination)? == fs::read(source)? {
                        return Ok(WriteOutcome::Skipped);
                    }
                }
            }
        }
        fs::copy(source, destination)?;
        Ok(WriteOutcome::Written)
    })
}

/// Create the dataset.yaml file for YOLO training
pub fn create_dataset_yaml(output_root: &Path, targets: &TargetClasses) -> std::io::Result<()> {
    let dataset_yaml_path = output_root.join("dataset.yaml");
    let absolute_path = fs::canonicalize(output_root)?;
    let mut yaml_content = format!(
        "path: {}\ntrain: images/train\nval: images/val\ntest: images/test\n",
        absolute_path.to_string_lossy()
    );
    yaml_content.push_str("\nnames:\n");
    for (id, name) in targets.names_by_id() {
        yaml_content.push_str(&format!("    {}: {}\n", id, name));
    }

    let mut dataset_yaml = BufWriter::new(File::create(&dataset_yaml_path)?);
    dataset_yaml.write_all(yaml_content.as_bytes())?;
    dataset_yaml.flush()
}

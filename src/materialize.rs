//! Writing a partition to disk as a YOLO dataset.
//!
//! Every frame is processed independently: its image is copied into
//! `images/<split>` and its boxes are written to `labels/<split>/<id>.txt`.
//! Files already present are left untouched under [`Idempotency::Presence`].
//! A frame that fails is reported and leaves no half-written image/label pair.

use log::{error, info, warn};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::conversion::{convert_to_yolo_format, frame_boxes, BoxPolicy};
use crate::error::{FrameFailure, Result, SubsetError};
use crate::io::{
    copy_file_once, setup_output_directories, write_file_once, Idempotency, OutputLayout,
    PathLocks, RawStore,
};
use crate::types::{FrameOutcome, Partition, ProcessingStats, Split, TargetClasses, WriteOutcome};
use crate::utils::{create_io_thread_pool, create_output_directory, create_progress_bar};

/// Non-fatal conditions surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeWarning {
    /// The output directory existed before this run
    OutputDirectoryExists(PathBuf),
}

impl fmt::Display for MaterializeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterializeWarning::OutputDirectoryExists(path) => write!(
                f,
                "output directory {:?} already exists; frames from an earlier run may remain",
                path
            ),
        }
    }
}

/// Outcome of a materialization run.
#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub stats: ProcessingStats,
    pub failures: Vec<FrameFailure>,
    pub warnings: Vec<MaterializeWarning>,
}

impl MaterializeReport {
    /// Add failures recorded before materialization, such as unreadable annotations.
    pub fn absorb_failures(&mut self, failures: Vec<FrameFailure>) {
        for _ in &failures {
            self.stats.increment_failed();
        }
        self.failures.extend(failures);
    }

    fn absorb(&mut self, frame_id: String, split: Option<Split>, result: Result<FrameOutcome>) {
        match result {
            Ok(outcome) => self.stats.record(&outcome),
            Err(e) => {
                error!("Failed to process frame {}: {}", frame_id, e);
                self.stats.increment_failed();
                self.failures.push(FrameFailure {
                    frame_id,
                    split,
                    error: e,
                });
            }
        }
    }
}

/// Writes partitions of a raw store into an output dataset tree.
pub struct Materializer<'a> {
    store: &'a RawStore,
    layout: OutputLayout,
    targets: &'a TargetClasses,
    policy: BoxPolicy,
    idempotency: Idempotency,
    workers: usize,
    locks: PathLocks,
}

impl<'a> Materializer<'a> {
    pub fn new(store: &'a RawStore, output_root: impl Into<PathBuf>, targets: &'a TargetClasses) -> Self {
        Self {
            store,
            layout: OutputLayout::new(output_root),
            targets,
            policy: BoxPolicy::default(),
            idempotency: Idempotency::default(),
            workers: 0,
            locks: PathLocks::new(),
        }
    }

    pub fn with_policy(mut self, policy: BoxPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_idempotency(mut self, idempotency: Idempotency) -> Self {
        self.idempotency = idempotency;
        self
    }

    /// Number of worker threads; 0 uses the global rayon pool.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Create the output tree and process every frame of `partition`.
    pub fn materialize(&self, partition: &Partition) -> Result<MaterializeReport> {
        let mut report = MaterializeReport {
            warnings: setup_output_directories(&self.layout)?
                .into_iter()
                .map(MaterializeWarning::OutputDirectoryExists)
                .collect(),
            ..MaterializeReport::default()
        };

        let work: Vec<(Split, &str)> = partition.iter().collect();
        let pb = create_progress_bar(work.len() as u64, "Materialize");
        let run = || {
            work.par_iter()
                .map(|&(split, frame_id)| {
                    let result = self.process_frame(split, frame_id);
                    pb.inc(1);
                    (split, frame_id.to_string(), result)
                })
                .collect::<Vec<_>>()
        };
        let results = match create_io_thread_pool(self.workers) {
            Some(pool) => pool.install(run),
            None => run(),
        };
        pb.finish_with_message("Materialization complete");

        for (split, frame_id, result) in results {
            report.absorb(frame_id, Some(split), result);
        }
        report.stats.print_summary();
        Ok(report)
    }

    /// Copy the image and write the label file of one frame.
    pub fn process_frame(&self, split: Split, frame_id: &str) -> Result<FrameOutcome> {
        let annotation = self.store.load_annotation(frame_id)?;
        let boxes = frame_boxes(&annotation, self.targets, &self.policy)?;

        let image_source = self.store.image_path(frame_id);
        if !image_source.is_file() {
            return Err(SubsetError::missing(frame_id, image_source));
        }

        let image_destination = self
            .layout
            .image_path(split, frame_id, self.store.image_ext());
        let image = copy_file_once(&image_source, &image_destination, self.idempotency, &self.locks)?;

        let label_path = self.layout.label_path(split, frame_id);
        let yolo_data = convert_to_yolo_format(&boxes);
        let label = match write_file_once(&label_path, yolo_data.as_bytes(), self.idempotency, &self.locks)
        {
            Ok(label) => label,
            Err(e) => {
                if image == WriteOutcome::Written {
                    remove_partial(&image_destination);
                }
                return Err(e);
            }
        };

        Ok(FrameOutcome {
            image,
            label: Some(label),
            boxes: boxes.len(),
        })
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove partially materialized {:?}: {}", path, e);
    }
}

/// Materialize `partition` with default write policies.
pub fn materialize(
    partition: &Partition,
    store: &RawStore,
    output_root: &Path,
    targets: &TargetClasses,
    min_area: u64,
) -> Result<MaterializeReport> {
    Materializer::new(store, output_root, targets)
        .with_policy(BoxPolicy {
            min_area,
            drop_degenerate: false,
        })
        .materialize(partition)
}

/// Copy the images of `frame_ids` into the flat directory `output_root`,
/// without labels or splits.
pub fn copy_images_flat<'i>(
    frame_ids: impl IntoIterator<Item = &'i String>,
    store: &RawStore,
    output_root: &Path,
    idempotency: Idempotency,
) -> Result<MaterializeReport> {
    let mut report = MaterializeReport::default();
    if create_output_directory(output_root)? {
        report
            .warnings
            .push(MaterializeWarning::OutputDirectoryExists(output_root.to_path_buf()));
    }

    let frame_ids: Vec<&String> = frame_ids.into_iter().collect();
    info!("Copying {} images into {:?}", frame_ids.len(), output_root);

    let locks = PathLocks::new();
    let pb = create_progress_bar(frame_ids.len() as u64, "Copy");
    let results: Vec<(String, Result<FrameOutcome>)> = frame_ids
        .par_iter()
        .map(|frame_id| {
            let source = store.image_path(frame_id);
            let result = if source.is_file() {
                let destination = output_root.join(format!("{}.{}", frame_id, store.image_ext()));
                copy_file_once(&source, &destination, idempotency, &locks).map(|image| FrameOutcome {
                    image,
                    label: None,
                    boxes: 0,
                })
            } else {
                Err(SubsetError::missing(frame_id.as_str(), source))
            };
            pb.inc(1);
            (frame_id.to_string(), result)
        })
        .collect();
    pb.finish_with_message("Copy complete");

    for (frame_id, result) in results {
        report.absorb(frame_id, None, result);
    }
    report.stats.print_summary();
    Ok(report)
}

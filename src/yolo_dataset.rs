use log::info;
use std::collections::BTreeSet;

use crate::config::{Mode, SubsetConfig};
use crate::dataset::split_frames;
use crate::error::Result;
use crate::io::{create_dataset_yaml, scan_corpus, CorpusScan};
use crate::materialize::{copy_images_flat, MaterializeReport, Materializer};
use crate::relevance::select;
use crate::types::Partition;

/// Result of a complete run.
#[derive(Debug)]
pub struct DatasetRun {
    /// Number of frames that satisfied the inclusion predicate
    pub relevant_frames: usize,
    /// The split, absent in negatives mode
    pub partition: Option<Partition>,
    pub report: MaterializeReport,
}

/// Main subset pipeline: relevance filter, split, materialization.
pub fn process_dataset(config: &SubsetConfig) -> Result<DatasetRun> {
    config.validate()?;

    let store = config.raw_store();
    let targets = config.target_classes()?;
    let predicate = config.predicate()?;

    let CorpusScan {
        mut corpus,
        failures: scan_failures,
    } = scan_corpus(&store)?;
    if config.mode == Mode::Negatives {
        // Candidates are images; one without a mask contains no excluded class
        let image_ids: BTreeSet<String> = store.list_image_ids()?.into_iter().collect();
        corpus.retain(|frame_id, _| image_ids.contains(frame_id));
        let unreadable: BTreeSet<&str> = scan_failures
            .iter()
            .map(|failure| failure.frame_id.as_str())
            .collect();
        for frame_id in image_ids {
            if !unreadable.contains(frame_id.as_str()) {
                corpus.entry(frame_id).or_default();
            }
        }
    }

    let relevant = select(&corpus, &predicate);
    info!(
        "{} of {} frames satisfy the inclusion predicate",
        relevant.len(),
        corpus.len()
    );

    if config.mode == Mode::Negatives {
        let mut report =
            copy_images_flat(&relevant, &store, &config.output_root, config.idempotency)?;
        report.absorb_failures(scan_failures);
        return Ok(DatasetRun {
            relevant_frames: relevant.len(),
            partition: None,
            report,
        });
    }

    let partition = split_frames(relevant.iter().cloned(), config.seed, &config.ratios())?;

    let materializer = Materializer::new(&store, &config.output_root, &targets)
        .with_policy(config.box_policy())
        .with_idempotency(config.idempotency)
        .with_workers(config.workers);
    let mut report = materializer.materialize(&partition)?;
    report.absorb_failures(scan_failures);

    if config.write_dataset_yaml {
        info!("Creating dataset.yaml file...");
        create_dataset_yaml(&config.output_root, &targets)?;
    }

    Ok(DatasetRun {
        relevant_frames: relevant.len(),
        partition: Some(partition),
        report,
    })
}

use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use crate::error::Result;

/// Read and parse a JSON file from a buffered stream
pub fn read_and_parse_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Create an output directory if absent. Returns `true` when it already existed.
///
/// Existing directories are kept as they are, so a previous run with a
/// different seed or predicate can leave frames behind in other splits.
pub fn create_output_directory(path: &Path) -> std::io::Result<bool> {
    if path.is_dir() {
        warn!(
            "Directory {:?} already exists. Make sure there is no train/val/test contamination \
             from a previously generated subset with a different seed.",
            path
        );
        Ok(true)
    } else {
        fs::create_dir_all(path)?;
        Ok(false)
    }
}

/// Build a dedicated rayon pool, or `None` to use the global one
pub fn create_io_thread_pool(workers: usize) -> Option<rayon::ThreadPool> {
    if workers == 0 {
        return None;
    }
    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            warn!("Failed to build a pool of {} workers, using the global pool: {}", workers, e);
            None
        }
    }
}

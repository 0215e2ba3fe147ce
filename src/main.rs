use clap::Parser;

use log::{error, info};
use std::process::ExitCode;

use rs19_subset::{process_dataset, Args};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.to_subset_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to read configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if !config.input_root.exists() {
        error!("The specified input_root does not exist: {:?}", config.input_root);
        return ExitCode::FAILURE;
    }

    info!("Starting subset generation ({:?} mode)...", config.mode);

    match process_dataset(&config) {
        Ok(run) => {
            if let Some(partition) = &run.partition {
                info!(
                    "train/val/test sizes: {:?} of {} relevant frames",
                    partition.sizes(),
                    run.relevant_frames
                );
            }
            if run.report.failures.is_empty() {
                info!("Subset generation completed successfully.");
                ExitCode::SUCCESS
            } else {
                for failure in &run.report.failures {
                    error!("{}: {}", failure.frame_id, failure.error);
                }
                error!("{} frames could not be processed.", run.report.failures.len());
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("Failed to process dataset: {}", e);
            ExitCode::FAILURE
        }
    }
}

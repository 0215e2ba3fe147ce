use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::conversion::BoxPolicy;
use crate::dataset::SplitRatios;
use crate::error::{Result, SubsetError};
use crate::io::{AnnotationKind, Idempotency, RawStore};
use crate::relevance::InclusionPredicate;
use crate::types::{ClassKey, TargetClasses};
use crate::utils::read_and_parse_json;

/// Command-line arguments for building a YOLO subset from RailSem19 annotations.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// JSON file holding a complete configuration; other flags are ignored when given
    #[arg(long = "config")]
    pub config: Option<String>,

    /// Root of the raw dataset (contains jpgs/, jsons/ and uint8/)
    #[arg(short = 'i', long = "input_root")]
    pub input_root: Option<String>,

    /// Root of the generated dataset
    #[arg(short = 'o', long = "output_root")]
    pub output_root: Option<String>,

    /// Which annotations the subset is built from
    #[arg(long = "mode", value_enum, default_value = "polygon")]
    pub mode: Mode,

    /// Seed for the train/val/test split
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Proportion of the relevant frames used for training
    #[arg(long = "train_ratio", default_value_t = 0.7, value_parser = validate_size)]
    pub train_ratio: f64,

    /// Proportion of the relevant frames used for validation
    #[arg(long = "val_ratio", default_value_t = 0.15, value_parser = validate_size)]
    pub val_ratio: f64,

    /// Proportion of the relevant frames used for testing
    #[arg(long = "test_ratio", default_value_t = 0.15, value_parser = validate_size)]
    pub test_ratio: f64,

    /// Target classes as KEY=CLASS_ID, e.g. person=0 (label) or 11=0 (mask index)
    #[arg(long = "target", value_delimiter = ',', value_parser = parse_target)]
    pub targets: Vec<(String, usize)>,

    /// Display names for dataset.yaml as CLASS_ID=NAME, e.g. 0=human
    #[arg(long = "class_name", value_delimiter = ',', value_parser = parse_class_name)]
    pub class_names: Vec<(usize, String)>,

    /// Classes that must all be present in a frame
    #[arg(long = "include", value_delimiter = ',')]
    pub include: Vec<String>,

    /// Classes that must not be present in a frame
    #[arg(long = "exclude", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Drop boxes whose pixel area is below this value
    #[arg(long = "min_area", default_value_t = 0)]
    pub min_area: u64,

    /// Drop boxes with zero width or height
    #[arg(long = "drop_degenerate")]
    pub drop_degenerate: bool,

    /// When existing output files are rewritten
    #[arg(long = "idempotency", value_enum, default_value = "presence")]
    pub idempotency: Idempotency,

    /// Worker threads for materialization (0 uses all cores)
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,

    /// Name of the raw subset directory
    #[arg(long = "subset", default_value = "rs19_val")]
    pub subset: String,

    /// Extension of the raw images
    #[arg(long = "image_ext", default_value = "jpg")]
    pub image_ext: String,

    /// Skip writing dataset.yaml
    #[arg(long = "no_dataset_yaml")]
    pub no_dataset_yaml: bool,
}

/// What a run produces.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Boxes from polygon annotations
    #[default]
    Polygon,
    /// Boxes from segmentation-mask contours
    Mask,
    /// Images whose masks contain none of the excluded classes, unlabelled
    Negatives,
}

// Validate that the size is between 0.0 and 1.0
fn validate_size(s: &str) -> std::result::Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SIZE must be between 0.0 and 1.0".to_string()),
    }
}

// Parse KEY=CLASS_ID
fn parse_target(s: &str) -> std::result::Result<(String, usize), String> {
    let (key, id) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected KEY=CLASS_ID, found '{}'", s))?;
    let id = id
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid class id in '{}': {}", s, e))?;
    Ok((key.trim().to_string(), id))
}

// Parse CLASS_ID=NAME
fn parse_class_name(s: &str) -> std::result::Result<(usize, String), String> {
    let (id, name) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CLASS_ID=NAME, found '{}'", s))?;
    let id = id
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid class id in '{}': {}", s, e))?;
    Ok((id, name.trim().to_string()))
}

/// Everything a run needs. Passed explicitly to each stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetConfig {
    pub seed: u64,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
    pub target_classes: BTreeMap<String, usize>,
    pub class_names: BTreeMap<usize, String>,
    pub min_area: u64,
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub mode: Mode,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub drop_degenerate: bool,
    pub idempotency: Idempotency,
    pub workers: usize,
    pub write_dataset_yaml: bool,
    pub subset: String,
    pub image_ext: String,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            train_ratio: 0.7,
            val_ratio: 0.15,
            test_ratio: 0.15,
            target_classes: BTreeMap::new(),
            class_names: BTreeMap::new(),
            min_area: 0,
            input_root: PathBuf::new(),
            output_root: PathBuf::new(),
            mode: Mode::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            drop_degenerate: false,
            idempotency: Idempotency::default(),
            workers: 0,
            write_dataset_yaml: true,
            subset: "rs19_val".to_string(),
            image_ext: "jpg".to_string(),
        }
    }
}

impl SubsetConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        read_and_parse_json(path)
    }

    pub fn ratios(&self) -> SplitRatios {
        SplitRatios {
            train: self.train_ratio,
            val: self.val_ratio,
            test: self.test_ratio,
        }
    }

    pub fn box_policy(&self) -> BoxPolicy {
        BoxPolicy {
            min_area: self.min_area,
            drop_degenerate: self.drop_degenerate,
        }
    }

    pub fn annotation_kind(&self) -> AnnotationKind {
        match self.mode {
            Mode::Polygon => AnnotationKind::Polygon,
            Mode::Mask | Mode::Negatives => AnnotationKind::Mask,
        }
    }

    pub fn raw_store(&self) -> RawStore {
        RawStore::new(&self.input_root, self.annotation_kind())
            .with_subset(&self.subset)
            .with_image_ext(&self.image_ext)
    }

    /// Parse a class key for this mode: mask modes use numeric class indices.
    pub fn class_key(&self, key: &str) -> Result<ClassKey> {
        match self.mode {
            Mode::Polygon => Ok(ClassKey::Label(key.to_string())),
            Mode::Mask | Mode::Negatives => key.trim().parse::<u8>().map(ClassKey::Index).map_err(|_| {
                SubsetError::InvalidConfig(format!(
                    "class '{}' is not a mask class index (0-255)",
                    key
                ))
            }),
        }
    }

    pub fn target_classes(&self) -> Result<TargetClasses> {
        let mut targets = TargetClasses::new();
        for (key, &class_id) in &self.target_classes {
            targets.insert(self.class_key(key)?, class_id);
        }
        for (&class_id, name) in &self.class_names {
            targets.set_name(class_id, name.clone());
        }
        Ok(targets)
    }

    /// The frame inclusion predicate.
    ///
    /// Without explicit `include` classes, a frame qualifies when any target
    /// class is present. In negatives mode only exclusions apply, defaulting
    /// to the target classes.
    pub fn predicate(&self) -> Result<InclusionPredicate> {
        let parse_all = |keys: &[String]| -> Result<Vec<ClassKey>> {
            keys.iter().map(|key| self.class_key(key)).collect()
        };

        let mut predicate = InclusionPredicate {
            absent: parse_all(&self.exclude)?,
            ..InclusionPredicate::default()
        };
        match self.mode {
            Mode::Polygon | Mode::Mask => {
                predicate.present = parse_all(&self.include)?;
                if predicate.present.is_empty() {
                    predicate.any_of = self.target_classes()?.keys().cloned().collect();
                }
            }
            Mode::Negatives => {
                if predicate.absent.is_empty() {
                    predicate.absent = self.target_classes()?.keys().cloned().collect();
                }
            }
        }
        Ok(predicate)
    }

    /// Check the configuration before any filesystem work.
    pub fn validate(&self) -> Result<()> {
        self.ratios().validate()?;
        if self.input_root.as_os_str().is_empty() || self.output_root.as_os_str().is_empty() {
            return Err(SubsetError::InvalidConfig(
                "input_root and output_root are required".to_string(),
            ));
        }
        let targets = self.target_classes()?;
        match self.mode {
            Mode::Polygon | Mode::Mask if targets.is_empty() => Err(SubsetError::InvalidConfig(
                "at least one target class is required".to_string(),
            )),
            Mode::Negatives if targets.is_empty() && self.exclude.is_empty() => {
                Err(SubsetError::InvalidConfig(
                    "negatives mode needs a class to exclude".to_string(),
                ))
            }
            _ => {
                self.predicate()?;
                Ok(())
            }
        }
    }
}

impl Args {
    /// Build the run configuration from a config file or from flags.
    pub fn to_subset_config(&self) -> Result<SubsetConfig> {
        if let Some(path) = &self.config {
            return SubsetConfig::from_json_file(Path::new(path));
        }

        let input_root = self
            .input_root
            .as_ref()
            .ok_or_else(|| SubsetError::InvalidConfig("--input_root is required".to_string()))?;
        let output_root = self
            .output_root
            .as_ref()
            .ok_or_else(|| SubsetError::InvalidConfig("--output_root is required".to_string()))?;

        Ok(SubsetConfig {
            seed: self.seed,
            train_ratio: self.train_ratio,
            val_ratio: self.val_ratio,
            test_ratio: self.test_ratio,
            target_classes: self.targets.iter().cloned().collect(),
            class_names: self.class_names.iter().cloned().collect(),
            min_area: self.min_area,
            input_root: PathBuf::from(input_root),
            output_root: PathBuf::from(output_root),
            mode: self.mode,
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            drop_degenerate: self.drop_degenerate,
            idempotency: self.idempotency,
            workers: self.workers,
            write_dataset_yaml: !self.no_dataset_yaml,
            subset: self.subset.clone(),
            image_ext: self.image_ext.clone(),
        })
    }
}

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;

use crate::error::{Result, SubsetError};
use crate::types::Partition;

const RATIO_TOLERANCE: f64 = 1e-6;

/// Fractions of the relevant frames assigned to each split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.15,
            test: 0.15,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Result<Self> {
        let ratios = Self { train, val, test };
        ratios.validate()?;
        Ok(ratios)
    }

    pub fn validate(&self) -> Result<()> {
        let valid_part = |r: f64| r.is_finite() && (0.0..=1.0).contains(&r);
        let sum = self.train + self.val + self.test;
        if valid_part(self.train)
            && valid_part(self.val)
            && valid_part(self.test)
            && (sum - 1.0).abs() <= RATIO_TOLERANCE
        {
            Ok(())
        } else {
            Err(SubsetError::InvalidRatios {
                train: self.train,
                val: self.val,
                test: self.test,
            })
        }
    }
}

// Number of items drawn for a fraction, rounded up like a held-out split
fn held_out_count(len: usize, fraction: f64) -> usize {
    let count = (len as f64 * fraction - RATIO_TOLERANCE).ceil();
    (count.max(0.0) as usize).min(len)
}

// Shuffle with a fresh generator for `seed`, then move the first
// `held_out` items out of `items`
fn seeded_holdout(items: &mut Vec<String>, held_out: usize, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    items.drain(0..held_out).collect()
}

/// Split frame ids into disjoint train, validation and test sets.
///
/// The ids are sorted first so the result depends only on the set and the
/// seed. The train share is drawn by one seeded shuffle; the held-out rest is
/// then divided between val and test by a second shuffle seeded the same way.
pub fn split_frames<I, S>(frame_ids: I, seed: u64, ratios: &SplitRatios) -> Result<Partition>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ratios.validate()?;

    let canonical: BTreeSet<String> = frame_ids.into_iter().map(Into::into).collect();
    let mut remaining: Vec<String> = canonical.into_iter().collect();

    let held_out_fraction = ratios.val + ratios.test;
    let held_out = held_out_count(remaining.len(), held_out_fraction);
    let mut rest = seeded_holdout(&mut remaining, held_out, seed);
    let train = remaining;

    let test_fraction = if held_out_fraction > 0.0 {
        ratios.test / held_out_fraction
    } else {
        0.0
    };
    let test_count = held_out_count(rest.len(), test_fraction);
    let test = seeded_holdout(&mut rest, test_count, seed);
    let val = rest;

    let partition = Partition {
        train: train.into_iter().collect(),
        val: val.into_iter().collect(),
        test: test.into_iter().collect(),
    };
    info!(
        "Split {} frames into train/val/test = {:?} (seed {})",
        partition.len(),
        partition.sizes(),
        seed
    );
    Ok(partition)
}

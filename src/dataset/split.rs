// Class balancing and stratified train/val/test splitting

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::SplitConfig;
use crate::constants::MIN_SPLIT_EXAMPLES;
use crate::error::{CourtsideError, Result};
use super::sequence::TrainingSequence;
use super::weighting::WeightedFrame;

/// Three disjoint subsets; membership is fixed once built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Split<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
    pub test: Vec<T>,
}

impl<T> Split<T> {
    pub fn total(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }
}

/// Balance hit/non-hit frames and split them, stratified on `weight > 0`.
///
/// Negatives are sampled without replacement up to `round(balance_ratio * positives)`;
/// test is carved first, then validation from the remainder at `val / (1 - test)`.
pub fn balance_and_split(weighted: &[WeightedFrame], config: &SplitConfig) -> Result<Split<WeightedFrame>> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    let positives: Vec<&WeightedFrame> = weighted.iter().filter(|f| f.is_positive()).collect();
    let negatives: Vec<&WeightedFrame> = weighted.iter().filter(|f| !f.is_positive()).collect();

    if positives.is_empty() {
        log::warn!("No frames with weight > 0 found");
    }
    if negatives.is_empty() {
        log::warn!("No non-hit frames found");
    }

    let sample_size = negative_sample_size(positives.len(), negatives.len(), config.balance_ratio);
    log::info!(
        "Balancing: {} positive, {} negative available, sampling {} negatives (ratio {})",
        positives.len(), negatives.len(), sample_size, config.balance_ratio
    );

    let sampled: Vec<&WeightedFrame> = negatives.choose_multiple(&mut rng, sample_size).copied().collect();

    let mut balanced: Vec<WeightedFrame> = positives.into_iter().chain(sampled).cloned().collect();
    balanced.shuffle(&mut rng);

    if balanced.len() < MIN_SPLIT_EXAMPLES {
        return Err(CourtsideError::InsufficientData {
            available: balanced.len(),
            required: MIN_SPLIT_EXAMPLES,
        });
    }

    let split = three_way_split(balanced, config, &mut rng, |f| f.is_positive());
    log::info!(
        "Split: {} train, {} val, {} test",
        split.train.len(), split.val.len(), split.test.len()
    );
    Ok(split)
}

/// Split landing sequences; there is no class label, so every item shares one stratum
pub fn split_sequences(sequences: Vec<TrainingSequence>, config: &SplitConfig) -> Result<Split<TrainingSequence>> {
    if sequences.is_empty() {
        return Err(CourtsideError::NoSequences);
    }
    if sequences.len() < MIN_SPLIT_EXAMPLES {
        return Err(CourtsideError::InsufficientData {
            available: sequences.len(),
            required: MIN_SPLIT_EXAMPLES,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut sequences = sequences;
    sequences.shuffle(&mut rng);
    Ok(three_way_split(sequences, config, &mut rng, |_| true))
}

/// Number of negatives to draw: `min(available, round(ratio * positives))`
pub fn negative_sample_size(positives: usize, negatives: usize, ratio: f64) -> usize {
    let target = (ratio.max(0.0) * positives as f64).round() as usize;
    target.min(negatives)
}

fn three_way_split<T, F>(items: Vec<T>, config: &SplitConfig, rng: &mut StdRng, key: F) -> Split<T>
where
    F: Fn(&T) -> bool,
{
    let (rest, test) = stratified_carve(items, config.test_fraction, rng, &key);

    let relative_val = if config.test_fraction < 1.0 {
        config.val_fraction / (1.0 - config.test_fraction)
    } else {
        0.0
    };
    let (train, val) = stratified_carve(rest, relative_val, rng, &key);

    Split { train, val, test }
}

/// Size of the carved subset: `ceil(fraction * n)`, kept within `[1, n - 1]` when the
/// fraction is positive so neither side ends up empty
fn carve_count(n: usize, fraction: f64) -> usize {
    if fraction <= 0.0 || n < 2 {
        return 0;
    }
    // tolerate float noise such as (0.1 / 0.9) * 90 = 10.000000000000002
    let count = (fraction * n as f64 - 1e-9).ceil() as usize;
    count.clamp(1, n - 1)
}

/// Split `items` into (kept, carved) with each stratum represented in `carved`
/// proportionally to its share of the whole. Input order is preserved on both sides.
pub fn stratified_carve<T, F>(items: Vec<T>, fraction: f64, rng: &mut StdRng, key: &F) -> (Vec<T>, Vec<T>)
where
    F: Fn(&T) -> bool,
{
    let n = items.len();
    let carve = carve_count(n, fraction);
    if carve == 0 {
        return (items, Vec::new());
    }

    let mut strata: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, item) in items.iter().enumerate() {
        strata[usize::from(key(item))].push(i);
    }

    let allocation = allocate(&[strata[0].len(), strata[1].len()], carve);

    let mut carved_mask = vec![false; n];
    for (members, take) in strata.iter_mut().zip(allocation) {
        members.shuffle(rng);
        for &i in members.iter().take(take) {
            carved_mask[i] = true;
        }
    }

    let mut kept = Vec::with_capacity(n - carve);
    let mut carved = Vec::with_capacity(carve);
    for (item, is_carved) in items.into_iter().zip(carved_mask) {
        if is_carved {
            carved.push(item);
        } else {
            kept.push(item);
        }
    }
    (kept, carved)
}

/// Largest-remainder allocation of `total` slots across strata of the given sizes
fn allocate(sizes: &[usize], total: usize) -> Vec<usize> {
    let n: usize = sizes.iter().sum();
    if n == 0 {
        return vec![0; sizes.len()];
    }

    let ideal: Vec<f64> = sizes.iter().map(|&s| total as f64 * s as f64 / n as f64).collect();
    let mut alloc: Vec<usize> = ideal.iter().map(|v| v.floor() as usize).collect();
    let mut remaining = total.saturating_sub(alloc.iter().sum());

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = ideal[a] - ideal[a].floor();
        let fb = ideal[b] - ideal[b].floor();
        fb.partial_cmp(&fa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(sizes[b].cmp(&sizes[a]))
    });

    while remaining > 0 {
        let mut progressed = false;
        for &i in &order {
            if remaining == 0 {
                break;
            }
            if alloc[i] < sizes[i] {
                alloc[i] += 1;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    alloc
}

// Model training
// Frames are decoded and pooled up front; epochs then run over the cached features.
// With augmentation on, the training split is instead re-decoded every epoch under fresh
// random augmentations.

pub mod history;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use chrono::Utc;
use ndarray::{array, stack, Array1, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{ImageConfig, PipelineConfig, TrainingConfig};
use crate::constants::*;
use crate::dataset::{
    balance_and_split, load_sequences, load_weighted, split_sequences, DatasetPaths, Split,
    TrainingSequence, WeightedFrame,
};
use crate::error::{CourtsideError, Result};
use crate::imaging::{blank, load_frame_augmented, load_sequence, Augmentation};
use crate::model::{pool_features, LinearRegressor, ModelKind};
use crate::report::BatchReport;

pub use history::{EpochRecord, TrainingHistory};

/// Pooled input features and regression target for one example
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub features: Array1<f64>,
    pub target: Array1<f64>,
}

/// Loss and mean absolute error over a set of examples
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub loss: f64,
    pub mae: f64,
    pub count: usize,
}

/// Augmentation for example `i` of an epoch; `None` decodes frames as they are
fn augmentation_for(epoch_seed: Option<u64>, i: usize) -> Augmentation {
    match epoch_seed {
        Some(seed) => Augmentation::sample(&mut StdRng::seed_from_u64(seed.wrapping_add(i as u64))),
        None => Augmentation::default(),
    }
}

/// Decode weighted frames into hit-scorer examples (target = weight).
/// A frame that cannot be decoded becomes a zero image with target 0.0 and is counted.
pub fn hit_examples(frames: &[WeightedFrame], image: ImageConfig, epoch_seed: Option<u64>) -> (Vec<Example>, BatchReport) {
    let decoded: Vec<(Example, bool)> = frames
        .par_iter()
        .enumerate()
        .map(|(i, wf)| {
            let augmentation = augmentation_for(epoch_seed, i);
            match load_frame_augmented(&wf.frame.path, image, &augmentation) {
                Ok(t) => (Example { features: pool_features(&t, FEATURE_GRID), target: array![wf.weight] }, true),
                Err(e) => {
                    log::warn!("Failed to read frame {}: {}; using blank image", wf.frame.path.display(), e);
                    (Example { features: pool_features(&blank(image), FEATURE_GRID), target: array![0.0] }, false)
                }
            }
        })
        .collect();

    let mut report = BatchReport::new("hit frame decode");
    let examples = decoded
        .into_iter()
        .map(|(example, ok)| {
            if ok { report.success() } else { report.skip(S_DECODE_FAILED) }
            example
        })
        .collect();
    (examples, report)
}

/// Decode sequences into landing-predictor examples (target = normalised x, y).
/// All frames of a sequence share one augmentation draw. The target x is mirrored only
/// when the flip applied and the first frame decoded.
pub fn landing_examples(
    sequences: &[TrainingSequence],
    image: ImageConfig,
    epoch_seed: Option<u64>,
) -> Result<(Vec<Example>, BatchReport)> {
    let decoded: Vec<(Example, Vec<bool>)> = sequences
        .par_iter()
        .enumerate()
        .map(|(i, seq)| {
            let augmentation = augmentation_for(epoch_seed, i);
            let paths: Vec<&Path> = seq.frames.iter().map(|f| f.path.as_path()).collect();
            let loaded = load_sequence(&paths, image, &augmentation)?;

            let first_decoded = loaded.decoded.first().copied().unwrap_or(false);
            let target = if augmentation.flip && first_decoded { seq.target.flipped() } else { seq.target };
            let example = Example {
                features: pool_features(&loaded.tensor, FEATURE_GRID),
                target: array![target.x, target.y],
            };
            Ok((example, loaded.decoded))
        })
        .collect::<Result<_>>()?;

    let mut report = BatchReport::new("landing frame decode");
    let examples = decoded
        .into_iter()
        .map(|(example, frames)| {
            for ok in frames {
                if ok { report.success() } else { report.skip(S_DECODE_FAILED) }
            }
            example
        })
        .collect();
    Ok((examples, report))
}

/// Where `fit` draws each epoch's training examples from
pub trait ExampleSource: Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Examples for one epoch; `seed` drives any augmentation
    fn epoch(&self, seed: u64) -> Result<Cow<'_, [Example]>>;
}

impl ExampleSource for [Example] {
    fn len(&self) -> usize {
        <[Example]>::len(self)
    }

    fn epoch(&self, _seed: u64) -> Result<Cow<'_, [Example]>> {
        Ok(Cow::Borrowed(self))
    }
}

impl ExampleSource for Vec<Example> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn epoch(&self, seed: u64) -> Result<Cow<'_, [Example]>> {
        self.as_slice().epoch(seed)
    }
}

/// Training frames re-decoded every epoch under fresh augmentations
pub struct AugmentedFrames<'a> {
    pub frames: &'a [WeightedFrame],
    pub image: ImageConfig,
}

impl ExampleSource for AugmentedFrames<'_> {
    fn len(&self) -> usize {
        self.frames.len()
    }

    fn epoch(&self, seed: u64) -> Result<Cow<'_, [Example]>> {
        let (examples, report) = hit_examples(self.frames, self.image, Some(seed));
        log::debug!("{}", report);
        Ok(Cow::Owned(examples))
    }
}

/// Training sequences re-decoded every epoch under fresh augmentations
pub struct AugmentedSequences<'a> {
    pub sequences: &'a [TrainingSequence],
    pub image: ImageConfig,
}

impl ExampleSource for AugmentedSequences<'_> {
    fn len(&self) -> usize {
        self.sequences.len()
    }

    fn epoch(&self, seed: u64) -> Result<Cow<'_, [Example]>> {
        let (examples, report) = landing_examples(self.sequences, self.image, Some(seed))?;
        log::debug!("{}", report);
        Ok(Cow::Owned(examples))
    }
}

/// Mean squared error and mean absolute error of `model` over `examples`
pub fn evaluate(model: &LinearRegressor, examples: &[Example]) -> Result<Evaluation> {
    if examples.is_empty() {
        return Err(CourtsideError::InsufficientData { available: 0, required: 1 });
    }

    let (mut sq, mut abs, mut n) = (0.0, 0.0, 0usize);
    for ex in examples {
        let y = model.forward(ex.features.view())?;
        if y.len() != ex.target.len() {
            return Err(CourtsideError::Model(format!(
                "example has {} targets, model has {} outputs",
                ex.target.len(), y.len()
            )));
        }
        let err = &y - &ex.target;
        sq += err.mapv(|e| e * e).sum();
        abs += err.mapv(f64::abs).sum();
        n += err.len();
    }

    Ok(Evaluation { loss: sq / n as f64, mae: abs / n as f64, count: examples.len() })
}

fn batch_rows<'a>(
    examples: &'a [Example],
    chunk: &[usize],
    field: impl Fn(&'a Example) -> ArrayView1<'a, f64>,
) -> Result<ndarray::Array2<f64>> {
    let rows: Vec<ArrayView1<'a, f64>> = chunk.iter().map(|&i| field(&examples[i])).collect();
    stack(Axis(0), &rows).map_err(|e| CourtsideError::Model(format!("cannot assemble batch: {}", e)))
}

/// Mini-batch training with early stopping on validation loss.
/// The model ends up holding the parameters of the best epoch.
pub fn fit<S: ExampleSource + ?Sized>(
    model: &mut LinearRegressor,
    train: &S,
    val: &[Example],
    config: &TrainingConfig,
    learning_rate: f64,
    seed: u64,
) -> Result<TrainingHistory> {
    if train.is_empty() || val.is_empty() {
        return Err(CourtsideError::InsufficientData {
            available: train.len().min(val.len()),
            required: 1,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut history = TrainingHistory::default();
    let mut best_loss = f64::INFINITY;
    let mut best_model = model.clone();
    let mut stale_epochs = 0;

    for epoch in 1..=config.epochs {
        let examples = train.epoch(rng.gen())?;
        let mut order: Vec<usize> = (0..examples.len()).collect();
        order.shuffle(&mut rng);

        let mut total = 0.0;
        for chunk in order.chunks(config.batch_size.max(1)) {
            let inputs = batch_rows(&examples, chunk, |e| e.features.view())?;
            let targets = batch_rows(&examples, chunk, |e| e.target.view())?;
            total += model.sgd_step(inputs.view(), targets.view(), learning_rate)? * chunk.len() as f64;
        }
        let train_loss = total / examples.len() as f64;

        let val_eval = evaluate(model, val)?;
        log::info!(
            "Epoch {}/{} - train loss {:.6}, val loss {:.6}, val MAE {:.6}",
            epoch, config.epochs, train_loss, val_eval.loss, val_eval.mae
        );
        history.push(EpochRecord {
            epoch,
            train_loss,
            val_loss: val_eval.loss,
            val_mae: val_eval.mae,
        });

        if val_eval.loss < best_loss - config.min_improvement {
            best_loss = val_eval.loss;
            best_model = model.clone();
            stale_epochs = 0;
        } else {
            stale_epochs += 1;
            if stale_epochs >= config.patience {
                log::info!("Early stopping after epoch {} (no improvement for {} epochs)", epoch, stale_epochs);
                break;
            }
        }
    }

    *model = best_model;
    model.trained_at = Some(Utc::now());
    Ok(history)
}

/// Artifacts and metrics of one training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model_path: PathBuf,
    pub history_path: PathBuf,
    pub history: TrainingHistory,
    pub test: Evaluation,
    pub split_sizes: (usize, usize, usize),
    /// Decode failures across all three splits
    pub decode: BatchReport,
}

fn split_sizes<T>(split: &Split<T>) -> (usize, usize, usize) {
    (split.train.len(), split.val.len(), split.test.len())
}

/// Fold the per-split decode reports into one
fn merge_reports(operation: &str, reports: &[&BatchReport]) -> BatchReport {
    let mut merged = BatchReport::new(operation);
    for report in reports {
        merged.merge(report);
    }
    merged.log_summary();
    merged
}

struct Artifacts {
    model_path: PathBuf,
    history_path: PathBuf,
    sizes: (usize, usize, usize),
    decode: BatchReport,
}

fn finish<S: ExampleSource + ?Sized>(
    model: &mut LinearRegressor,
    train: &S,
    val: &[Example],
    test: &[Example],
    config: &PipelineConfig,
    learning_rate: f64,
    artifacts: Artifacts,
) -> Result<TrainingOutcome> {
    let history = fit(model, train, val, &config.training, learning_rate, config.split.seed)?;
    history.write_csv(&artifacts.history_path)?;
    model.save(&artifacts.model_path)?;

    let test = evaluate(model, test)?;
    log::info!("Test loss {:.6}, test MAE {:.6} over {} examples", test.loss, test.mae, test.count);

    Ok(TrainingOutcome {
        model_path: artifacts.model_path,
        history_path: artifacts.history_path,
        history,
        test,
        split_sizes: artifacts.sizes,
        decode: artifacts.decode,
    })
}

/// Weight, balance, split and fit the hit-frame scorer; writes model and history to `out_dir`
pub fn train_hit_scorer(paths: &DatasetPaths, config: &PipelineConfig, out_dir: &Path) -> Result<TrainingOutcome> {
    let weighted = load_weighted(paths, config)?;
    let split = balance_and_split(&weighted.frames(), &config.split)?;

    log::info!("Decoding {} frames", split.total());
    let (train, train_report) = hit_examples(&split.train, config.image, None);
    let (val, val_report) = hit_examples(&split.val, config.image, None);
    let (test, test_report) = hit_examples(&split.test, config.image, None);

    let artifacts = Artifacts {
        model_path: out_dir.join(HIT_MODEL_FILENAME),
        history_path: out_dir.join(HIT_HISTORY_FILENAME),
        sizes: split_sizes(&split),
        decode: merge_reports("hit frame decode", &[&train_report, &val_report, &test_report]),
    };
    let mut model = LinearRegressor::new(ModelKind::HitFrameScorer, 1, config.image);
    let lr = config.training.hit_learning_rate;
    if config.training.augment {
        let source = AugmentedFrames { frames: &split.train, image: config.image };
        finish(&mut model, &source, &val, &test, config, lr, artifacts)
    } else {
        finish(&mut model, train.as_slice(), &val, &test, config, lr, artifacts)
    }
}

/// Build landing sequences, split them and fit the landing predictor
pub fn train_landing_predictor(paths: &DatasetPaths, config: &PipelineConfig, out_dir: &Path) -> Result<TrainingOutcome> {
    let weighted = load_weighted(paths, config)?;
    let dataset = load_sequences(paths, &weighted, config)?;
    let split = split_sequences(dataset.sequences, &config.split)?;

    log::info!("Decoding {} sequences", split.total());
    let (train, train_report) = landing_examples(&split.train, config.image, None)?;
    let (val, val_report) = landing_examples(&split.val, config.image, None)?;
    let (test, test_report) = landing_examples(&split.test, config.image, None)?;

    let artifacts = Artifacts {
        model_path: out_dir.join(LANDING_MODEL_FILENAME),
        history_path: out_dir.join(LANDING_HISTORY_FILENAME),
        sizes: split_sizes(&split),
        decode: merge_reports("landing frame decode", &[&train_report, &val_report, &test_report]),
    };
    let n = config.sequence.sequence_length;
    let mut model = LinearRegressor::new(ModelKind::LandingPredictor, n, config.image);
    let lr = config.training.landing_learning_rate;
    if config.training.augment {
        let source = AugmentedSequences { sequences: &split.train, image: config.image };
        finish(&mut model, &source, &val, &test, config, lr, artifacts)
    } else {
        finish(&mut model, train.as_slice(), &val, &test, config, lr, artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;
    use crate::coords::NormalizedPoint;
    use crate::frames::Frame;

    const SMALL: ImageConfig = ImageConfig { width: 16, height: 16 };

    fn tiny_model() -> LinearRegressor {
        let mut model = LinearRegressor::new(ModelKind::HitFrameScorer, 1, SMALL);
        model.grid = 1;
        model.weights = ndarray::Array2::zeros((1, 3));
        model
    }

    fn example(v: f64, target: f64) -> Example {
        Example { features: array![v, v, v], target: array![target] }
    }

    fn config(epochs: usize, patience: usize) -> TrainingConfig {
        TrainingConfig { epochs, patience, batch_size: 2, ..TrainingConfig::default() }
    }

    /// Solid-colour frame with a brighter left half
    fn write_frame(dir: &Path, name: &str, level: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(16, 16, |x, _| if x < 8 { Rgb([level, level, level]) } else { Rgb([10, 10, 10]) })
            .save(&path)
            .unwrap();
        path
    }

    fn sequence(paths: &[PathBuf], target: NormalizedPoint) -> TrainingSequence {
        TrainingSequence {
            video_id: "Frames/IST01".to_string(),
            shot_id: "IST01".to_string(),
            frames: paths.iter().map(|p| Frame::new(p.clone())).collect(),
            target,
        }
    }

    fn seed_where(flip: bool) -> u64 {
        (0..256).find(|s| augmentation_for(Some(*s), 0).flip == flip).unwrap()
    }

    #[test]
    fn test_evaluate() {
        let model = tiny_model();
        let eval = evaluate(&model, &[example(1.0, 1.0), example(0.0, 0.5)]).unwrap();
        assert!((eval.loss - 0.625).abs() < 1e-12);
        assert!((eval.mae - 0.75).abs() < 1e-12);
        assert_eq!(eval.count, 2);
        assert!(evaluate(&model, &[]).is_err());
        let wrong = Example { features: array![1.0, 1.0, 1.0], target: array![1.0, 0.0] };
        assert!(matches!(evaluate(&model, &[wrong]), Err(CourtsideError::Model(_))));
    }

    #[test]
    fn test_fit_learns_and_records_history() {
        let train = vec![example(1.0, 1.0), example(0.0, 0.0), example(0.9, 0.9), example(0.1, 0.1)];
        let val = vec![example(0.8, 0.8), example(0.2, 0.2)];

        let mut model = tiny_model();
        let before = evaluate(&model, &val).unwrap();
        let history = fit(&mut model, &train, &val, &config(30, 30), 0.1, 1).unwrap();
        let after = evaluate(&model, &val).unwrap();

        assert_eq!(history.len(), 30);
        assert!(after.loss < before.loss);
        assert!(model.trained_at.is_some());
        // the kept epoch is within min_improvement of the lowest recorded loss
        let best = history.best().unwrap();
        assert!(after.loss >= best.val_loss);
        assert!(after.loss - best.val_loss <= DEFAULT_MIN_IMPROVEMENT);
    }

    #[test]
    fn test_early_stopping_restores_best() {
        // a learning rate this large diverges after the first step
        let train = vec![example(1.0, 1.0), example(0.0, 0.0)];
        let val = vec![example(1.0, 1.0)];

        let mut model = tiny_model();
        let history = fit(&mut model, &train, &val, &config(50, 3), 10.0, 1).unwrap();

        assert!(history.len() < 50);
        let best = history.best().unwrap();
        let restored = evaluate(&model, &val).unwrap();
        assert!((restored.loss - best.val_loss).abs() <= DEFAULT_MIN_IMPROVEMENT);
    }

    #[test]
    fn test_fit_requires_train_and_val() {
        let mut model = tiny_model();
        let err = fit(&mut model, &vec![example(1.0, 1.0)], &[], &config(5, 5), 0.1, 1);
        assert!(matches!(err, Err(CourtsideError::InsufficientData { .. })));
    }

    #[test]
    fn test_undecodable_hit_frame_gets_zero_target_and_is_counted() {
        let dir = TempDir::new().unwrap();
        let good = write_frame(dir.path(), "frame_0001.png", 200);
        let bad = dir.path().join("frame_0002.jpg");
        std::fs::write(&bad, b"not an image").unwrap();

        let frames = vec![
            WeightedFrame { frame: Frame::new(good), weight: 0.75 },
            WeightedFrame { frame: Frame::new(bad), weight: 1.0 },
        ];
        let (examples, report) = hit_examples(&frames, SMALL, None);

        assert_eq!(examples[0].target, array![0.75]);
        assert_eq!(examples[1].target, array![0.0]);
        assert!(examples[1].features.iter().all(|v| *v == 0.0));
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped_for(S_DECODE_FAILED), 1);
    }

    #[test]
    fn test_flip_augmentation_mirrors_landing_target() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<PathBuf> = (0..3).map(|i| write_frame(dir.path(), &format!("frame_{:04}.png", i), 250)).collect();
        let seqs = vec![sequence(&paths, NormalizedPoint::new(0.2, 0.7))];

        let (flipped, report) = landing_examples(&seqs, SMALL, Some(seed_where(true))).unwrap();
        assert!((flipped[0].target[0] - 0.8).abs() < 1e-12);
        assert_eq!(flipped[0].target[1], 0.7);
        assert_eq!(report.processed, 3);

        let (kept, _) = landing_examples(&seqs, SMALL, Some(seed_where(false))).unwrap();
        assert_eq!(kept[0].target, array![0.2, 0.7]);

        let (plain, _) = landing_examples(&seqs, SMALL, None).unwrap();
        assert_eq!(plain[0].target, array![0.2, 0.7]);
        assert_eq!(plain[0].features.len(), 9 * (FEATURE_GRID * FEATURE_GRID) as usize);
    }

    #[test]
    fn test_unreadable_first_frame_keeps_landing_target() {
        let dir = TempDir::new().unwrap();
        let good = write_frame(dir.path(), "frame_0001.png", 250);
        let missing = dir.path().join("frame_0000.png");
        let seqs = vec![sequence(&[missing, good.clone(), good], NormalizedPoint::new(0.2, 0.7))];

        let (examples, report) = landing_examples(&seqs, SMALL, Some(seed_where(true))).unwrap();
        assert_eq!(examples[0].target, array![0.2, 0.7]);
        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped_for(S_DECODE_FAILED), 1);
    }

    #[test]
    fn test_augmented_frames_redraw_every_epoch() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<WeightedFrame> = (0..4)
            .map(|i| WeightedFrame {
                frame: Frame::new(write_frame(dir.path(), &format!("frame_{:04}.png", i), 60 * i as u8)),
                weight: i as f64 / 3.0,
            })
            .collect();
        let source = AugmentedFrames { frames: &frames, image: SMALL };

        assert_eq!(ExampleSource::len(&source), 4);
        let a = source.epoch(1).unwrap().into_owned();
        let b = source.epoch(2).unwrap().into_owned();
        assert_eq!(a.len(), 4);
        assert_ne!(a, b);
        assert_eq!(source.epoch(1).unwrap().into_owned(), a);
        // targets never move under augmentation
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.target, y.target);
        }

        let (val, _) = hit_examples(&frames, SMALL, None);
        let mut model = LinearRegressor::new(ModelKind::HitFrameScorer, 1, SMALL);
        let history = fit(&mut model, &source, &val, &config(3, 10), 0.01, 7).unwrap();
        assert_eq!(history.len(), 3);
    }
}

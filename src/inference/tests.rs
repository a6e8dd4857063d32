// Inference pipeline tests
// Frames are generated solid-grey PNGs; the scorer and predictor are stubs.

use std::path::{Path, PathBuf};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

use super::*;
use crate::config::{CourtConfig, ImageConfig, PipelineConfig, SequenceConfig};
use crate::error::Result;
use crate::imaging::ImageTensor;

/// Score = mean intensity, so the brightest frame is the hit
struct BrightnessScorer;

impl Scorer for BrightnessScorer {
    fn score(&self, image: &ImageTensor) -> Result<f64> {
        Ok(image.data.mapv(f64::from).mean().unwrap_or(0.0))
    }
}

/// Brightness scorer that errors on mid-grey frames and returns NaN on black ones
struct PickyScorer;

impl Scorer for PickyScorer {
    fn score(&self, image: &ImageTensor) -> Result<f64> {
        let mean = BrightnessScorer.score(image)?;
        if (mean - 128.0 / 255.0).abs() < 1e-3 {
            Err(CourtsideError::Model("scorer rejected frame".to_string()))
        } else if mean == 0.0 {
            Ok(f64::NAN)
        } else {
            Ok(mean)
        }
    }
}

/// Encodes the stacked channel count in x and the mean of the centre frame in y
struct ShapePredictor;

impl SequencePredictor for ShapePredictor {
    fn predict(&self, sequence: &ImageTensor) -> Result<NormalizedPoint> {
        let centre = sequence.channels() / 3 / 2;
        let mean = sequence.channel(centre * 3).mapv(f64::from).mean().unwrap_or(0.0);
        Ok(NormalizedPoint::new(sequence.channels() as f64 / 100.0, mean))
    }
}

struct FailingPredictor;

impl SequencePredictor for FailingPredictor {
    fn predict(&self, _sequence: &ImageTensor) -> Result<NormalizedPoint> {
        Err(CourtsideError::Model("forward pass failed".to_string()))
    }
}

fn config(sequence_length: usize) -> PipelineConfig {
    PipelineConfig {
        image: ImageConfig { width: 8, height: 8 },
        sequence: SequenceConfig { sequence_length },
        ..PipelineConfig::default()
    }
}

fn write_frame(dir: &Path, index: usize, level: u8) -> PathBuf {
    let path = dir.join(format!("frame_{:04}.png", index));
    RgbImage::from_pixel(8, 8, Rgb([level, level, level])).save(&path).unwrap();
    path
}

/// Frames 0..levels.len() with the given grey levels
fn video(levels: &[u8]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (i, level) in levels.iter().enumerate() {
        write_frame(dir.path(), i, *level);
    }
    dir
}

fn name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().to_string()
}

#[test]
fn test_happy_path_visits_every_state() {
    let dir = video(&[10, 20, 30, 40, 50, 60, 70, 255, 70, 60, 50, 40]);
    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(5));

    let (trace, result) = pipeline.run_traced(dir.path());
    assert_eq!(
        trace,
        vec![
            PipelineState::ListFrames,
            PipelineState::ScoreFrames,
            PipelineState::SelectBestHit,
            PipelineState::BuildSequence,
            PipelineState::PredictLanding,
            PipelineState::Denormalize,
            PipelineState::Done,
        ]
    );

    let prediction = result.unwrap();
    assert_eq!(name(&prediction.hit_frame), "frame_0007.png");
    assert!((prediction.hit_score - 1.0).abs() < 1e-6);
    let seq: Vec<String> = prediction.sequence.iter().map(|p| name(p)).collect();
    assert_eq!(seq, vec!["frame_0005.png", "frame_0006.png", "frame_0007.png", "frame_0008.png", "frame_0009.png"]);

    assert!((prediction.normalized.x - 0.15).abs() < 1e-9);
    assert!((prediction.normalized.y - 1.0).abs() < 1e-6);
    let court = CourtConfig::default();
    assert!((prediction.position.dist_from_left_m - 0.15 * court.width_m).abs() < 1e-9);
    assert!((prediction.position.dist_from_baseline_m - court.length_m).abs() < 1e-4);
    assert_eq!(prediction.scoring.processed, 12);
}

#[test]
fn test_tie_goes_to_first_frame_in_file_order() {
    let dir = video(&[10, 200, 50, 200, 10]);
    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(3));
    let prediction = pipeline.run(dir.path()).unwrap();
    assert_eq!(name(&prediction.hit_frame), "frame_0001.png");
}

#[test]
fn test_hit_near_end_repeats_last_frame() {
    let dir = video(&[10, 20, 30, 40, 250]);
    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(5));
    let prediction = pipeline.run(dir.path()).unwrap();
    let seq: Vec<String> = prediction.sequence.iter().map(|p| name(p)).collect();
    assert_eq!(seq, vec!["frame_0002.png", "frame_0003.png", "frame_0004.png", "frame_0004.png", "frame_0004.png"]);
}

#[test]
fn test_no_parsable_frames() {
    let dir = TempDir::new().unwrap();
    RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])).save(dir.path().join("cover.png")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "frame_0001").unwrap();

    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(5));
    let (trace, result) = pipeline.run_traced(dir.path());
    assert!(matches!(result, Err(PipelineFailure::NoParsableFrames(_))));
    assert_eq!(trace.len(), 2);
    assert!(matches!(trace[1], PipelineState::Failed(_)));
}

#[test]
fn test_missing_directory_fails_listing() {
    let dir = TempDir::new().unwrap();
    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(5));
    let result = pipeline.run(&dir.path().join("IST99"));
    assert!(matches!(result, Err(PipelineFailure::FrameListing(_))));
}

#[test]
fn test_unreadable_frames_are_skipped_and_blanked() {
    let dir = video(&[10, 20, 220, 30]);
    std::fs::write(dir.path().join("frame_0004.png"), b"garbage").unwrap();
    write_frame(dir.path(), 5, 15);

    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(7));
    let prediction = pipeline.run(dir.path()).unwrap();

    assert_eq!(name(&prediction.hit_frame), "frame_0002.png");
    assert_eq!(prediction.scoring.processed, 5);
    assert_eq!(prediction.scoring.skipped_for(S_DECODE_FAILED), 1);
    // the corrupt frame still sits in the window, as a zero image
    assert_eq!(prediction.sequence.len(), 7);
    assert!(prediction.sequence.iter().any(|p| name(p) == "frame_0004.png"));
    assert!((prediction.normalized.x - 0.21).abs() < 1e-9);
}

#[test]
fn test_scorer_failures_are_counted_apart_from_decode_failures() {
    let dir = video(&[10, 128, 0, 200, 128, 30]);
    std::fs::write(dir.path().join("frame_0006.png"), b"garbage").unwrap();

    let pipeline = InferencePipeline::new(PickyScorer, ShapePredictor, config(3));
    let prediction = pipeline.run(dir.path()).unwrap();

    assert_eq!(name(&prediction.hit_frame), "frame_0003.png");
    assert_eq!(prediction.scoring.processed, 3);
    assert_eq!(prediction.scoring.skipped_for(S_SCORE_FAILED), 3);
    assert_eq!(prediction.scoring.skipped_for(S_DECODE_FAILED), 1);
}

#[test]
fn test_scorer_failing_everywhere_is_no_scores() {
    let dir = video(&[128, 128, 0]);
    let pipeline = InferencePipeline::new(PickyScorer, ShapePredictor, config(3));
    let (trace, result) = pipeline.run_traced(dir.path());
    assert_eq!(result, Err(PipelineFailure::NoScores { attempted: 3 }));
    assert!(!trace.contains(&PipelineState::SelectBestHit));
}

#[test]
fn test_all_frames_unreadable_is_no_scores() {
    let dir = TempDir::new().unwrap();
    for i in 0..3 {
        std::fs::write(dir.path().join(format!("frame_{:04}.jpg", i)), b"garbage").unwrap();
    }
    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(5));
    assert_eq!(pipeline.run(dir.path()), Err(PipelineFailure::NoScores { attempted: 3 }));
}

#[test]
fn test_predictor_error_fails_run() {
    let dir = video(&[10, 20, 30]);
    let pipeline = InferencePipeline::new(BrightnessScorer, FailingPredictor, config(3));
    let (trace, result) = pipeline.run_traced(dir.path());
    assert!(matches!(result, Err(PipelineFailure::Model(_))));
    assert!(trace.contains(&PipelineState::PredictLanding));
    assert!(!trace.contains(&PipelineState::Denormalize));
}

#[test]
fn test_invalid_court_fails_denormalize() {
    let dir = video(&[10, 20, 30]);
    let mut cfg = config(3);
    cfg.court = CourtConfig { width_m: 0.0, length_m: 11.89 };
    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, cfg);
    assert_eq!(pipeline.run(dir.path()), Err(PipelineFailure::InvalidCourt));
}

#[test]
fn test_even_sequence_length_is_rejected() {
    let dir = video(&[10, 20, 30]);
    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(4));
    assert!(matches!(pipeline.run(dir.path()), Err(PipelineFailure::Config(_))));
}

#[test]
fn test_error_to_ground_truth() {
    let dir = video(&[10, 20, 30]);
    let pipeline = InferencePipeline::new(BrightnessScorer, ShapePredictor, config(3));
    let prediction = pipeline.run(dir.path()).unwrap();
    let truth = NormalizedPoint::new(prediction.normalized.x, prediction.normalized.y + 0.5);
    assert!((prediction.error_to(&truth) - 0.5).abs() < 1e-9);
}

// Landing inference
// Frame directory -> best hit frame -> clamped sequence -> landing point in metres.
// Runs as an explicit state machine; any state can end the run in Failed.

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::{Path, PathBuf};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::constants::{S_DECODE_FAILED, S_SCORE_FAILED};
use crate::coords::{denormalize, CourtPosition, NormalizedPoint};
use crate::dataset::build_sequence;
use crate::error::CourtsideError;
use crate::frames::discover::list_numbered_frames;
use crate::frames::Frame;
use crate::imaging::{load_frame, load_sequence, Augmentation};
use crate::model::{Scorer, SequencePredictor};
use crate::report::BatchReport;

/// Why a run ended in `Failed`
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum PipelineFailure {
    #[error("Cannot list frames: {0}")]
    FrameListing(String),

    #[error("No frame in {0} has a parsable index")]
    NoParsableFrames(String),

    #[error("None of {attempted} frames could be scored")]
    NoScores { attempted: usize },

    #[error("Sequence length mismatch: expected {expected}, got {actual}")]
    SequenceLengthMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Court dimensions must be positive")]
    InvalidCourt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PipelineState {
    ListFrames,
    ScoreFrames,
    SelectBestHit,
    BuildSequence,
    PredictLanding,
    Denormalize,
    Done,
    Failed(PipelineFailure),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Result of one successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub video_dir: PathBuf,
    pub hit_frame: PathBuf,
    pub hit_score: f64,
    pub sequence: Vec<PathBuf>,
    pub normalized: NormalizedPoint,
    pub position: CourtPosition,
    pub scoring: BatchReport,
}

impl Prediction {
    /// Euclidean error against a known landing point, in normalised units
    pub fn error_to(&self, actual: &NormalizedPoint) -> f64 {
        self.normalized.distance(actual)
    }
}

/// Intermediate values handed from state to state
#[derive(Debug, Default)]
struct RunContext {
    frames: Vec<Frame>,
    scores: Vec<Option<f64>>,
    scoring: BatchReport,
    hit: Option<(usize, f64)>,
    sequence: Vec<Frame>,
    normalized: Option<NormalizedPoint>,
    position: Option<CourtPosition>,
}

pub struct InferencePipeline<S: Scorer, P: SequencePredictor> {
    scorer: S,
    predictor: P,
    config: PipelineConfig,
}

impl<S: Scorer, P: SequencePredictor> InferencePipeline<S, P> {
    pub fn new(scorer: S, predictor: P, config: PipelineConfig) -> Self {
        Self { scorer, predictor, config }
    }

    pub fn run(&self, video_dir: &Path) -> Result<Prediction, PipelineFailure> {
        self.run_traced(video_dir).1
    }

    /// Run and also return every state visited, ending with `Done` or `Failed`
    pub fn run_traced(&self, video_dir: &Path) -> (Vec<PipelineState>, Result<Prediction, PipelineFailure>) {
        let mut ctx = RunContext::default();
        let mut state = PipelineState::ListFrames;
        let mut trace = vec![state.clone()];

        while !state.is_terminal() {
            state = self.advance(&state, video_dir, &mut ctx);
            log::debug!("{} -> {}", video_dir.display(), state);
            trace.push(state.clone());
        }

        let result = match state {
            PipelineState::Failed(reason) => {
                log::warn!("Inference on {} failed: {}", video_dir.display(), reason);
                Err(reason)
            }
            _ => self.finish(video_dir, ctx),
        };
        (trace, result)
    }

    fn advance(&self, state: &PipelineState, video_dir: &Path, ctx: &mut RunContext) -> PipelineState {
        match state {
            PipelineState::ListFrames => self.list_frames(video_dir, ctx),
            PipelineState::ScoreFrames => self.score_frames(ctx),
            PipelineState::SelectBestHit => select_best_hit(ctx),
            PipelineState::BuildSequence => self.build_sequence(ctx),
            PipelineState::PredictLanding => self.predict_landing(ctx),
            PipelineState::Denormalize => self.denormalize(ctx),
            PipelineState::Done => PipelineState::Done,
            PipelineState::Failed(reason) => PipelineState::Failed(reason.clone()),
        }
    }

    fn list_frames(&self, video_dir: &Path, ctx: &mut RunContext) -> PipelineState {
        match list_numbered_frames(video_dir) {
            Ok(video) if video.is_empty() => {
                PipelineState::Failed(PipelineFailure::NoParsableFrames(video_dir.display().to_string()))
            }
            Ok(video) => {
                log::info!("Found {} frames in {}", video.len(), video_dir.display());
                ctx.frames = video.frames;
                PipelineState::ScoreFrames
            }
            Err(e) => PipelineState::Failed(PipelineFailure::FrameListing(e.to_string())),
        }
    }

    fn score_frames(&self, ctx: &mut RunContext) -> PipelineState {
        let image = self.config.image;
        let outcomes: Vec<std::result::Result<f64, &'static str>> = ctx
            .frames
            .par_iter()
            .map(|frame| {
                let tensor = match load_frame(&frame.path, image) {
                    Ok(t) => t,
                    Err(e) => {
                        log::warn!("Skipping frame {}: {}", frame.path.display(), e);
                        return Err(S_DECODE_FAILED);
                    }
                };
                match self.scorer.score(&tensor) {
                    Ok(s) if s.is_finite() => Ok(s),
                    Ok(s) => {
                        log::warn!("Non-finite score {} for {}", s, frame.path.display());
                        Err(S_SCORE_FAILED)
                    }
                    Err(e) => {
                        log::warn!("Scoring failed for {}: {}", frame.path.display(), e);
                        Err(S_SCORE_FAILED)
                    }
                }
            })
            .collect();

        ctx.scoring = BatchReport::new("scoring");
        for outcome in &outcomes {
            match outcome {
                Ok(_) => ctx.scoring.success(),
                Err(token) => ctx.scoring.skip(token),
            }
        }
        ctx.scoring.log_summary();
        ctx.scores = outcomes.into_iter().map(|o| o.ok()).collect();

        if ctx.scoring.processed == 0 {
            return PipelineState::Failed(PipelineFailure::NoScores { attempted: ctx.frames.len() });
        }
        PipelineState::SelectBestHit
    }

    fn build_sequence(&self, ctx: &mut RunContext) -> PipelineState {
        let Some((position, _)) = ctx.hit else {
            return PipelineState::Failed(PipelineFailure::NoScores { attempted: ctx.frames.len() });
        };

        match build_sequence(&ctx.frames, position, self.config.sequence.sequence_length) {
            Ok(seq) => {
                ctx.sequence = seq;
                PipelineState::PredictLanding
            }
            Err(CourtsideError::SequenceLengthMismatch { expected, actual }) => {
                PipelineState::Failed(PipelineFailure::SequenceLengthMismatch { expected, actual })
            }
            Err(e) => PipelineState::Failed(PipelineFailure::Config(e.to_string())),
        }
    }

    fn predict_landing(&self, ctx: &mut RunContext) -> PipelineState {
        let paths: Vec<&Path> = ctx.sequence.iter().map(|f| f.path.as_path()).collect();

        let predicted = load_sequence(&paths, self.config.image, &Augmentation::default())
            .and_then(|loaded| {
                if loaded.blank_count() > 0 {
                    log::warn!("{} of {} sequence frames are blank", loaded.blank_count(), paths.len());
                }
                self.predictor.predict(&loaded.tensor)
            });

        match predicted {
            Ok(point) => {
                log::info!("Predicted normalised landing ({:.4}, {:.4})", point.x, point.y);
                ctx.normalized = Some(point);
                PipelineState::Denormalize
            }
            Err(e) => PipelineState::Failed(PipelineFailure::Model(e.to_string())),
        }
    }

    fn denormalize(&self, ctx: &mut RunContext) -> PipelineState {
        let Some(point) = ctx.normalized else {
            return PipelineState::Failed(PipelineFailure::Model("no landing prediction".to_string()));
        };
        match denormalize(point.x, point.y, self.config.court.width_m, self.config.court.length_m) {
            Some(pos) => {
                ctx.position = Some(pos);
                PipelineState::Done
            }
            None => PipelineState::Failed(PipelineFailure::InvalidCourt),
        }
    }

    fn finish(&self, video_dir: &Path, ctx: RunContext) -> Result<Prediction, PipelineFailure> {
        match (ctx.hit, ctx.normalized, ctx.position) {
            (Some((position, hit_score)), Some(normalized), Some(court_position)) => Ok(Prediction {
                video_dir: video_dir.to_path_buf(),
                hit_frame: ctx.frames[position].path.clone(),
                hit_score,
                sequence: ctx.sequence.into_iter().map(|f| f.path).collect(),
                normalized,
                position: court_position,
                scoring: ctx.scoring,
            }),
            _ => Err(PipelineFailure::Model("pipeline finished without a prediction".to_string())),
        }
    }
}

/// Highest score wins; on ties the earliest frame in file order
fn select_best_hit(ctx: &mut RunContext) -> PipelineState {
    let mut best: Option<(usize, f64)> = None;
    for (i, score) in ctx.scores.iter().enumerate() {
        if let Some(s) = *score {
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((i, s));
            }
        }
    }

    match best {
        Some((i, s)) => {
            log::info!("Best hit frame {} (score {:.4})", ctx.frames[i].file_name(), s);
            ctx.hit = Some((i, s));
            PipelineState::BuildSequence
        }
        None => PipelineState::Failed(PipelineFailure::NoScores { attempted: ctx.frames.len() }),
    }
}

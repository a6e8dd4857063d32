// Landing sequences
// A fixed odd-length window of frames centred on the canonical hit, paired with the
// landing point of the shot the video records.

use rayon::prelude::*;
use serde::Serialize;

use crate::constants::{S_NO_HIT, S_NO_LANDING, S_SHORT_SEQUENCE, S_UNPARSABLE};
use crate::coords::NormalizedPoint;
use crate::error::{CourtsideError, Result};
use crate::frames::{video_name, Frame};
use crate::labels::landing::LandingTable;
use crate::report::BatchReport;
use super::weighting::WeightedVideo;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSequence {
    pub video_id: String,
    pub shot_id: String,
    pub frames: Vec<Frame>,
    pub target: NormalizedPoint,
}

/// Positions for a window of `length` centred on `center`, clamped to `[0, len - 1]`.
/// Edge frames repeat instead of the window shrinking.
pub fn window_positions(len: usize, center: usize, length: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let half = (length / 2) as i64;
    let center = center as i64;
    let last = (len - 1) as i64;
    (center - half..=center + half)
        .map(|i| i.clamp(0, last) as usize)
        .collect()
}

/// Select the clamped window of frames around `hit_position`
pub fn build_sequence<T: Clone>(video_frames: &[T], hit_position: usize, sequence_length: usize) -> Result<Vec<T>> {
    if sequence_length % 2 == 0 {
        return Err(CourtsideError::Config(format!(
            "sequence length must be odd, got {}",
            sequence_length
        )));
    }

    let sequence: Vec<T> = window_positions(video_frames.len(), hit_position, sequence_length)
        .into_iter()
        .map(|i| video_frames[i].clone())
        .collect();

    if sequence.len() != sequence_length {
        return Err(CourtsideError::SequenceLengthMismatch {
            expected: sequence_length,
            actual: sequence.len(),
        });
    }
    Ok(sequence)
}

/// Landing point for a shot id (the video directory's basename)
pub fn link_to_landing(shot_id: &str, landing: &LandingTable) -> Result<NormalizedPoint> {
    landing
        .lookup(shot_id)
        .map(|r| r.point)
        .ok_or_else(|| CourtsideError::MissingLanding(shot_id.to_string()))
}

/// Build the training sequence for one weighted video
pub fn sequence_for_video(video: &WeightedVideo, landing: &LandingTable, sequence_length: usize) -> Result<TrainingSequence> {
    let hit_position = video
        .canonical_hit_position()
        .ok_or_else(|| CourtsideError::NoCanonicalHit(video.video_id.clone()))?;

    let shot_id = video_name(&video.video_id).to_string();
    let target = link_to_landing(&shot_id, landing)?;
    let frames = build_sequence(&video.frames(), hit_position, sequence_length)?;

    Ok(TrainingSequence {
        video_id: video.video_id.clone(),
        shot_id,
        frames,
        target,
    })
}

/// Build sequences for every video. Videos that cannot produce one are skipped and counted;
/// producing none at all is an error.
pub fn build_sequences(
    videos: &[WeightedVideo],
    landing: &LandingTable,
    sequence_length: usize,
) -> Result<(Vec<TrainingSequence>, BatchReport)> {
    log::info!("Preparing {}-frame sequences for {} videos", sequence_length, videos.len());

    let results: Vec<Result<TrainingSequence>> = videos
        .par_iter()
        .map(|v| sequence_for_video(v, landing, sequence_length))
        .collect();

    let mut report = BatchReport::new("sequences");
    let mut sequences = Vec::new();

    for result in results {
        match result {
            Ok(seq) => {
                report.success();
                sequences.push(seq);
            }
            Err(e) if e.is_data_error() => {
                log::debug!("Skipping video: {}", e);
                report.skip(skip_token(&e));
            }
            Err(e) => return Err(e),
        }
    }

    report.log_summary();

    if sequences.is_empty() {
        return Err(CourtsideError::NoSequences);
    }
    Ok((sequences, report))
}

fn skip_token(err: &CourtsideError) -> &'static str {
    match err {
        CourtsideError::NoCanonicalHit(_) => S_NO_HIT,
        CourtsideError::MissingLanding(_) => S_NO_LANDING,
        CourtsideError::SequenceLengthMismatch { .. } => S_SHORT_SEQUENCE,
        _ => S_UNPARSABLE,
    }
}

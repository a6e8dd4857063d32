// Hit-frame weighting
// Turns one annotated frame per video into a triangular regression target around it.

use std::collections::HashSet;
use std::path::Path;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::WeightingConfig;
use crate::constants::S_NO_HIT;
use crate::frames::{effective_index, Frame};
use crate::labels::LabelledVideo;
use crate::report::BatchReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedFrame {
    pub frame: Frame,
    pub weight: f64,
}

impl WeightedFrame {
    pub fn is_positive(&self) -> bool {
        self.weight > 0.0
    }

    pub fn is_canonical_hit(&self) -> bool {
        self.weight == 1.0
    }
}

/// Weighted frames of one video, in sorted frame order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedVideo {
    pub video_id: String,
    pub frames: Vec<WeightedFrame>,
    /// Position of the canonical hit in `frames`, if the video was annotated
    pub hit_position: Option<usize>,
}

impl WeightedVideo {
    pub fn canonical_hit_position(&self) -> Option<usize> {
        self.hit_position
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.iter().map(|w| w.frame.clone()).collect()
    }
}

fn lower_median<T: Copy>(items: &[T]) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[(items.len() - 1) / 2])
    }
}

/// Position (in `frames`) of the canonical hit: the lower median of the annotated frames
pub fn canonical_hit_position(frames: &[Frame], hits: &HashSet<&Path>) -> Option<usize> {
    let marked: Vec<usize> = frames
        .iter()
        .enumerate()
        .filter(|(_, f)| hits.contains(f.path.as_path()))
        .map(|(i, _)| i)
        .collect();
    lower_median(&marked)
}

/// Weight for a frame at `distance` from the canonical hit.
/// Only the canonical frame itself is 1.0; anything else at distance 0 is treated as distance 1,
/// and stays strictly below 1.0 however small the decay.
pub fn weight_at(distance: u64, is_canonical: bool, config: &WeightingConfig) -> f64 {
    if is_canonical {
        return 1.0;
    }
    let distance = distance.max(1);
    let half = (config.window_size / 2) as u64;
    if distance <= half {
        (1.0 - distance as f64 * config.decay_rate).clamp(0.0, 1.0 - f64::EPSILON)
    } else {
        0.0
    }
}

/// Assign a weight to every frame of one video.
/// `frames` must be sorted; with no annotated frame every weight is 0.
pub fn assign_weights(frames: &[Frame], hits: &HashSet<&Path>, config: &WeightingConfig) -> Vec<WeightedFrame> {
    let Some(hit_pos) = canonical_hit_position(frames, hits) else {
        return frames
            .iter()
            .map(|f| WeightedFrame { frame: f.clone(), weight: 0.0 })
            .collect();
    };

    let hit_index = effective_index(&frames[hit_pos], hit_pos);

    frames
        .iter()
        .enumerate()
        .map(|(pos, frame)| {
            let distance = (effective_index(frame, pos) - hit_index).unsigned_abs();
            WeightedFrame {
                frame: frame.clone(),
                weight: weight_at(distance, pos == hit_pos, config),
            }
        })
        .collect()
}

/// Weight every video independently (in parallel) and merge the results in input order
pub fn weight_videos(videos: &[LabelledVideo], config: &WeightingConfig) -> (Vec<WeightedVideo>, BatchReport) {
    let weighted: Vec<(WeightedVideo, bool)> = videos
        .par_iter()
        .map(|v| {
            let hits = v.annotation.as_set();
            let frames = assign_weights(&v.video.frames, &hits, config);
            let hit_position = canonical_hit_position(&v.video.frames, &hits);
            let has_hit = !hits.is_empty();
            (WeightedVideo { video_id: v.video.video_id.clone(), frames, hit_position }, has_hit)
        })
        .collect();

    let mut report = BatchReport::new("weighting");
    let mut out = Vec::with_capacity(weighted.len());
    for (video, has_hit) in weighted {
        if has_hit {
            report.success();
        } else {
            log::debug!("No hit annotation for {}; all weights 0", video.video_id);
            report.skip(S_NO_HIT);
        }
        out.push(video);
    }

    let positive = out.iter().flat_map(|v| &v.frames).filter(|f| f.is_positive()).count();
    log::info!(
        "Weighted {} videos (window={}, decay={}): {} frames with weight > 0",
        out.len(), config.window_size, config.decay_rate, positive
    );
    report.log_summary();

    (out, report)
}

/// Flatten per-video weights into one list for balancing
pub fn flatten(videos: &[WeightedVideo]) -> Vec<WeightedFrame> {
    videos.iter().flat_map(|v| v.frames.iter().cloned()).collect()
}

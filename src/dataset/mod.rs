// Dataset preparation
// hit annotations -> weights -> balanced split (hit scorer)
// weights + landing table -> sequences -> split (landing predictor)

pub mod weighting;
pub mod split;
pub mod sequence;


use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::constants::{FRAMES_FOLDER, HIT_FRAMES_CSV};
use crate::error::Result;
use crate::frames::discover::discover_video_dirs;
use crate::labels::landing::{load_landing_table, LandingTable, ShotId};
use crate::labels::load_hit_annotations;
use crate::report::BatchReport;

pub use sequence::{build_sequence, build_sequences, link_to_landing, TrainingSequence};
pub use split::{balance_and_split, split_sequences, Split};
pub use weighting::{assign_weights, weight_videos, WeightedFrame, WeightedVideo};

/// Standard layout of a dataset root
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub root: PathBuf,
    pub hit_csv: PathBuf,
    pub frames_root: PathBuf,
    pub landing_dir: PathBuf,
}

impl DatasetPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            hit_csv: root.join(HIT_FRAMES_CSV),
            frames_root: root.join(FRAMES_FOLDER),
            landing_dir: root.to_path_buf(),
        }
    }
}

/// Frame directories under the frames root whose names are shot ids, in path order
pub fn shot_dirs(paths: &DatasetPaths) -> Vec<PathBuf> {
    discover_video_dirs(&paths.frames_root)
        .into_iter()
        .filter(|dir| {
            dir.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| ShotId::parse(n).is_ok())
        })
        .collect()
}

/// Weighted videos plus the reports of the steps that produced them
#[derive(Debug, Clone)]
pub struct WeightedDataset {
    pub videos: Vec<WeightedVideo>,
    pub annotation_report: BatchReport,
    pub weighting_report: BatchReport,
}

impl WeightedDataset {
    pub fn frames(&self) -> Vec<WeightedFrame> {
        weighting::flatten(&self.videos)
    }
}

/// Load annotations and weight every video
pub fn load_weighted(paths: &DatasetPaths, config: &PipelineConfig) -> Result<WeightedDataset> {
    let (videos, annotation_report) = load_hit_annotations(&paths.hit_csv, &paths.frames_root)?;
    annotation_report.log_summary();

    let (videos, weighting_report) = weight_videos(&videos, &config.weighting);
    Ok(WeightedDataset { videos, annotation_report, weighting_report })
}

/// Everything the landing predictor trains on
#[derive(Debug, Clone)]
pub struct SequenceDataset {
    pub landing: LandingTable,
    pub landing_report: BatchReport,
    pub sequences: Vec<TrainingSequence>,
    pub sequence_report: BatchReport,
}

/// Join weighted videos with landing data into sequences
pub fn load_sequences(paths: &DatasetPaths, weighted: &WeightedDataset, config: &PipelineConfig) -> Result<SequenceDataset> {
    let (landing, landing_report) = load_landing_table(&paths.landing_dir, &config.court)?;
    let (sequences, sequence_report) = build_sequences(&weighted.videos, &landing, config.sequence.sequence_length)?;
    Ok(SequenceDataset { landing, landing_report, sequences, sequence_report })
}

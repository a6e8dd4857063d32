// Label files: human hit-frame annotations and landing measurements

pub mod landing;

use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use serde::Deserialize;

use crate::constants::S_BAD_ROW;
use crate::error::Result;
use crate::frames::{video_id_for, Frame, VideoFrames};
use crate::report::BatchReport;

/// Frames a human marked as the moment of contact for one video
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HitAnnotation {
    pub video_id: String,
    pub frames: Vec<PathBuf>,
}

impl HitAnnotation {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn as_set(&self) -> HashSet<&Path> {
        self.frames.iter().map(|p| p.as_path()).collect()
    }
}

/// A video's frames together with its annotation
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledVideo {
    pub video: VideoFrames,
    pub annotation: HitAnnotation,
}

#[derive(Debug, Deserialize)]
struct HitRow {
    #[allow(dead_code)]
    video_name: String,
    frame_path: String,
    is_hit_frame: String,
}

/// Load `hit_frames.csv`; frame paths are resolved against `frames_root`
pub fn load_hit_annotations(csv_path: &Path, frames_root: &Path) -> Result<(Vec<LabelledVideo>, BatchReport)> {
    let file = std::fs::File::open(csv_path)?;
    read_hit_annotations(file, frames_root)
}

/// Parse hit annotation rows (`video_name, frame_path, is_hit_frame`) and group them by video
pub fn read_hit_annotations<R: Read>(reader: R, frames_root: &Path) -> Result<(Vec<LabelledVideo>, BatchReport)> {
    let mut report = BatchReport::new("hit annotations");
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    // video_id -> (frame path -> is hit)
    let mut groups: BTreeMap<String, BTreeMap<PathBuf, bool>> = BTreeMap::new();

    for row in rdr.deserialize::<HitRow>() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Skipping malformed annotation row: {}", e);
                report.skip(S_BAD_ROW);
                continue;
            }
        };

        let is_hit = match row.is_hit_frame.as_str() {
            "1" | "1.0" => true,
            "0" | "0.0" => false,
            other => {
                log::debug!("Skipping row for {}: is_hit_frame = {:?}", row.frame_path, other);
                report.skip(S_BAD_ROW);
                continue;
            }
        };

        let path = frames_root.join(row.frame_path.replace('\\', "/"));
        let video_id = video_id_for(&path);
        let entry = groups.entry(video_id).or_default().entry(path).or_insert(false);
        *entry |= is_hit;
        report.success();
    }

    let videos = groups
        .into_iter()
        .map(|(video_id, rows)| {
            let hits: Vec<PathBuf> = rows.iter().filter(|(_, hit)| **hit).map(|(p, _)| p.clone()).collect();
            let frames: Vec<Frame> = rows.into_keys().map(Frame::new).collect();
            let video = VideoFrames::new(video_id.clone(), frames);

            // Keep hits in frame order so the median pick is positional
            let mut ordered_hits: Vec<PathBuf> = video
                .frames
                .iter()
                .filter(|f| hits.contains(&f.path))
                .map(|f| f.path.clone())
                .collect();
            ordered_hits.dedup();

            LabelledVideo {
                annotation: HitAnnotation { video_id, frames: ordered_hits },
                video,
            }
        })
        .collect();

    Ok((videos, report))
}

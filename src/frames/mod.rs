// Extracted video frames
// A video is a directory of stills named with an embedded frame number (frame_0007.jpg).

pub mod discover;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One still image extracted from a video
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    pub path: PathBuf,
    /// Directory of the owning video
    pub video_id: String,
    /// Number parsed from the file name, if any
    pub index: Option<u64>,
}

impl Frame {
    pub fn new(path: PathBuf) -> Self {
        let video_id = video_id_for(&path);
        let index = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_frame_index);
        Self { path, video_id, index }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Video id for a frame path: its parent directory with '/' separators
pub fn video_id_for(path: &Path) -> String {
    path.parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default()
}

/// Basename of a video directory; this is the shot identifier used to join landing data
pub fn video_name(video_id: &str) -> &str {
    video_id.rsplit('/').next().unwrap_or(video_id)
}

fn frame_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"frame_(\d+)").ok()).as_ref()
}

fn digits_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)").ok()).as_ref()
}

/// Parse the frame number from a file name.
/// Prefers the `frame_<n>` form, then the first run of digits.
pub fn parse_frame_index(file_name: &str) -> Option<u64> {
    let from = |re: Option<&Regex>| {
        re.and_then(|re| re.captures(file_name))
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    };
    from(frame_pattern()).or_else(|| from(digits_pattern()))
}

/// Sort frames by parsed index; unparsable names go last, ordered by path.
/// Never depends on directory iteration order.
pub fn sort_frames(frames: &mut [Frame]) {
    frames.sort_by(|a, b| {
        (a.index.is_none(), a.index, &a.path).cmp(&(b.index.is_none(), b.index, &b.path))
    });
}

/// Index used for distance computations: the parsed number, or the ordinal
/// position within the sorted group when the name has none
pub fn effective_index(frame: &Frame, position: usize) -> i64 {
    frame.index.map(|i| i as i64).unwrap_or(position as i64)
}

/// All frames of one video, sorted
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrames {
    pub video_id: String,
    pub frames: Vec<Frame>,
}

impl VideoFrames {
    pub fn new(video_id: impl Into<String>, mut frames: Vec<Frame>) -> Self {
        sort_frames(&mut frames);
        Self { video_id: video_id.into(), frames }
    }

    pub fn name(&self) -> &str {
        video_name(&self.video_id)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

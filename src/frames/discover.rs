// Frame discovery on disk

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::IMAGE_EXTENSIONS;
use crate::error::{CourtsideError, Result};
use super::{Frame, VideoFrames};

/// Check if a file is a frame image based on extension
pub fn is_image_file(path: &Path) -> bool {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e.to_lowercase(),
        None => return false,
    };

    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

/// List the image files directly inside one video directory, sorted by frame index
pub fn list_frames(video_dir: &Path) -> Result<VideoFrames> {
    if !video_dir.is_dir() {
        return Err(CourtsideError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("frame directory not found: {}", video_dir.display()),
        )));
    }

    let frames: Vec<Frame> = WalkDir::new(video_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
        .map(|e| Frame::new(e.path().to_path_buf()))
        .collect();

    let video_id = video_dir.to_string_lossy().replace('\\', "/");
    Ok(VideoFrames::new(video_id, frames))
}

/// Like `list_frames` but keeps only frames whose names carry a number
pub fn list_numbered_frames(video_dir: &Path) -> Result<VideoFrames> {
    let mut video = list_frames(video_dir)?;
    video.frames.retain(|f| f.index.is_some());
    Ok(video)
}

/// Find every directory under `root` that directly contains frame images
pub fn discover_video_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: BTreeMap<PathBuf, ()> = BTreeMap::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_image_file(path) {
            if let Some(parent) = path.parent() {
                dirs.insert(parent.to_path_buf(), ());
            }
        }
    }

    dirs.into_keys().collect()
}

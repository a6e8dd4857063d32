// Court coordinate mapping
// Straight and cross-court shots are mirror images; both map into one normalised frame
// where y runs from the baseline (0) to the net (1).

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::CourtsideError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShotType {
    /// Down the line; measured from the right sideline
    Straight,
    /// Crosscourt; measured from the left sideline
    Cross,
}

impl ShotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::Straight => "Straight",
            ShotType::Cross => "Cross",
        }
    }
}

impl fmt::Display for ShotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShotType {
    type Err = CourtsideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Straight" => Ok(ShotType::Straight),
            "Cross" => Ok(ShotType::Cross),
            other => Err(CourtsideError::UnknownShotType(other.to_string())),
        }
    }
}

/// Landing spot as fractions of court width and half-court length
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Mirror across the court's long axis
    pub fn flipped(&self) -> Self {
        Self { x: 1.0 - self.x, y: self.y }
    }

    pub fn distance(&self, other: &NormalizedPoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Landing spot in metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourtPosition {
    pub dist_from_left_m: f64,
    pub dist_from_right_m: f64,
    pub dist_from_baseline_m: f64,
}

impl CourtPosition {
    /// Sideline distance as it would have been measured for this shot type
    pub fn sideline_distance(&self, shot_type: ShotType) -> f64 {
        match shot_type {
            ShotType::Straight => self.dist_from_right_m,
            ShotType::Cross => self.dist_from_left_m,
        }
    }
}

/// Map raw sideline/baseline distances into the normalised court frame.
/// Returns None for NaN distances, an unrecognised shot type, or a non-positive court.
pub fn map_coordinates(
    dist_sideline: f64,
    dist_baseline: f64,
    shot_type: &str,
    court_width: f64,
    court_length: f64,
) -> Option<NormalizedPoint> {
    let shot_type = ShotType::from_str(shot_type).ok()?;
    map_shot(dist_sideline, dist_baseline, shot_type, court_width, court_length)
}

/// Typed variant of `map_coordinates`
pub fn map_shot(
    dist_sideline: f64,
    dist_baseline: f64,
    shot_type: ShotType,
    court_width: f64,
    court_length: f64,
) -> Option<NormalizedPoint> {
    if dist_sideline.is_nan() || dist_baseline.is_nan() {
        return None;
    }
    if !(court_width > 0.0) || !(court_length > 0.0) {
        return None;
    }

    let y = dist_baseline / court_length;
    let x = match shot_type {
        ShotType::Straight => (court_width - dist_sideline) / court_width,
        ShotType::Cross => dist_sideline / court_width,
    };

    Some(NormalizedPoint::new(x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)))
}

/// Inverse of the mapping: normalised point back to metres.
/// Inputs are clipped to [0, 1] first.
pub fn denormalize(x: f64, y: f64, court_width: f64, court_length: f64) -> Option<CourtPosition> {
    if !(court_width > 0.0) || !(court_length > 0.0) {
        return None;
    }

    let x = x.clamp(0.0, 1.0);
    let y = y.clamp(0.0, 1.0);
    let dist_from_left_m = x * court_width;

    Some(CourtPosition {
        dist_from_left_m,
        dist_from_right_m: court_width - dist_from_left_m,
        dist_from_baseline_m: y * court_length,
    })
}

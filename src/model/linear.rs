// Pooled-feature linear regressor
// Each channel is average-pooled to a GRID x GRID map; outputs are an affine map of that
// vector, optionally squashed through a sigmoid. Serialised as JSON.

use std::path::Path;
use chrono::{DateTime, Utc};
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::config::ImageConfig;
use crate::constants::{FEATURE_GRID, IMG_CHANNELS, PIPELINE_VERSION};
use crate::coords::NormalizedPoint;
use crate::error::{CourtsideError, Result};
use crate::imaging::ImageTensor;
use super::{Scorer, SequencePredictor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelKind {
    /// One frame in, unbounded score out
    HitFrameScorer,
    /// Stacked sequence in, (x, y) in [0, 1] out
    LandingPredictor,
}

impl ModelKind {
    pub fn outputs(&self) -> usize {
        match self {
            ModelKind::HitFrameScorer => 1,
            ModelKind::LandingPredictor => 2,
        }
    }

    pub fn uses_sigmoid(&self) -> bool {
        matches!(self, ModelKind::LandingPredictor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::HitFrameScorer => "hitFrameScorer",
            ModelKind::LandingPredictor => "landingPredictor",
        }
    }
}

/// Average-pool every channel of `image` to `grid x grid`, channel-major
pub fn pool_features(image: &ImageTensor, grid: u32) -> Array1<f64> {
    let g = grid.max(1) as usize;
    let (channels, h, w) = image.data.dim();

    let span = |cell: usize, len: usize| {
        let start = cell * len / g;
        let end = ((cell + 1) * len / g).max(start + 1).min(len);
        (start, end)
    };

    let pooled = Array3::from_shape_fn((channels, g, g), |(c, gy, gx)| {
        let (y0, y1) = span(gy, h);
        let (x0, x1) = span(gx, w);
        image
            .data
            .slice(s![c, y0..y1, x0..x1])
            .mapv(f64::from)
            .mean()
            .unwrap_or(0.0)
    });
    pooled.into_iter().collect()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearRegressor {
    pub kind: ModelKind,
    pub input_channels: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub grid: u32,
    /// Shape `(outputs, features)`
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
    pub trained_at: Option<DateTime<Utc>>,
    pub pipeline_version: u32,
}

impl LinearRegressor {
    /// Zero-initialised model for `frames` stacked frames of the given size
    pub fn new(kind: ModelKind, frames: usize, image: ImageConfig) -> Self {
        let input_channels = frames * IMG_CHANNELS;
        let grid = FEATURE_GRID;
        let feature_len = input_channels * (grid * grid) as usize;
        Self {
            kind,
            input_channels,
            image_width: image.width,
            image_height: image.height,
            grid,
            weights: Array2::zeros((kind.outputs(), feature_len)),
            bias: Array1::zeros(kind.outputs()),
            trained_at: None,
            pipeline_version: PIPELINE_VERSION,
        }
    }

    pub fn feature_len(&self) -> usize {
        self.input_channels * (self.grid * self.grid) as usize
    }

    /// Pool an input tensor after checking it has this model's geometry
    pub fn features(&self, input: &ImageTensor) -> Result<Array1<f64>> {
        if input.channels() != self.input_channels
            || input.width() != self.image_width as usize
            || input.height() != self.image_height as usize
        {
            return Err(CourtsideError::Model(format!(
                "{} expects {}x{}x{} input, got {}x{}x{}",
                self.kind.as_str(),
                self.input_channels, self.image_height, self.image_width,
                input.channels(), input.height(), input.width()
            )));
        }
        Ok(pool_features(input, self.grid))
    }

    fn activate(&self, z: Array1<f64>) -> Array1<f64> {
        if self.kind.uses_sigmoid() { z.mapv_into(sigmoid) } else { z }
    }

    pub fn forward(&self, features: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if features.len() != self.weights.ncols() {
            return Err(CourtsideError::Model(format!(
                "{} features given, model wants {}",
                features.len(), self.weights.ncols()
            )));
        }
        Ok(self.activate(self.weights.dot(&features) + &self.bias))
    }

    pub fn predict(&self, input: &ImageTensor) -> Result<Array1<f64>> {
        let features = self.features(input)?;
        self.forward(features.view())
    }

    /// One gradient step on mean squared error over a mini-batch (one example per row).
    /// Returns the batch loss measured before the update.
    pub fn sgd_step(&mut self, inputs: ArrayView2<'_, f64>, targets: ArrayView2<'_, f64>, learning_rate: f64) -> Result<f64> {
        let outputs = self.kind.outputs();
        if inputs.nrows() == 0
            || inputs.nrows() != targets.nrows()
            || inputs.ncols() != self.feature_len()
            || targets.ncols() != outputs
        {
            return Err(CourtsideError::Model(format!(
                "batch of {:?} inputs / {:?} targets, model wants n x {} / n x {}",
                inputs.dim(), targets.dim(), self.feature_len(), outputs
            )));
        }

        let z = inputs.dot(&self.weights.t()) + &self.bias;
        let y = if self.kind.uses_sigmoid() { z.mapv_into(sigmoid) } else { z };
        let err = &y - &targets;
        let loss = err.mapv(|e| e * e).mean().unwrap_or(0.0);

        let scale = 2.0 / err.len() as f64;
        let mut dz = err * scale;
        if self.kind.uses_sigmoid() {
            dz *= &y.mapv(|v| v * (1.0 - v));
        }

        let grad_w = dz.t().dot(&inputs);
        let grad_b = dz.sum_axis(Axis(0));
        self.weights.scaled_add(-learning_rate, &grad_w);
        self.bias.scaled_add(-learning_rate, &grad_b);

        Ok(loss)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        log::info!("Saved {} to {}", self.kind.as_str(), path.display());
        Ok(())
    }

    /// Load an artifact and check it is the expected kind with consistent shapes
    pub fn load(path: &Path, kind: ModelKind) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let model: LinearRegressor = serde_json::from_str(&content)?;

        if model.kind != kind {
            return Err(CourtsideError::Model(format!(
                "{} holds a {}, expected a {}",
                path.display(), model.kind.as_str(), kind.as_str()
            )));
        }
        let outputs = kind.outputs();
        if model.weights.dim() != (outputs, model.feature_len()) || model.bias.len() != outputs {
            return Err(CourtsideError::Model(format!("{} has inconsistent parameter shapes", path.display())));
        }
        Ok(model)
    }

    fn check_input_size(&self, image: ImageConfig, frames: usize) -> Result<()> {
        if self.image_width != image.width
            || self.image_height != image.height
            || self.input_channels != frames * IMG_CHANNELS
        {
            return Err(CourtsideError::Model(format!(
                "{} was trained on {} frames of {}x{}, configured for {} frames of {}x{}",
                self.kind.as_str(),
                self.input_channels / IMG_CHANNELS, self.image_width, self.image_height,
                frames, image.width, image.height
            )));
        }
        Ok(())
    }
}

/// Frame-level hit scorer backed by a linear model
#[derive(Debug, Clone)]
pub struct HitFrameScorer {
    pub model: LinearRegressor,
}

impl HitFrameScorer {
    pub fn new(model: LinearRegressor) -> Self {
        Self { model }
    }

    pub fn load(path: &Path, image: ImageConfig) -> Result<Self> {
        let model = LinearRegressor::load(path, ModelKind::HitFrameScorer)?;
        model.check_input_size(image, 1)?;
        Ok(Self { model })
    }
}

impl Scorer for HitFrameScorer {
    fn score(&self, image: &ImageTensor) -> Result<f64> {
        let out = self.model.predict(image)?;
        out.get(0)
            .copied()
            .ok_or_else(|| CourtsideError::Model("hit scorer produced no output".to_string()))
    }
}

/// Sequence-level landing predictor backed by a linear model
#[derive(Debug, Clone)]
pub struct LandingPredictor {
    pub model: LinearRegressor,
}

impl LandingPredictor {
    pub fn new(model: LinearRegressor) -> Self {
        Self { model }
    }

    pub fn load(path: &Path, image: ImageConfig, sequence_length: usize) -> Result<Self> {
        let model = LinearRegressor::load(path, ModelKind::LandingPredictor)?;
        model.check_input_size(image, sequence_length)?;
        Ok(Self { model })
    }
}

impl SequencePredictor for LandingPredictor {
    fn predict(&self, sequence: &ImageTensor) -> Result<NormalizedPoint> {
        let out = self.model.predict(sequence)?;
        match out.as_slice() {
            Some([x, y]) => Ok(NormalizedPoint::new(*x, *y)),
            _ => Err(CourtsideError::Model(format!("landing predictor produced {} outputs", out.len()))),
        }
    }
}

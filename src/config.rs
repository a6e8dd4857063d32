// Pipeline configuration
// One immutable value carries every tunable; each entry point takes it explicitly.

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{CourtsideError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeightingConfig {
    /// Odd number of frames around the hit that receive a non-zero weight
    pub window_size: usize,
    /// Weight lost per frame of distance from the hit
    pub decay_rate: f64,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WEIGHT_WINDOW,
            decay_rate: DEFAULT_WEIGHT_DECAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SplitConfig {
    /// Negatives sampled per positive
    pub balance_ratio: f64,
    pub test_fraction: f64,
    pub val_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            balance_ratio: DEFAULT_BALANCE_RATIO,
            test_fraction: DEFAULT_TEST_FRACTION,
            val_fraction: DEFAULT_VAL_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SequenceConfig {
    pub sequence_length: usize,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self { sequence_length: DEFAULT_SEQUENCE_LENGTH }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CourtConfig {
    pub width_m: f64,
    pub length_m: f64,
}

impl Default for CourtConfig {
    fn default() -> Self {
        Self {
            width_m: DOUBLES_COURT_WIDTH_M,
            length_m: HALF_COURT_LENGTH_M,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { width: IMG_WIDTH, height: IMG_HEIGHT }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainingConfig {
    pub epochs: usize,
    pub patience: usize,
    pub min_improvement: f64,
    pub hit_learning_rate: f64,
    pub landing_learning_rate: f64,
    pub batch_size: usize,
    pub augment: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            patience: DEFAULT_PATIENCE,
            min_improvement: DEFAULT_MIN_IMPROVEMENT,
            hit_learning_rate: DEFAULT_HIT_LEARNING_RATE,
            landing_learning_rate: DEFAULT_LANDING_LEARNING_RATE,
            batch_size: DEFAULT_BATCH_SIZE,
            augment: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    pub weighting: WeightingConfig,
    pub split: SplitConfig,
    pub sequence: SequenceConfig,
    pub court: CourtConfig,
    pub image: ImageConfig,
    pub training: TrainingConfig,
}

impl PipelineConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject values no run can be parameterised with
    pub fn validate(&self) -> Result<()> {
        let w = &self.weighting;
        if w.window_size == 0 || w.window_size % 2 == 0 {
            return Err(config_err(format!("weighting window must be odd and positive, got {}", w.window_size)));
        }
        if !(w.decay_rate > 0.0) {
            return Err(config_err(format!("decay rate must be positive, got {}", w.decay_rate)));
        }

        let s = &self.split;
        if !(s.balance_ratio >= 0.0) {
            return Err(config_err(format!("balance ratio must be >= 0, got {}", s.balance_ratio)));
        }
        if !(0.0..1.0).contains(&s.test_fraction) || !(0.0..1.0).contains(&s.val_fraction) {
            return Err(config_err("split fractions must lie in [0, 1)".to_string()));
        }
        if s.test_fraction + s.val_fraction >= 1.0 {
            return Err(config_err(format!(
                "test + validation fractions must sum below 1, got {}",
                s.test_fraction + s.val_fraction
            )));
        }

        let n = self.sequence.sequence_length;
        if n == 0 || n % 2 == 0 {
            return Err(config_err(format!("sequence length must be odd and positive, got {}", n)));
        }

        if !(self.court.width_m > 0.0) || !(self.court.length_m > 0.0) {
            return Err(config_err(format!(
                "court dimensions must be positive, got {}x{}",
                self.court.width_m, self.court.length_m
            )));
        }

        if self.image.width == 0 || self.image.height == 0 {
            return Err(config_err("image size must be non-zero".to_string()));
        }

        let t = &self.training;
        if t.epochs == 0 || t.batch_size == 0 {
            return Err(config_err("epochs and batch size must be non-zero".to_string()));
        }
        if !(t.hit_learning_rate > 0.0) || !(t.landing_learning_rate > 0.0) {
            return Err(config_err("learning rates must be positive".to_string()));
        }

        Ok(())
    }
}

fn config_err(msg: String) -> CourtsideError {
    CourtsideError::Config(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.weighting.window_size, 9);
        assert_eq!(config.sequence.sequence_length, 9);
        assert_eq!(config.split.seed, 42);
    }

    #[test]
    fn test_rejects_even_lengths() {
        let mut config = PipelineConfig::default();
        config.sequence.sequence_length = 8;
        assert!(matches!(config.validate(), Err(CourtsideError::Config(_))));

        let mut config = PipelineConfig::default();
        config.weighting.window_size = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_court_and_fractions() {
        let mut config = PipelineConfig::default();
        config.court.width_m = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.split.test_fraction = 0.6;
        config.split.val_fraction = 0.4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"weighting": {"decayRate": 0.25}, "split": {"seed": 7}}"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.weighting.decay_rate, 0.25);
        assert_eq!(config.weighting.window_size, 9);
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.split.balance_ratio, 4.0);
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        let mut config = PipelineConfig::default();
        config.training.epochs = 3;
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }
}

// Courtside Constants
// Defaults for PipelineConfig. Algorithms never read these directly; they take a config value.

pub const PIPELINE_VERSION: u32 = 1;
pub const DEFAULT_SEED: u64 = 42;

// Court dimensions (metres)
pub const DOUBLES_COURT_WIDTH_M: f64 = 10.97;
pub const HALF_COURT_LENGTH_M: f64 = 11.89;

// Hit-frame weighting
pub const DEFAULT_WEIGHT_WINDOW: usize = 9;
pub const DEFAULT_WEIGHT_DECAY: f64 = 0.3;

// Balancing and splitting
pub const DEFAULT_BALANCE_RATIO: f64 = 4.0;
pub const DEFAULT_TEST_FRACTION: f64 = 0.1;
pub const DEFAULT_VAL_FRACTION: f64 = 0.1;
pub const MIN_SPLIT_EXAMPLES: usize = 3;

// Landing sequences
pub const DEFAULT_SEQUENCE_LENGTH: usize = 9;

// Model input geometry
pub const IMG_WIDTH: u32 = 224;
pub const IMG_HEIGHT: u32 = 224;
pub const IMG_CHANNELS: usize = 3;

// Training
pub const DEFAULT_EPOCHS: usize = 50;
pub const DEFAULT_PATIENCE: usize = 15;
pub const DEFAULT_MIN_IMPROVEMENT: f64 = 1e-5;
pub const DEFAULT_HIT_LEARNING_RATE: f64 = 5e-4;
pub const DEFAULT_LANDING_LEARNING_RATE: f64 = 5e-5;
pub const DEFAULT_BATCH_SIZE: usize = 16;

// Training-time augmentation
pub const FLIP_PROBABILITY: f64 = 0.5;
pub const COURT_SWAP_PROBABILITY: f64 = 0.66;
pub const KEYSTONE_PROBABILITY: f64 = 0.5;
/// Clay court mask in 8-bit HSV (hue 0..180)
pub const CLAY_HUE_MAX: u8 = 25;
pub const CLAY_MIN_SATURATION: u8 = 40;
pub const CLAY_MIN_VALUE: u8 = 40;
/// Replacement court hues: green, blue
pub const COURT_TARGET_HUES: [u8; 2] = [70, 110];
pub const KEYSTONE_MAX_DEGREES: f32 = 6.0;
pub const KEYSTONE_PAD_FRACTION: f32 = 0.2;

// Linear model feature grid (each image is pooled to GRID x GRID per channel)
pub const FEATURE_GRID: u32 = 16;

// File names
pub const HIT_FRAMES_CSV: &str = "hit_frames.csv";
pub const FRAMES_FOLDER: &str = "Frames";
pub const HIT_MODEL_FILENAME: &str = "hit_frame_scorer.json";
pub const LANDING_MODEL_FILENAME: &str = "landing_predictor.json";
pub const HIT_HISTORY_FILENAME: &str = "hit_frame_training_history.csv";
pub const LANDING_HISTORY_FILENAME: &str = "landing_training_history.csv";

// Landing measurement files and their shot-id prefixes
pub const LANDING_FILES: [(&str, &str); 4] = [
    ("Indoor Field - Crosscourt Shot.csv", "ICT"),
    ("Indoor Field - Straight Shot.csv", "IST"),
    ("Outdoor Field - Crosscourt Shot.csv", "OCT"),
    ("Outdoor Field - Straight Shot.csv", "OST"),
];

// Landing CSV columns
pub const COL_INDEX: &str = "Index";
pub const COL_DIST_SIDELINE: &str = "To-Closest-Doubles-Sideline-Distance (m)";
pub const COL_DIST_BASELINE: &str = "To-Baseline-Distance (m)";

// ----- Stable Skip Tokens -----
// Format: S_<CATEGORY>. Used as keys in batch reports.

pub const S_NO_HIT: &str = "S_NO_HIT";
pub const S_NO_LANDING: &str = "S_NO_LANDING";
pub const S_UNPARSABLE: &str = "S_UNPARSABLE";
pub const S_SHORT_SEQUENCE: &str = "S_SHORT_SEQUENCE";
pub const S_INVALID_COORDS: &str = "S_INVALID_COORDS";
pub const S_BAD_ROW: &str = "S_BAD_ROW";
pub const S_DECODE_FAILED: &str = "S_DECODE_FAILED";
pub const S_SCORE_FAILED: &str = "S_SCORE_FAILED";

// Image extensions accepted as frames
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

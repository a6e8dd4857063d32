// Courtside CLI binary

use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use anyhow::Result;

use courtside_lib::constants::*;
use courtside_lib::coords::{denormalize, map_coordinates};
use courtside_lib::dataset::{self, balance_and_split, DatasetPaths, WeightedFrame};
use courtside_lib::frames::video_name;
use courtside_lib::labels::landing::load_landing_table;
use courtside_lib::model::{HitFrameScorer, LandingPredictor, LinearRegressor, ModelKind};
use courtside_lib::report::BatchReport;
use courtside_lib::training::{self, TrainingHistory, TrainingOutcome};
use courtside_lib::{InferencePipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "courtside")]
#[command(about = "Courtside - tennis hit-frame and landing-point pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Pipeline configuration (JSON); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map a measured landing spot into normalised court coordinates
    Map {
        /// Distance to the closest doubles sideline (m)
        sideline: f64,
        /// Distance to the baseline (m)
        baseline: f64,
        /// Shot type: Straight or Cross
        #[arg(short, long)]
        shot: String,
    },

    /// Weight every annotated video and summarise the hit frames
    Weights {
        /// Dataset root (hit_frames.csv, Frames/, landing CSVs)
        dataset: PathBuf,
    },

    /// Balance and split frames for hit-scorer training
    Split {
        /// Dataset root
        dataset: PathBuf,
        /// Write the assignment to this CSV
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Build landing sequences around each hit frame
    Sequences {
        /// Dataset root
        dataset: PathBuf,
    },

    /// Train the hit-frame scorer
    TrainHit {
        /// Dataset root
        dataset: PathBuf,
        /// Output directory for the model and history
        #[arg(short, long, default_value = "models")]
        out: PathBuf,
    },

    /// Train the landing predictor
    TrainLanding {
        /// Dataset root
        dataset: PathBuf,
        /// Output directory for the model and history
        #[arg(short, long, default_value = "models")]
        out: PathBuf,
    },

    /// Evaluate a trained model on its test split
    Evaluate {
        /// Dataset root
        dataset: PathBuf,
        /// Directory holding the trained models
        #[arg(short, long, default_value = "models")]
        models: PathBuf,
        /// Evaluate the landing predictor instead of the hit scorer
        #[arg(long)]
        landing: bool,
    },

    /// Predict where the shot in a frame directory lands
    Predict {
        /// Directory of extracted frames for one video; picked from `--dataset` when omitted
        frames: Option<PathBuf>,
        /// Directory holding the trained models
        #[arg(short, long, default_value = "models")]
        models: PathBuf,
        /// Dataset root to compare against the measured landing point
        #[arg(long)]
        dataset: Option<PathBuf>,
    },

    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Map { sideline, baseline, shot } => cmd_map(&config, sideline, baseline, &shot),
        Commands::Weights { dataset } => cmd_weights(&config, &dataset),
        Commands::Split { dataset, out } => cmd_split(&config, &dataset, out),
        Commands::Sequences { dataset } => cmd_sequences(&config, &dataset),
        Commands::TrainHit { dataset, out } => cmd_train(&config, &dataset, &out, ModelKind::HitFrameScorer),
        Commands::TrainLanding { dataset, out } => cmd_train(&config, &dataset, &out, ModelKind::LandingPredictor),
        Commands::Evaluate { dataset, models, landing } => cmd_evaluate(&config, &dataset, &models, landing),
        Commands::Predict { frames, models, dataset } => cmd_predict(&config, frames, &models, dataset),
        Commands::Config { out } => cmd_config(&config, out),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load(p)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", p.display(), e)),
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_map(config: &PipelineConfig, sideline: f64, baseline: f64, shot: &str) -> Result<()> {
    let court = &config.court;
    let point = map_coordinates(sideline, baseline, shot, court.width_m, court.length_m)
        .ok_or_else(|| anyhow::anyhow!("Cannot map ({}, {}) for shot type '{}'", sideline, baseline, shot))?;

    println!("Shot:        {}", shot);
    println!("Court:       {:.2} m x {:.2} m", court.width_m, court.length_m);
    println!("Normalised:  x = {:.4}, y = {:.4}", point.x, point.y);

    if let Some(pos) = denormalize(point.x, point.y, court.width_m, court.length_m) {
        println!("From left:   {:.2} m", pos.dist_from_left_m);
        println!("From right:  {:.2} m", pos.dist_from_right_m);
        println!("From base:   {:.2} m", pos.dist_from_baseline_m);
    }
    Ok(())
}

fn cmd_weights(config: &PipelineConfig, root: &Path) -> Result<()> {
    let paths = DatasetPaths::new(root);
    let weighted = dataset::load_weighted(&paths, config)?;

    println!("{:<12}  {:>7}  {:>9}  {:>10}  {}", "Video", "Frames", "Positive", "Hit pos", "Hit frame");
    println!("{}", "-".repeat(70));

    for video in &weighted.videos {
        let positive = video.frames.iter().filter(|f| f.is_positive()).count();
        let (pos, frame) = match video.canonical_hit_position() {
            Some(p) => (p.to_string(), video.frames[p].frame.file_name()),
            None => ("-".to_string(), "-".to_string()),
        };
        println!("{:<12}  {:>7}  {:>9}  {:>10}  {}",
            video_name(&video.video_id),
            video.frames.len(),
            positive,
            pos,
            frame
        );
    }

    println!();
    print_report(&weighted.annotation_report);
    print_report(&weighted.weighting_report);
    Ok(())
}

fn cmd_split(config: &PipelineConfig, root: &Path, out: Option<PathBuf>) -> Result<()> {
    let paths = DatasetPaths::new(root);
    let weighted = dataset::load_weighted(&paths, config)?;
    let split = balance_and_split(&weighted.frames(), &config.split)?;

    let positives = |frames: &[WeightedFrame]| frames.iter().filter(|f| f.is_positive()).count();

    println!("{:>6}  {:>8}  {:>9}  {:>9}", "Split", "Frames", "Positive", "Negative");
    println!("{}", "-".repeat(38));
    for (name, frames) in [("train", &split.train), ("val", &split.val), ("test", &split.test)] {
        let pos = positives(frames.as_slice());
        println!("{:>6}  {:>8}  {:>9}  {:>9}", name, frames.len(), pos, frames.len() - pos);
    }

    if let Some(out) = out {
        let mut writer = csv::Writer::from_path(&out)?;
        writer.write_record(["split", "frame_path", "weight"])?;
        for (name, frames) in [("train", &split.train), ("val", &split.val), ("test", &split.test)] {
            for f in frames.iter() {
                let path = f.frame.path.to_string_lossy().to_string();
                let weight = f.weight.to_string();
                writer.write_record([name, path.as_str(), weight.as_str()])?;
            }
        }
        writer.flush()?;
        println!();
        println!("Wrote {} rows to {}", split.total(), out.display());
    }
    Ok(())
}

fn cmd_sequences(config: &PipelineConfig, root: &Path) -> Result<()> {
    let paths = DatasetPaths::new(root);
    let weighted = dataset::load_weighted(&paths, config)?;
    let sequences = dataset::load_sequences(&paths, &weighted, config)?;

    println!("{:<8}  {:>14}  {:>8}  {:>8}", "Shot", "Hit frame", "x", "y");
    println!("{}", "-".repeat(46));
    for seq in &sequences.sequences {
        let centre = seq.frames.get(seq.frames.len() / 2).map(|f| f.file_name()).unwrap_or_default();
        println!("{:<8}  {:>14}  {:>8.4}  {:>8.4}", seq.shot_id, centre, seq.target.x, seq.target.y);
    }

    println!();
    println!("Landing records: {}", sequences.landing.len());
    print_report(&sequences.landing_report);
    print_report(&sequences.sequence_report);
    Ok(())
}

fn cmd_train(config: &PipelineConfig, root: &Path, out: &Path, kind: ModelKind) -> Result<()> {
    let paths = DatasetPaths::new(root);
    let outcome = match kind {
        ModelKind::HitFrameScorer => training::train_hit_scorer(&paths, config, out)?,
        ModelKind::LandingPredictor => training::train_landing_predictor(&paths, config, out)?,
    };
    print_outcome(&outcome);
    Ok(())
}

fn cmd_evaluate(config: &PipelineConfig, root: &Path, models: &Path, landing: bool) -> Result<()> {
    let paths = DatasetPaths::new(root);
    let weighted = dataset::load_weighted(&paths, config)?;

    let (model_file, history_file, (test, decode)) = if landing {
        let sequences = dataset::load_sequences(&paths, &weighted, config)?;
        let split = dataset::split_sequences(sequences.sequences, &config.split)?;
        (LANDING_MODEL_FILENAME, LANDING_HISTORY_FILENAME, training::landing_examples(&split.test, config.image, None)?)
    } else {
        let split = balance_and_split(&weighted.frames(), &config.split)?;
        (HIT_MODEL_FILENAME, HIT_HISTORY_FILENAME, training::hit_examples(&split.test, config.image, None))
    };

    let kind = if landing { ModelKind::LandingPredictor } else { ModelKind::HitFrameScorer };
    let model = LinearRegressor::load(&models.join(model_file), kind)?;
    let eval = training::evaluate(&model, &test)?;

    println!("Model:       {}", models.join(model_file).display());
    if let Some(trained_at) = model.trained_at {
        println!("Trained:     {}", trained_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("Test size:   {}", eval.count);
    println!("Decoded:     {}", decode);
    println!("Test loss:   {:.6}", eval.loss);
    println!("Test MAE:    {:.6}", eval.mae);

    let history_path = models.join(history_file);
    if history_path.exists() {
        let history = TrainingHistory::read_csv(&history_path)?;
        if let Some(best) = history.best() {
            println!("Best epoch:  {} of {} (val loss {:.6})", best.epoch, history.len(), best.val_loss);
        }
    }
    Ok(())
}

fn cmd_predict(config: &PipelineConfig, frames: Option<PathBuf>, models: &Path, dataset: Option<PathBuf>) -> Result<()> {
    let frames = match (frames, &dataset) {
        (Some(dir), _) => dir,
        (None, Some(root)) => {
            let dir = dataset::shot_dirs(&DatasetPaths::new(root))
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("No shot frame directories under {}", root.display()))?;
            log::info!("No frame directory given; using {}", dir.display());
            dir
        }
        (None, None) => anyhow::bail!("Give a frame directory, or --dataset to pick one from"),
    };
    let frames = frames.as_path();

    let scorer = HitFrameScorer::load(&models.join(HIT_MODEL_FILENAME), config.image)?;
    let predictor = LandingPredictor::load(
        &models.join(LANDING_MODEL_FILENAME),
        config.image,
        config.sequence.sequence_length,
    )?;

    let pipeline = InferencePipeline::new(scorer, predictor, config.clone());
    let prediction = pipeline.run(frames)?;

    println!("Video:       {}", frames.display());
    println!("Hit frame:   {} (score {:.4})", prediction.hit_frame.display(), prediction.hit_score);
    println!("Scored:      {}", prediction.scoring);
    println!("Normalised:  x = {:.4}, y = {:.4}", prediction.normalized.x, prediction.normalized.y);
    println!("From left:   {:.2} m", prediction.position.dist_from_left_m);
    println!("From right:  {:.2} m", prediction.position.dist_from_right_m);
    println!("From base:   {:.2} m", prediction.position.dist_from_baseline_m);

    if let Some(root) = dataset {
        let (table, _) = load_landing_table(&DatasetPaths::new(&root).landing_dir, &config.court)?;
        let shot = frames
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match table.lookup(&shot) {
            Some(record) => {
                println!();
                println!("Measured:    x = {:.4}, y = {:.4}", record.point.x, record.point.y);
                println!("Error:       {:.4}", prediction.error_to(&record.point));
            }
            None => println!("No measured landing for {}", shot),
        }
    }
    Ok(())
}

fn cmd_config(config: &PipelineConfig, out: Option<PathBuf>) -> Result<()> {
    match out {
        Some(path) => {
            config.save(&path)?;
            println!("Wrote configuration to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!("{:<12} {:>6} processed, {:>6} skipped", report.operation, report.processed, report.total_skipped());
    for (token, count) in &report.skipped {
        println!("  {}: {}", token, count);
    }
}

fn print_outcome(outcome: &TrainingOutcome) {
    let (train, val, test) = outcome.split_sizes;
    println!();
    println!("Training complete:");
    println!("  Split:       {} train / {} val / {} test", train, val, test);
    println!("  Decoded:     {}", outcome.decode);
    println!("  Epochs:      {}", outcome.history.len());
    if let Some(best) = outcome.history.best() {
        println!("  Best epoch:  {} (val loss {:.6}, val MAE {:.6})", best.epoch, best.val_loss, best.val_mae);
    }
    println!("  Test loss:   {:.6}", outcome.test.loss);
    println!("  Test MAE:    {:.6}", outcome.test.mae);
    println!("  Model:       {}", outcome.model_path.display());
    println!("  History:     {}", outcome.history_path.display());
}

//! tabreg CLI Module
//!
//! `train`, `test` and `predict` commands, each driven by one composed
//! [`AppConfig`].

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::{AppConfig, ConfigLoader};
use crate::data::{DataModule, ID_COLUMN};
use crate::metrics::evaluate_model;
use crate::pipeline::{save_checkpoint, Pipeline};
use crate::training::{cross_validate, format_cv_results, save_results};
use crate::utils::{frame_to_array2, series_to_array1, seed_everything, DataSaver};

/// Rows of the predictions table echoed to the log
const PREVIEW_ROWS: usize = 10;

/// Command line interface
#[derive(Parser)]
#[command(name = "tabreg")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Configuration-driven tabular regression: train, evaluate and predict")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit the configured pipeline, optionally cross-validate and checkpoint it
    Train {
        /// Configuration file (default: configs/train.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// `key.path=value` overrides
        #[arg(trailing_var_arg = true)]
        overrides: Vec<String>,
    },

    /// Score a checkpoint on a held-out split of the training table
    Test {
        /// Configuration file (default: configs/test.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(trailing_var_arg = true)]
        overrides: Vec<String>,
    },

    /// Predict the unlabeled test table with a checkpoint
    Predict {
        /// Configuration file (default: configs/predict.yaml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(trailing_var_arg = true)]
        overrides: Vec<String>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Train { .. } => "train",
            Commands::Test { .. } => "test",
            Commands::Predict { .. } => "predict",
        }
    }

    fn sources(&self) -> (Option<&Path>, &[String]) {
        match self {
            Commands::Train { config, overrides }
            | Commands::Test { config, overrides }
            | Commands::Predict { config, overrides } => (config.as_deref(), overrides),
        }
    }
}

/// Files written and scores computed by one command
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub cv_results: Option<PathBuf>,
    pub checkpoint: Option<PathBuf>,
    pub predictions: Option<PathBuf>,
    pub metrics: BTreeMap<String, f64>,
}

/// Compose the configuration for `command`
pub fn load_config(command: &Commands) -> anyhow::Result<AppConfig> {
    let (file, overrides) = command.sources();
    let loader = match file {
        Some(path) => ConfigLoader::new(path),
        None => ConfigLoader::for_command(command.name()),
    };
    let path = loader.file().display().to_string();
    loader
        .with_overrides(overrides)
        .load()
        .with_context(|| format!("loading configuration from {}", path))
}

/// Load the configuration and run `command`
pub fn run(command: &Commands) -> anyhow::Result<RunSummary> {
    let cfg = load_config(command)?;
    match command {
        Commands::Train { .. } => cmd_train(&cfg),
        Commands::Test { .. } => cmd_test(&cfg),
        Commands::Predict { .. } => cmd_predict(&cfg),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn prepare(cfg: &AppConfig) -> anyhow::Result<DataModule> {
    info!("Configuration:\n{}", cfg.to_pretty_json()?);

    if let Some(seed) = cfg.seed {
        info!("Setting random seed to {}", seed);
        seed_everything(seed);
    }

    Ok(DataModule::new(cfg.data.clone())?)
}

pub fn cmd_train(cfg: &AppConfig) -> anyhow::Result<RunSummary> {
    let dm = prepare(cfg)?;
    let output_dir = cfg.resolve_output_dir(&Local::now());
    let mut summary = RunSummary::default();

    let train = dm.get_split(true)?;
    let x = frame_to_array2(&train.features)?;
    let y = series_to_array1(&train.target)?;

    if let Some(cv_cfg) = &cfg.cross_validate {
        let pipeline = cfg.model.instantiate()?;
        info!("Cross-validating {} on {} rows", cfg.model.model_type, x.nrows());
        let results = cross_validate(&pipeline, &x, &y, &cv_cfg.validator(), &cv_cfg.scorers()?)?;
        let formatted = format_cv_results(&results);
        for (scorer, value) in &formatted {
            info!("{:<28} {}", scorer, value);
        }

        fs::create_dir_all(&output_dir)?;
        let rows = vec![(cfg.model.model_type.clone(), formatted)];
        summary.cv_results = Some(save_results(&rows, &output_dir)?);
    }

    info!("Fitting {} on {} rows", cfg.model.model_type, x.nrows());
    let mut pipeline = cfg.model.instantiate()?;
    pipeline.fit_frame(&train.features, &train.target)?;

    if let Some(dir) = &cfg.checkpoint_dir {
        summary.checkpoint = Some(save_checkpoint(&pipeline, dir)?);
    }

    Ok(summary)
}

/// Load the configured checkpoint, or log how to produce one and return `None`
fn load_checkpoint(cfg: &AppConfig) -> anyhow::Result<Option<Pipeline>> {
    let path = cfg.checkpoint_path()?;
    if !path.is_file() {
        error!("Model file not found at {}", path.display());
        info!("Please run the training script first to generate a model.");
        return Ok(None);
    }

    info!("Loading model from {}", path.display());
    let pipeline = Pipeline::load(path).with_context(|| format!("loading checkpoint {}", path.display()))?;
    Ok(Some(pipeline))
}

/// `[id, <target>]`, highest prediction first
fn predictions_frame(ids: &Series, predictions: &[f64], target: &str) -> anyhow::Result<DataFrame> {
    let mut ids = ids.clone();
    ids.rename(ID_COLUMN.into());
    let values = Series::new(target.into(), predictions);

    let df = DataFrame::new(vec![Column::from(ids), Column::from(values)])?;
    Ok(df.sort([target], SortMultipleOptions::default().with_order_descending(true))?)
}

fn write_predictions(cfg: &AppConfig, df: &mut DataFrame) -> anyhow::Result<Option<PathBuf>> {
    let Some(file_name) = &cfg.predictions_file else {
        return Ok(None);
    };

    let output_dir = cfg.resolve_output_dir(&Local::now());
    fs::create_dir_all(&output_dir)?;
    let path = output_dir.join(file_name);
    DataSaver::save_csv(df, &path)?;
    info!("Predictions saved to {}", path.display());
    Ok(Some(path))
}

pub fn cmd_test(cfg: &AppConfig) -> anyhow::Result<RunSummary> {
    let dm = prepare(cfg)?;
    let mut summary = RunSummary::default();

    let held_out = dm.get_split(false)?;

    let Some(pipeline) = load_checkpoint(cfg)? else {
        return Ok(summary);
    };

    info!("Making predictions on {} rows", held_out.features.height());
    let y_pred = pipeline.predict_frame(&held_out.features)?;
    let mut df = predictions_frame(&held_out.ids, &y_pred.to_vec(), &dm.config().target_variable)?;

    summary.predictions = write_predictions(cfg, &mut df)?;
    info!("Predictions:\n{}", df.head(Some(PREVIEW_ROWS)));

    let y_true = series_to_array1(&held_out.target)?;
    summary.metrics = evaluate_model(&cfg.metrics, &y_true, &y_pred)?;
    for (name, value) in &summary.metrics {
        info!("{}: {:.4}", name, value);
    }

    Ok(summary)
}

pub fn cmd_predict(cfg: &AppConfig) -> anyhow::Result<RunSummary> {
    let dm = prepare(cfg)?;
    let mut summary = RunSummary::default();

    let test = dm.get_test_data()?;

    let Some(pipeline) = load_checkpoint(cfg)? else {
        return Ok(summary);
    };

    info!("Making predictions on {} rows", test.features.height());
    let y_pred = pipeline.predict_frame(&test.features)?;
    let mut df = predictions_frame(&test.ids, &y_pred.to_vec(), &dm.config().target_variable)?;

    summary.predictions = write_predictions(cfg, &mut df)?;
    info!("Predictions:\n{}", df.head(Some(PREVIEW_ROWS)));

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_config_and_overrides() {
        let cli = Cli::parse_from([
            "tabreg",
            "train",
            "--config",
            "run.yaml",
            "model.model_type=lasso",
            "model.params.alpha=0.5",
        ]);
        match &cli.command {
            Commands::Train { config, overrides } => {
                assert_eq!(config.as_deref(), Some(Path::new("run.yaml")));
                assert_eq!(overrides, &vec!["model.model_type=lasso", "model.params.alpha=0.5"]);
            }
            _ => panic!("expected train"),
        }
        assert_eq!(cli.command.name(), "train");
    }

    #[test]
    fn test_predictions_frame_sorted_descending() {
        let ids = Series::new("id".into(), &[1i64, 2, 3]);
        let df = predictions_frame(&ids, &[0.5, 2.0, 1.0], "price").unwrap();

        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["id", "price"]);

        let ids: Vec<Option<i64>> = df.column("id").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(ids, vec![Some(2), Some(3), Some(1)]);
    }
}

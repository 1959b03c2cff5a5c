//! Integration test: train, test and predict end-to-end

use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tabreg::cli::{cmd_predict, cmd_test, cmd_train, run, Commands};
use tabreg::config::{AppConfig, ConfigLoader};

/// Commands seed the shared generator; run them one at a time
static RNG_LOCK: Mutex<()> = Mutex::new(());

/// `target = 2*x1 + 3*x2 + 1`, plus an unlabeled table without `target`
fn write_tables(dir: &Path) {
    let mut train = String::from("id,x1,x2,target\n");
    for i in 0..40 {
        let x1 = i as f64 * 0.25;
        let x2 = ((i * 7) % 11) as f64;
        train.push_str(&format!("{},{},{},{}\n", i, x1, x2, 2.0 * x1 + 3.0 * x2 + 1.0));
    }
    fs::write(dir.join("train.csv"), train).unwrap();

    let mut test = String::from("id,x1,x2\n");
    for i in 0..5 {
        test.push_str(&format!("{},{},{}\n", 1000 + i, i as f64, (5 - i) as f64));
    }
    fs::write(dir.join("test.csv"), test).unwrap();
}

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let yaml = format!(
        "seed: 1234\n\
         output_dir: {out}\n\
         checkpoint_dir: {ckpt}\n\
         predictions_file: predictions.csv\n\
         data:\n  train_dataset_url: {train}\n  test_dataset_url: {test}\n  target_variable: target\n\
         model:\n  model_type: linear\n  scale_features: true\n\
         {extra}",
        out = dir.join("out").display(),
        ckpt = dir.join("checkpoints").display(),
        train = dir.join("train.csv").display(),
        test = dir.join("test.csv").display(),
        extra = extra,
    );
    let path = dir.join("run.yaml");
    fs::write(&path, yaml).unwrap();
    path
}

fn load(path: &Path, overrides: &[&str]) -> AppConfig {
    ConfigLoader::new(path).with_overrides(overrides).without_env().load().unwrap()
}

fn prediction_values(path: &Path) -> Vec<f64> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(1).unwrap().parse().unwrap())
        .collect()
}

#[test]
fn test_train_then_test_then_predict() {
    let _guard = RNG_LOCK.lock();
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let cfg_path = write_config(
        dir.path(),
        "metrics:\n  r2:\n    _target_: sklearn.metrics.r2_score\n  mae:\n    _target_: mean_absolute_error\n",
    );

    let trained = cmd_train(&load(&cfg_path, &[])).unwrap();
    let checkpoint = trained.checkpoint.expect("checkpoint written");
    assert!(checkpoint.is_file());
    assert!(trained.cv_results.is_none());

    let checkpoint_override = format!("checkpoint={}", checkpoint.display());
    let tested = cmd_test(&load(&cfg_path, &[checkpoint_override.as_str()])).unwrap();
    assert!(tested.metrics["r2"] > 0.999);
    assert!(tested.metrics["mae"] < 1e-6);

    let predictions = tested.predictions.expect("predictions written");
    let values = prediction_values(&predictions);
    assert_eq!(values.len(), 8);
    assert!(values.windows(2).all(|w| w[0] >= w[1]));

    let predicted = cmd_predict(&load(&cfg_path, &[checkpoint_override.as_str()])).unwrap();
    assert!(predicted.metrics.is_empty());
    let values = prediction_values(&predicted.predictions.unwrap());
    assert_eq!(values.len(), 5);
    assert!(values.windows(2).all(|w| w[0] >= w[1]));
    // x1 = 0, x2 = 5 gives the largest target
    assert!((values[0] - 16.0).abs() < 1e-6);
}

#[test]
fn test_cross_validation_summary() {
    let _guard = RNG_LOCK.lock();
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let cfg_path = write_config(
        dir.path(),
        "cross_validate:\n  strategy: kfold\n  n_splits: 4\n  shuffle: true\n  scoring: [r2, neg_mean_squared_error]\n",
    );

    let trained = cmd_train(&load(&cfg_path, &[])).unwrap();
    let summary = fs::read_to_string(trained.cv_results.unwrap()).unwrap();
    let mut lines = summary.lines();
    assert_eq!(lines.next().unwrap(), "model,r2,neg_mean_squared_error");

    let row = lines.next().unwrap();
    assert!(row.starts_with("linear,1.000 ± 0.000,"));
    assert!(lines.next().is_none());
}

#[test]
fn test_missing_checkpoint_is_soft_failure() {
    let _guard = RNG_LOCK.lock();
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let cfg_path = write_config(dir.path(), "");
    let missing = format!("checkpoint={}", dir.path().join("nope.json").display());

    let tested = cmd_test(&load(&cfg_path, &[missing.as_str()])).unwrap();
    assert!(tested.predictions.is_none());
    assert!(tested.metrics.is_empty());

    let predicted = cmd_predict(&load(&cfg_path, &[missing.as_str()])).unwrap();
    assert!(predicted.predictions.is_none());

    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_overrides_beat_file_values() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let cfg_path = write_config(dir.path(), "");

    let cfg = load(&cfg_path, &[]);
    assert_eq!(cfg.model.model_type, "linear");
    assert_eq!(cfg.seed, Some(1234));

    let cfg = load(
        &cfg_path,
        &["model.model_type=lasso", "model.params.alpha=0.5", "seed=7", "data.exclude_features=[x2]"],
    );
    assert_eq!(cfg.model.model_type, "lasso");
    assert_eq!(cfg.seed, Some(7));
    assert_eq!(cfg.data.exclude_features, Some(vec!["x2".to_string()]));
    assert!(cfg.model.params.contains_key("alpha"));
}

#[test]
fn test_run_rejects_invalid_model_type() {
    let _guard = RNG_LOCK.lock();
    let dir = tempfile::tempdir().unwrap();
    write_tables(dir.path());
    let cfg_path = write_config(dir.path(), "");

    let command = Commands::Train {
        config: Some(cfg_path),
        overrides: vec!["model.model_type=boosted".to_string()],
    };
    let err = run(&command).unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid model type: boosted"));
}

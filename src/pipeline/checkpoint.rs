//! Pipeline checkpoints (JSON)

use super::Pipeline;
use crate::error::Result;
use chrono::{DateTime, Local, TimeZone};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// `model-YYYY-MM-DD_HH-MM-SS.json` for the given instant
pub fn checkpoint_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("model-{}.json", at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Write `pipeline` into `dir` under a timestamped name, creating `dir` if needed
pub fn save_checkpoint(pipeline: &Pipeline, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(checkpoint_file_name(&Local::now()));
    pipeline.save(&path)?;
    info!("Model saved to {}", path.display());
    Ok(path)
}

impl Pipeline {
    /// Save the pipeline to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a pipeline from a file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::create_pipeline;
    use crate::training::{ModelParams, ParamValue};
    use chrono::NaiveDate;
    use ndarray::array;

    #[test]
    fn test_checkpoint_file_name() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(7, 5, 0))
            .unwrap()
            .and_utc();
        assert_eq!(checkpoint_file_name(&at), "model-2024-03-09_07-05-00.json");
    }

    #[test]
    fn test_save_and_load_preserves_predictions() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0], [4.0, 3.0], [5.0, 4.0], [6.0, 7.0]];
        let y = array![3.0, 3.5, 8.0, 7.5, 9.5, 13.0];

        let mut params = ModelParams::new();
        params.insert("n_estimators".to_string(), ParamValue::Int(5));
        let mut pipeline = create_pipeline("random_forest", true, 1234, &params).unwrap();
        pipeline.fit(&x, &y).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = save_checkpoint(&pipeline, &dir.path().join("checkpoints")).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("model-"));

        let restored = Pipeline::load(&path).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.predict(&x).unwrap(), pipeline.predict(&x).unwrap());
    }
}

//! Configuration composition: file, then environment, then overrides

use super::AppConfig;
use crate::error::{TabregError, Result};
use config::{Config, Environment, File, Value, ValueKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of environment variables read into the configuration
pub const ENV_PREFIX: &str = "TABREG";

/// Directory searched for `<command>.yaml` when no file is given
pub const DEFAULT_CONFIG_DIR: &str = "configs";

/// Builds an [`AppConfig`] from layered sources
pub struct ConfigLoader {
    file: PathBuf,
    overrides: Vec<String>,
    use_env: bool,
}

impl ConfigLoader {
    /// Load from an explicit file (YAML, TOML or JSON by extension)
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            overrides: Vec::new(),
            use_env: true,
        }
    }

    /// `configs/<command>.yaml`
    pub fn for_command(command: &str) -> Self {
        Self::new(Path::new(DEFAULT_CONFIG_DIR).join(format!("{}.yaml", command)))
    }

    /// `key.path=value` overrides, applied last
    pub fn with_overrides<S: AsRef<str>>(mut self, overrides: &[S]) -> Self {
        self.overrides = overrides.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Skip `TABREG__*` environment variables
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn build(&self) -> Result<Config> {
        if !self.file.is_file() {
            return Err(TabregError::ConfigError(format!(
                "config file not found: {}",
                self.file.display()
            )));
        }

        let mut builder = Config::builder().add_source(File::from(self.file.as_path()));

        if self.use_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        for raw in &self.overrides {
            let (key, value) = parse_override(raw)?;
            debug!(key = key.as_str(), "Applying override");
            builder = builder.set_override(key, value)?;
        }

        Ok(builder.build()?)
    }

    pub fn load(&self) -> Result<AppConfig> {
        Ok(self.build()?.try_deserialize()?)
    }
}

/// Split `key.path=value` and type the value: integers, floats, booleans,
/// `null`, `[a, b]` lists, otherwise a string
pub fn parse_override(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| TabregError::ConfigError(format!("override '{}' is not of the form key=value", raw)))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(TabregError::ConfigError(format!("override '{}' has an empty key", raw)));
    }

    Ok((key.to_string(), parse_value(value.trim())))
}

fn parse_value(text: &str) -> Value {
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let items: Vec<Value> = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_value)
            .collect();
        return Value::new(None, ValueKind::Array(items));
    }

    let unquoted = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')));
    if let Some(s) = unquoted {
        return Value::new(None, ValueKind::String(s.to_string()));
    }

    let kind = if let Ok(i) = text.parse::<i64>() {
        ValueKind::I64(i)
    } else if let Ok(f) = text.parse::<f64>() {
        ValueKind::Float(f)
    } else {
        match text {
            "true" | "True" => ValueKind::Boolean(true),
            "false" | "False" => ValueKind::Boolean(false),
            "null" | "None" | "~" => ValueKind::Nil,
            _ => ValueKind::String(text.to_string()),
        }
    };
    Value::new(None, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override_types() {
        let (key, value) = parse_override("model.params.alpha=0.5").unwrap();
        assert_eq!(key, "model.params.alpha");
        assert_eq!(value.into_float().unwrap(), 0.5);

        let (_, value) = parse_override("model.scale_features=false").unwrap();
        assert!(!value.into_bool().unwrap());

        let (_, value) = parse_override("seed=42").unwrap();
        assert_eq!(value.into_int().unwrap(), 42);

        let (_, value) = parse_override("model.model_type=svm").unwrap();
        assert_eq!(value.into_string().unwrap(), "svm");
    }

    #[test]
    fn test_parse_override_list() {
        let (_, value) = parse_override("data.exclude_features=[a, b]").unwrap();
        let items: Vec<String> = value
            .into_array()
            .unwrap()
            .into_iter()
            .map(|v| v.into_string().unwrap())
            .collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_override_rejects_missing_equals() {
        assert!(matches!(parse_override("seed"), Err(TabregError::ConfigError(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new("/nonexistent/train.yaml").load().unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}

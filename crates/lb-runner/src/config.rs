//! Runner configuration: a JSON file plus environment overrides.

use lb_experiments::ExperimentKind;
use lb_optimizer::RunConfig;
use lb_types::LbResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable naming the config file when no CLI argument is given.
pub const CONFIG_ENV: &str = "LB_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub run: RunConfig,
    pub experiment: ExperimentKind,
    /// Where to write every trial record as JSON, if anywhere.
    pub history_path: Option<PathBuf>,
}

impl RunnerConfig {
    /// Parse a config file. Missing sections take their defaults.
    pub fn from_file(path: &Path) -> LbResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Load from `path` when given, defaults otherwise, then apply overrides
    /// from `env`.
    pub fn load<F>(path: Option<&Path>, env: F) -> LbResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(env)?;
        config.run.validate()?;
        Ok(config)
    }

    /// Apply `LB_SEED`, `LB_INIT_TRIALS`, and `LB_MAX_TRIALS`.
    pub fn apply_overrides<F>(&mut self, env: F) -> LbResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(seed) = parse_var(&env, "LB_SEED")? {
            self.run.seed = seed;
        }
        if let Some(n) = parse_var(&env, "LB_INIT_TRIALS")? {
            self.run.init_trials = n;
        }
        if let Some(n) = parse_var(&env, "LB_MAX_TRIALS")? {
            self.run.max_trials = n;
        }
        Ok(())
    }
}

fn parse_var<T, F>(env: &F, key: &str) -> LbResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| lb_types::config_error!("{key}={raw:?}: {e}")),
    }
}

/// Resolve the config path from the first CLI argument or [`CONFIG_ENV`].
pub fn config_path<F>(mut args: impl Iterator<Item = String>, env: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    args.next()
        .or_else(|| env(CONFIG_ENV))
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

use crate::params::{EngineOptions, OutbreakParams, check_num};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Configuration of a command-line simulation.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Epidemiological parameters.
    pub outbreak: OutbreakParams,
    /// Engine options.
    #[serde(default)]
    pub engine: EngineOptions,
    /// Run options.
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Seed of the random number generator (drawn from the OS if absent).
    pub seed: Option<u64>,
    /// Number of independent replicas of an ensemble run.
    pub replicas: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            replicas: 1,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.outbreak
            .validate(&self.engine)
            .context("invalid outbreak parameters")?;
        check_num("replicas", self.run.replicas, 1..=100_000).context("invalid number of replicas")?;
        Ok(())
    }
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};

use crate::config::{ScoringConfig, ScoringConfigSet};

/// Environment prefix for overrides, nested with `__` (e.g. `IVCRUSH_VRP__MARGINAL=2.0`).
pub const ENV_PREFIX: &str = "IVCRUSH_";

/// Loads scoring configs from `<dir>/Scoring.toml` and friends.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    dir: PathBuf,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new("config")
    }
}

impl ConfigLoader {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Loads a single scoring config by merging TOML, JSON, and environment variables.
    ///
    /// Missing files fall back to the documented defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be parsed or the merged config is invalid.
    pub fn load(&self) -> Result<ScoringConfig> {
        let config: ScoringConfig = Figment::new()
            .merge(Toml::file(self.dir.join("Scoring.toml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .join(Json::file(self.dir.join("Scoring.json")))
            .extract()
            .context("failed to load scoring config")?;

        config.validate()?;
        tracing::debug!(name = %config.name, "Loaded scoring config");
        Ok(config)
    }

    /// Loads a single scoring config layered with a profile file.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be parsed or the merged config is invalid.
    pub fn load_with_profile(&self, profile: &str) -> Result<ScoringConfig> {
        let config: ScoringConfig = Figment::new()
            .merge(Toml::file(self.dir.join("Scoring.toml")))
            .merge(Toml::file(self.dir.join(format!("Scoring.{profile}.toml"))))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .join(Json::file(self.dir.join("Scoring.json")))
            .extract()
            .with_context(|| format!("failed to load scoring profile '{profile}'"))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads the candidate set used by walk-forward selection from `<dir>/Candidates.toml`.
    ///
    /// The file holds a `[[configs]]` array of tables; each entry may be partial.
    /// `IVCRUSH_`-prefixed environment variables override every candidate alike;
    /// candidate names are never taken from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or any config is invalid.
    pub fn load_candidates(&self) -> Result<ScoringConfigSet> {
        let figment = Figment::new().merge(Toml::file(self.dir.join("Candidates.toml")));
        Self::candidate_set(figment)
    }

    /// Loads the candidate set with `<dir>/Candidates.<profile>.toml` layered on top.
    ///
    /// A profile that declares `configs` replaces the base list.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be parsed or any config is invalid.
    pub fn load_candidates_with_profile(&self, profile: &str) -> Result<ScoringConfigSet> {
        let figment = Figment::new()
            .merge(Toml::file(self.dir.join("Candidates.toml")))
            .merge(Toml::file(self.dir.join(format!("Candidates.{profile}.toml"))));
        Self::candidate_set(figment)
            .with_context(|| format!("failed to load candidate profile '{profile}'"))
    }

    fn candidate_set(figment: Figment) -> Result<ScoringConfigSet> {
        let mut set: ScoringConfigSet = figment
            .extract()
            .context("failed to load candidate scoring configs")?;

        for config in &mut set.configs {
            let merged: ScoringConfig = Figment::from(Serialized::defaults(&*config))
                .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["name"]))
                .extract()
                .with_context(|| format!("invalid environment override for '{}'", config.name))?;
            *config = merged;
        }

        set.validate()?;
        tracing::info!(count = set.configs.len(), "Loaded candidate scoring configs");
        Ok(set)
    }
}

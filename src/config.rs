//! Runtime configuration
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object (or no file at all) yields the standard behaviour.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

use crate::model::Species;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CoreConfig {
    pub transform: TransformSettings,
    /// Organism written to exchange files when a study carries no species
    pub species: Species,
    pub archive: ArchiveSettings,
}

/// Parameters of the standardizing shift and the Box-Cox λ scan
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformSettings {
    /// Shift = (x - min(x)) + variance_shift × var(x)
    pub variance_shift: f64,
    pub lambda_min: f64,
    pub lambda_max: f64,
    pub lambda_step: f64,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            variance_shift: 0.1,
            lambda_min: -2.0,
            lambda_max: 2.0,
            lambda_step: 0.1,
        }
    }
}

impl TransformSettings {
    /// λ candidates in increasing scan order.
    ///
    /// Computed as `min + k × step` (not by accumulation) so that λ = 0 is hit
    /// exactly on the default grid.
    pub fn lambdas(&self) -> Vec<f64> {
        let steps = ((self.lambda_max - self.lambda_min) / self.lambda_step + 1e-9).floor() as usize;
        (0..=steps)
            .map(|k| self.lambda_min + k as f64 * self.lambda_step)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Parent directory for scoped temporaries; system temp dir when unset
    pub temp_root: Option<PathBuf>,
}

impl ArchiveSettings {
    /// Working directory removed when dropped
    pub fn scoped_dir(&self, prefix: &str) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix);
        match &self.temp_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    /// File removed when dropped
    pub fn scoped_file(&self, suffix: &str) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.suffix(suffix);
        match &self.temp_root {
            Some(root) => builder.tempfile_in(root),
            None => builder.tempfile(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: CoreConfig = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `PHENO_CONFIG` if set, defaults otherwise
    pub fn from_env() -> Result<Self> {
        match std::env::var("PHENO_CONFIG") {
            Ok(path) => Self::load(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        let t = &self.transform;
        if !(t.lambda_step > 0.0) {
            anyhow::bail!("lambda_step must be positive, got {}", t.lambda_step);
        }
        if t.lambda_min > t.lambda_max {
            anyhow::bail!(
                "lambda_min ({}) is greater than lambda_max ({})",
                t.lambda_min,
                t.lambda_max
            );
        }
        if !(t.variance_shift >= 0.0) {
            anyhow::bail!("variance_shift must be non-negative, got {}", t.variance_shift);
        }
        Ok(())
    }
}

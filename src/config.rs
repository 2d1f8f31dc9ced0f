//! Construction-time pipeline settings.
//!
//! A `PipelineConfig` is what a model bundle would ship alongside its rules:
//! which phases the pipeline serves, collections the model wants hidden, and
//! the default input guards. Everything has a default, so `{}` is a valid
//! config file.

use crate::engine::Suppression;
use crate::error::{Error, Result};
use crate::{Phase, PhaseSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enabled_phases: Vec<Phase>,
    /// Suppression lists supplied with the model, merged with the caller's.
    pub suppressed: Suppression,
    /// Longest click (in codepoints) `suggest_selection` will work on.
    pub max_selection_codepoints: usize,
    /// Longest span (in codepoints) `classify` will work on.
    pub max_classification_codepoints: usize,
    /// Most word tokens `classify` will work on.
    pub max_classification_tokens: usize,
    /// Register the bundled numeric date parser in `Pipeline::with_defaults`.
    pub bundled_dates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled_phases: Phase::ALL.to_vec(),
            suppressed: Suppression::default(),
            max_selection_codepoints: 256,
            max_classification_codepoints: 256,
            max_classification_tokens: 32,
            bundled_dates: true,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&json)
    }

    pub fn phases(&self) -> PhaseSet {
        self.enabled_phases.iter().copied().collect()
    }
}

//! Scenario files: which model to sweep and how.
//!
//! Scenarios are JSON or TOML, picked by file extension:
//!
//! ```toml
//! model = "solow"
//! horizon = 50.0
//! method = "rk4"
//!
//! [[overrides]]
//! name = "s"
//! value = 0.3
//! ```

use crate::equation_engine::{EngineError, EquationSystem};
use crate::models::{builtin, ModelDefinition};
use crate::solvers::Method;
use crate::sweep::{ParameterChange, Sweep, SweepConfig, SweepError, View};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON scenario: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid TOML scenario: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to write TOML scenario: {0}")]
    TomlWrite(#[from] toml::ser::Error),
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("Unsupported scenario extension: {0:?}")]
    UnsupportedExtension(String),
    #[error("Initial state has {got} components, model has {expected}")]
    InitialState { expected: usize, got: usize },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Sweep(#[from] SweepError<EngineError>),
}

/// A built-in model name or a full inline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSource {
    Builtin(String),
    Custom(ModelDefinition),
}

fn default_step() -> f64 {
    0.01
}

fn default_horizon() -> f64 {
    10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub model: ModelSource,
    /// Overrides the model's own starting point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<Vec<f64>>,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default = "default_horizon")]
    pub horizon: f64,
    #[serde(default)]
    pub method: Method,
    /// Starting point for the Newton search. Falls back to the final state
    /// of the swept trajectory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equilibrium_guess: Option<Vec<f64>>,
    #[serde(default)]
    pub view: View,
    /// Slider events replayed after initialization, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<ParameterChange>,
}

impl ScenarioConfig {
    /// A scenario for a built-in model with every option at its default.
    pub fn builtin(name: &str) -> Self {
        Self {
            model: ModelSource::Builtin(name.to_string()),
            initial_state: None,
            step: default_step(),
            horizon: default_horizon(),
            method: Method::default(),
            equilibrium_guess: None,
            view: View::default(),
            overrides: Vec::new(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Reads a `.json` or `.toml` scenario file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if extension != "json" && extension != "toml" {
            return Err(ConfigError::UnsupportedExtension(extension));
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), format = %extension, "loading scenario");
        if extension == "json" {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }

    /// Resolves the model and applies the initial-state override.
    pub fn definition(&self) -> Result<ModelDefinition, ConfigError> {
        let mut definition = match &self.model {
            ModelSource::Builtin(name) => {
                builtin(name).ok_or_else(|| ConfigError::UnknownModel(name.clone()))?
            }
            ModelSource::Custom(definition) => definition.clone(),
        };
        if let Some(initial) = &self.initial_state {
            definition.initial_state = initial.clone();
        }
        if definition.initial_state.len() != definition.variables.len() {
            return Err(ConfigError::InitialState {
                expected: definition.variables.len(),
                got: definition.initial_state.len(),
            });
        }
        Ok(definition)
    }

    pub fn sweep_config(&self, definition: &ModelDefinition) -> SweepConfig {
        SweepConfig::new(definition.initial_state.clone(), self.step, self.horizon)
            .with_method(self.method)
            .with_view(self.view)
    }

    /// Compiles the model and sets up a sweep over its parameters. The
    /// overrides are not applied yet.
    pub fn build(&self) -> Result<Sweep<EquationSystem>, ConfigError> {
        let definition = self.definition()?;
        let system = definition.compile()?;
        let sweep = Sweep::new(
            system,
            definition.parameters.clone(),
            self.sweep_config(&definition),
        )?
        .with_title(&definition.name)
        .with_labels(definition.variables.clone());
        Ok(sweep)
    }
}

//! Pipeline configuration
//!
//! Every knob has a default, so an empty JSON object is a valid config
//! file. The binary loads a file (if given) and then applies command line
//! overrides through [`PipelineConfigBuilder`].
//!
//! ```rust
//! use vdw_crunch::config::PipelineConfig;
//! use vdw_crunch::fit::Model;
//!
//! # fn main() -> vdw_crunch::Result<()> {
//! let config = PipelineConfig::builder()
//!     .model(Model::Exponential)
//!     .min_fit_points(6)
//!     .build()?;
//! assert_eq!(config.min_fit_points, 6);
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fit::{Model, SolverOptions};
use crate::key::KeyDomain;
use crate::meta::WriteMode;
use crate::{Error, Result};

/// Interior points below which no fit is attempted.
pub const DEFAULT_MIN_FIT_POINTS: usize = 4;

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How keys are interpreted.
    pub domain: KeyDomain,
    /// Family fitted to each key's rate series.
    pub model: Model,
    /// Minimum interior points needed to fit.
    pub min_fit_points: usize,
    /// Behavior for keys that already have a record.
    pub write_mode: WriteMode,
    /// Solver settings.
    pub solver: SolverOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            domain: KeyDomain::default(),
            model: Model::default(),
            min_fit_points: DEFAULT_MIN_FIT_POINTS,
            write_mode: WriteMode::default(),
            solver: SolverOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Start a builder from the defaults.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::from(Self::default())
    }

    /// Read a JSON config file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if the
    /// resulting config is invalid.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            Error::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings are usable together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when the minimum point count is below
    /// the model's parameter count, or a solver setting is out of range.
    pub fn validate(&self) -> Result<()> {
        let required = self.model.param_count();
        if self.min_fit_points < required {
            return Err(Error::InvalidConfig(format!(
                "min_fit_points is {} but the {} model has {required} parameters",
                self.min_fit_points, self.model
            )));
        }
        if self.solver.max_evaluations == 0 {
            return Err(Error::InvalidConfig(
                "solver.max_evaluations must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("ftol", self.solver.ftol),
            ("xtol", self.solver.xtol),
            ("step_bound", self.solver.step_bound),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "solver.{name} must be a positive number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl From<PipelineConfig> for PipelineConfigBuilder {
    fn from(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl PipelineConfigBuilder {
    /// Set the key domain.
    #[must_use]
    pub const fn domain(mut self, domain: KeyDomain) -> Self {
        self.config.domain = domain;
        self
    }

    /// Set the model family.
    #[must_use]
    pub const fn model(mut self, model: Model) -> Self {
        self.config.model = model;
        self
    }

    /// Set the minimum number of interior points.
    #[must_use]
    pub const fn min_fit_points(mut self, points: usize) -> Self {
        self.config.min_fit_points = points;
        self
    }

    /// Set the write mode.
    #[must_use]
    pub const fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    /// Set the solver's evaluation budget.
    #[must_use]
    pub const fn max_evaluations(mut self, budget: usize) -> Self {
        self.config.solver.max_evaluations = budget;
        self
    }

    /// Replace all solver settings.
    #[must_use]
    pub const fn solver(mut self, solver: SolverOptions) -> Self {
        self.config.solver = solver;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::validate`].
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

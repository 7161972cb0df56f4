//! Compiler configuration
//!
//! Defaults can be overridden through `JMMC_*` environment variables, which is
//! how the integration tests and the CLI tune error budgets.

use crate::consts::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_ERRORS};
use crate::error::{Error, Result};

pub const ENV_MAX_ERRORS: &str = "JMMC_MAX_ERRORS";
pub const ENV_MAX_DEPTH: &str = "JMMC_MAX_DEPTH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Diagnostics stored per unit; later ones are only counted
    pub max_errors: usize,
    /// Nesting bound for statements and expressions in the parser
    pub max_depth: usize,
    /// Raise logging to debug in the CLI
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
            max_depth: DEFAULT_MAX_DEPTH,
            verbose: false,
        }
    }
}

impl Config {
    /// Build a configuration from defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = read_usize(ENV_MAX_ERRORS)? {
            config.max_errors = value;
        }
        if let Some(value) = read_usize(ENV_MAX_DEPTH)? {
            if value == 0 {
                return Err(Error::config_error(format!("{} must be positive", ENV_MAX_DEPTH)));
            }
            config.max_depth = value;
        }
        log::debug!("config: {:?}", config);
        Ok(config)
    }

    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn read_usize(name: &str) -> Result<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| Error::config_error(format!("{} expects a number, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

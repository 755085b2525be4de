//! Run configuration.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use meshcheck_services::FactoryConfig;
use meshcheck_sim::SimOptions;
use serde::{Deserialize, Serialize};

use crate::observe::RetryPolicy;

/// Everything a run can be tuned with.
///
/// Every table and field is optional.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// How nodes are launched.
    pub factory: FactoryConfig,
    /// How observations are retried.
    pub retry: RetryPolicy,
    /// The bundled simulated backend.
    pub sim: SimOptions,
}

impl RunConfig {
    /// Reads and validates the TOML file at `path`.
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("unable to read config: {path:?}"))?;
        let cfg: Self =
            toml::from_str(&text).with_context(|| format!("unable to parse config: {path:?}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks the parts not validated during parsing.
    pub fn validate(&self) -> Result<()> {
        self.factory.validate().context("invalid [factory] table")?;
        self.retry.validate().context("invalid [retry] table")?;
        Ok(())
    }
}

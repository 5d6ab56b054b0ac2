//! Scheduler configuration: policy selection and orchestration-node settings.

use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, CoreError};

/// Scoring policy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Priority, then submission order.
    #[default]
    Fifo,
    /// Priority, then inputs already on the candidate host.
    DataLocality,
    /// Priority, group priority, age, then least loaded worker.
    LoadBalancing,
}

impl fmt::Display for PolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fifo => "fifo",
            Self::DataLocality => "data_locality",
            Self::LoadBalancing => "load_balancing",
        })
    }
}

impl FromStr for PolicyConfig {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fifo" => Ok(Self::Fifo),
            "data_locality" | "locality" => Ok(Self::DataLocality),
            "load_balancing" | "lb" => Ok(Self::LoadBalancing),
            other => Err(CoreError::InvalidConfig(format!("unknown policy `{other}`"))),
        }
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Scoring policy.
    pub policy: PolicyConfig,
    /// Name of the orchestration node, subject to the master carve-out.
    pub local_node: String,
    /// Withhold one cpu unit on the orchestration node.
    pub withhold_master_unit: bool,
    /// Terminal action states kept queryable after they leave the live table.
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::Fifo,
            local_node: "localhost".into(),
            withhold_master_unit: true,
            history_limit: 1024,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.local_node.trim().is_empty() {
            return Err(CoreError::InvalidConfig("local_node must not be empty".into()));
        }
        if self.local_node.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidConfig(format!(
                "local_node `{}` must not contain whitespace",
                self.local_node
            )));
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidConfig`] on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, CoreError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| CoreError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the process environment, reading a `.env` file first if one
    /// exists. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails when a variable is set to an unparsable value.
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Build from an arbitrary variable lookup, using the `ELASTIC_*` names.
    ///
    /// # Errors
    ///
    /// Fails when a variable holds an unparsable value.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(policy) = lookup("ELASTIC_POLICY") {
            cfg.policy = policy.parse().context("ELASTIC_POLICY")?;
        }
        if let Some(node) = lookup("ELASTIC_LOCAL_NODE") {
            cfg.local_node = node;
        }
        if let Some(withhold) = lookup("ELASTIC_WITHHOLD_MASTER_UNIT") {
            cfg.withhold_master_unit = withhold
                .parse()
                .with_context(|| format!("ELASTIC_WITHHOLD_MASTER_UNIT=`{withhold}`"))?;
        }
        if let Some(limit) = lookup("ELASTIC_HISTORY_LIMIT") {
            cfg.history_limit = limit
                .parse()
                .with_context(|| format!("ELASTIC_HISTORY_LIMIT=`{limit}`"))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

use std::{fs, path::Path};

use anyhow::Context;
use serde_yaml::{Mapping, Value};

use cronha_model::CoordinationConfig;
use cronha_observe::LoggerConfig;

/// Contents of the YAML configuration file.
///
/// Coordination keys sit at the top level; logging lives under `log:`.
#[derive(Debug, Clone, Default)]
pub struct AgentConfig {
    pub coordination: CoordinationConfig,
    pub log: LoggerConfig,
}

impl AgentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut doc: Mapping = serde_yaml::from_str(raw)?;
        let log = match doc.remove("log") {
            Some(section) => serde_yaml::from_value(section).context("invalid `log` section")?,
            None => LoggerConfig::default(),
        };
        let coordination: CoordinationConfig = serde_yaml::from_value(Value::Mapping(doc))?;
        coordination.validate()?;

        Ok(Self { coordination, log })
    }
}

//! Scenario files: a topology, optional engine config overrides, and an
//! optional custom seed layout.

use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use topoviz_core::config::EngineConfig;
use topoviz_core::engine::Engine;
use topoviz_core::seed::{LayoutError, SeedLayout};
use topoviz_core::topology::TopologyKind;

use crate::loader::{DataLoadError, deserialize_file, require_data_file};

/// Everything needed to start an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub topology: TopologyKind,
    #[serde(default)]
    pub config: EngineConfig,
    /// Replaces the canonical layout when present.
    #[serde(default)]
    pub layout: Option<SeedLayout>,
}

impl Scenario {
    /// The canonical scenario for a topology.
    pub fn canonical(topology: TopologyKind) -> Self {
        Self {
            topology,
            config: EngineConfig::default(),
            layout: None,
        }
    }

    /// Build the engine. Rejects an unusable configuration even when the
    /// canonical layout is used.
    pub fn into_engine(self) -> Result<Engine, LayoutError> {
        self.config.validate()?;
        match self.layout {
            Some(layout) => Engine::with_layout(self.topology, self.config, &layout),
            None => Ok(Engine::with_config(self.topology, self.config)),
        }
    }
}

/// Load and validate a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario, DataLoadError> {
    let scenario: Scenario = deserialize_file(path)?;
    check_config(path, &scenario.config)?;
    if let Some(layout) = &scenario.layout {
        layout
            .validate(scenario.topology)
            .map_err(|source| DataLoadError::Layout {
                file: path.to_path_buf(),
                source,
            })?;
    }
    info!(
        "loaded {} scenario from {}",
        scenario.topology,
        path.display()
    );
    Ok(scenario)
}

/// Find `{name}.ron|toml|json` in `dir` and load it.
pub fn load_named_scenario(dir: &Path, name: &str) -> Result<Scenario, DataLoadError> {
    let path = require_data_file(dir, name)?;
    load_scenario(&path)
}

/// Load and validate a standalone engine config file.
pub fn load_config(path: &Path) -> Result<EngineConfig, DataLoadError> {
    let config = deserialize_file(path)?;
    check_config(path, &config)?;
    Ok(config)
}

fn check_config(path: &Path, config: &EngineConfig) -> Result<(), DataLoadError> {
    config.validate().map_err(|source| DataLoadError::Config {
        file: path.to_path_buf(),
        source,
    })
}

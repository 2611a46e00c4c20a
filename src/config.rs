use serde::{Deserialize, Serialize};
use std::{fs::create_dir_all, path::{Path, PathBuf}};
use tracing::debug;
use crate::error::{FilterError, Result};
use crate::node::{DetailLoader, DetailPolicy, DetailSource};
use crate::search::FilterOptions;
use crate::state::TableState;
use crate::tree::DEFAULT_MAX_DEPTH;
use crate::types::{RowIdScheme, TreeSchema};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub schema: TreeSchema,
    pub fields: Vec<String>,
    pub max_depth: usize,
    pub detail_leaf_depth: usize,
    pub max_concurrent_fetches: usize,
    pub row_ids: RowIdScheme,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            schema: TreeSchema::default(),
            fields: vec!["name".into()],
            max_depth: DEFAULT_MAX_DEPTH,
            detail_leaf_depth: 2,
            max_concurrent_fetches: 4,
            row_ids: RowIdScheme::default(),
        }
    }
}

impl FilterConfig {
    pub fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            schema: self.schema.clone(),
            max_depth: self.max_depth,
        }
    }

    pub fn detail_policy(&self) -> DetailPolicy {
        DetailPolicy {
            schema: self.schema.clone(),
            leaf_depth: self.detail_leaf_depth,
        }
    }

    /// Loader over `source` bounded by `max_concurrent_fetches`.
    pub fn detail_loader<S: DetailSource>(&self, source: S) -> DetailLoader<S> {
        DetailLoader::new(source, self.max_concurrent_fetches)
    }

    pub fn table_state(&self, rows: Vec<serde_json::Value>) -> TableState {
        TableState::new(rows, self.detail_policy())
    }

    /// Reads the config at `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path()?)
    }
}

// Per-user config file location
pub fn config_file_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "nested-filter").ok_or(FilterError::ConfigDir)?;
    Ok(dirs.config_dir().join("config.json"))
}

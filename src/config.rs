use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ChainError, ChainResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Public genesis data file (magic, witness counts, signing keys).
    pub genesis_data_file: PathBuf,
    /// Directory holding the per-witness private seed files.
    pub key_dir: PathBuf,
    /// This node's witness slot, if it witnesses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_index: Option<u16>,
    /// Witness rotations of delible history kept in memory below the
    /// indelible tip.
    #[serde(default = "default_trailing_rounds")]
    pub trailing_rounds: u64,
    /// Witness count written when creating genesis data files.
    #[serde(default = "default_genesis_nwitnesses")]
    pub genesis_nwitnesses: u16,
    /// Tolerated malicious witnesses written when creating genesis data
    /// files.
    #[serde(default)]
    pub genesis_maxmal: u16,
}

fn default_trailing_rounds() -> u64 {
    2
}

fn default_genesis_nwitnesses() -> u16 {
    3
}

impl ChainConfig {
    pub fn load(path: &Path) -> ChainResult<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|err| ChainError::Config(format!("unable to parse config: {err}")))
    }

    pub fn save(&self, path: &Path) -> ChainResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let encoded = toml::to_string_pretty(self)
            .map_err(|err| ChainError::Config(format!("unable to encode config: {err}")))?;
        fs::write(path, encoded)?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> ChainResult<()> {
        if let Some(parent) = self.genesis_data_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&self.key_dir)?;
        Ok(())
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            genesis_data_file: PathBuf::from("./data/genesis.dat"),
            key_dir: PathBuf::from("./keys"),
            witness_index: None,
            trailing_rounds: default_trailing_rounds(),
            genesis_nwitnesses: default_genesis_nwitnesses(),
            genesis_maxmal: 0,
        }
    }
}

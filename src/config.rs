use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    addr::AddressCodec,
    error::ConfigError,
    replace::Policy,
    sim::MAX_CORES,
    write::{WriteHit, WriteMiss, WritePolicy},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Associativity {
    #[default]
    DirectMapped,
    FullyAssociative,
    Ways(usize),
}

impl Associativity {
    pub fn ways(&self, size: usize, block_size: usize) -> usize {
        match *self {
            Associativity::DirectMapped => 1,
            Associativity::FullyAssociative => size.checked_div(block_size).unwrap_or(0),
            Associativity::Ways(n) => n,
        }
    }
}

/// One core's L1 data cache. Shared by every core of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub size: usize,
    pub block_size: usize,
    #[serde(default)]
    pub associativity: Associativity,
    #[serde(default)]
    pub write_hit: WriteHit,
    #[serde(default)]
    pub write_miss: WriteMiss,
    #[serde(default)]
    pub replacement: Policy,
    /// Fixed seed for random replacement; the clock is used otherwise.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CacheConfig {
    pub fn codec(&self) -> Result<AddressCodec, ConfigError> {
        AddressCodec::new(
            self.size,
            self.block_size,
            self.associativity.ways(self.size, self.block_size),
        )
    }

    pub fn write_policy(&self) -> Result<WritePolicy, ConfigError> {
        WritePolicy::new(self.write_hit, self.write_miss)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.codec()?;
        self.write_policy()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
    #[serde(default)]
    pub ram: Option<PathBuf>,
    #[serde(default)]
    pub traces: Vec<PathBuf>,
    #[serde(default)]
    pub cores: Option<usize>,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Config::from_json(&json)
    }

    /// Number of simulated cores: explicit, or one per trace.
    pub fn n_cores(&self) -> Result<usize, ConfigError> {
        let cores = self.cores.unwrap_or(self.traces.len());
        if cores == 0 || cores > MAX_CORES {
            return Err(ConfigError::CoreCount {
                requested: cores,
                max: MAX_CORES,
            });
        }
        if cores != self.traces.len() {
            return Err(ConfigError::TraceCount {
                cores,
                traces: self.traces.len(),
            });
        }
        Ok(cores)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        if self.ram.is_none() {
            return Err(ConfigError::Missing("backing store file"));
        }
        self.n_cores()?;
        Ok(())
    }
}

//! Load-phase configuration: data model policy and run settings.

use crate::transport::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("unknown data model: {0}")]
    UnknownDataModel(String),
    #[error("unknown engine: {0}")]
    UnknownEngine(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Layout the target store uses for the loaded data. Selects how many logical
/// metrics one scalar acknowledgement stands for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataModel {
    #[default]
    RedisTimeSeries,
    RedisZsetMetric,
    RedisZsetDevice,
    RedisStream,
}

impl DataModel {
    /// Per-device sorted sets and stream entries pack every cpu metric of a
    /// row into one write, so their scalar reply counts ten metrics.
    pub fn metrics_per_scalar_reply(self) -> u64 {
        match self {
            DataModel::RedisTimeSeries | DataModel::RedisZsetMetric => 1,
            DataModel::RedisZsetDevice | DataModel::RedisStream => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataModel::RedisTimeSeries => "redistimeseries",
            DataModel::RedisZsetMetric => "rediszsetmetric",
            DataModel::RedisZsetDevice => "rediszsetdevice",
            DataModel::RedisStream => "redisstream",
        }
    }
}

pub fn parse_data_model(s: &str) -> Option<DataModel> {
    match s.to_lowercase().as_str() {
        "redistimeseries" => Some(DataModel::RedisTimeSeries),
        "rediszsetmetric" => Some(DataModel::RedisZsetMetric),
        "rediszsetdevice" => Some(DataModel::RedisZsetDevice),
        "redisstream" => Some(DataModel::RedisStream),
        _ => None,
    }
}

impl std::str::FromStr for DataModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_data_model(s).ok_or_else(|| ConfigError::UnknownDataModel(s.to_string()))
    }
}

/// Settings for one load run. Every field has a default so a YAML file only
/// needs the keys it changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    pub engine: Engine,
    /// Engine-specific connect options, e.g. `url`.
    pub connect: BTreeMap<String, String>,
    pub data_model: DataModel,
    pub workers: usize,
    pub batch_size: usize,
    /// Batches allowed in flight between the decoder and the workers.
    /// Defaults to one per worker.
    pub channel_capacity: Option<usize>,
    /// Stop after this many lines.
    pub limit: Option<u64>,
    /// When false, lines are decoded and batched but never sent.
    pub do_load: bool,
    pub snapshot_interval_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            engine: Engine::Redis,
            connect: BTreeMap::new(),
            data_model: DataModel::default(),
            workers: 1,
            batch_size: 10_000,
            channel_capacity: None,
            limit: None,
            do_load: true,
            snapshot_interval_secs: 1,
        }
    }
}

impl LoadConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }
        if self.channel_capacity == Some(0) {
            return Err(ConfigError::Zero("channel_capacity"));
        }
        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::Zero("snapshot_interval_secs"));
        }
        Ok(())
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(self.workers)
    }
}

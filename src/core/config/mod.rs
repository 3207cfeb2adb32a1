//! Engine configuration.
//!
//! Every tunable the pipeline exposes, with the production defaults baked
//! into `Default`. Configs load from YAML; queue capacities are fixed at
//! construction and are not reconfigurable at runtime.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::control::ControlThresholds;
use crate::core::exception::{EventStreamError, EventStreamResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub thresholds: ControlThresholds,

    /// REALTIME ring capacity; must be a power of two.
    pub realtime_capacity: usize,
    pub transactional_capacity: usize,
    pub batch_capacity: usize,
    pub inbox_capacity: usize,

    /// Pre-allocated event slots per ingest thread.
    pub ingest_pool_size: usize,

    pub admin_tick_secs: u64,
    pub batch_window_secs: u64,
    pub realtime_sla_ms: u64,
    pub transactional_max_retries: u32,

    pub dedup_window_ms: u64,
    pub dedup_cleanup_interval_ms: u64,

    /// Optional DLQ spill file.
    pub dlq_spill_path: Option<PathBuf>,
    /// Optional topic table file loaded at startup.
    pub topic_table_path: Option<PathBuf>,
    /// Optional cores for the realtime/transactional/batch workers.
    pub worker_cores: Option<Vec<usize>>,
    /// Optional storage file; `None` runs without persistence.
    pub storage_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ControlThresholds::default(),
            realtime_capacity: 16384,
            transactional_capacity: 131072,
            batch_capacity: 32768,
            inbox_capacity: 65536,
            ingest_pool_size: 1000,
            admin_tick_secs: 10,
            batch_window_secs: 5,
            realtime_sla_ms: 5,
            transactional_max_retries: 3,
            dedup_window_ms: 60 * 60 * 1000,
            dedup_cleanup_interval_ms: 10_000,
            dlq_spill_path: None,
            topic_table_path: None,
            worker_cores: None,
            storage_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_file(path: &Path) -> EventStreamResult<Self> {
        let contents = fs::read_to_string(path)?;
        let config: EngineConfig =
            serde_yaml::from_str(&contents).map_err(|e| EventStreamError::Config {
                message: format!("{}: {e}", path.display()),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EventStreamResult<()> {
        if !self.realtime_capacity.is_power_of_two() || self.realtime_capacity < 2 {
            return Err(EventStreamError::Config {
                message: format!(
                    "realtime_capacity must be a power of two > 1, got {}",
                    self.realtime_capacity
                ),
            });
        }
        if self.transactional_capacity == 0 || self.batch_capacity == 0 {
            return Err(EventStreamError::Config {
                message: "queue capacities must be non-zero".to_string(),
            });
        }
        if self.transactional_max_retries == 0 {
            return Err(EventStreamError::Config {
                message: "transactional_max_retries must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

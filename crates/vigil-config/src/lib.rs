//! Configuration object recognized by the event fabric, stream processor and
//! anomaly pipeline. Construction is purely programmatic — there is no
//! bundled file-format loader or CLI flag parser; wiring this struct up to
//! either is the embedder's job.

mod error;

pub use error::ConfigError;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kernel ring-buffer reader settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EbpfConfig {
    pub enable_syscall_trace: bool,
    pub buffer_pages: usize,
    pub min_latency_ns: u64,
}

impl Default for EbpfConfig {
    fn default() -> Self {
        Self {
            enable_syscall_trace: false,
            buffer_pages: 64,
            min_latency_ns: 0,
        }
    }
}

/// Poll period, in seconds, for each external user-space poller kind.
/// Keyed by poller kind (`"cpu"`, `"memory"`, `"disk"`, `"network"`, `"process"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectorsConfig {
    pub interval_secs: BTreeMap<String, f64>,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        let mut interval_secs = BTreeMap::new();
        for kind in ["cpu", "memory", "disk", "network", "process"] {
            interval_secs.insert(kind.to_string(), 1.0);
        }
        Self { interval_secs }
    }
}

/// Anomaly detection pipeline settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MlConfig {
    pub z_threshold: f64,
    pub detection_interval_secs: f64,
    pub min_samples: usize,
    pub cooldown_secs: f64,
    pub ensemble_threshold: f64,
    pub min_voters: usize,
    pub history_window_size: usize,
    /// How far back, in seconds, the ensemble looks on each tick (capped at
    /// whatever the buffer actually holds). Distinct from `train_window`,
    /// which bounds the isolation/one-class/reconstruction fit by sample
    /// count rather than time.
    pub detection_window_secs: f64,
    pub train_window: usize,
    pub retrain_delta: usize,
    pub enable_reconstruction_model: bool,
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            z_threshold: 3.0,
            detection_interval_secs: 3.0,
            min_samples: 20,
            cooldown_secs: 30.0,
            ensemble_threshold: 0.7,
            min_voters: 2,
            history_window_size: 1000,
            detection_window_secs: 300.0,
            train_window: 100,
            retrain_delta: 20,
            enable_reconstruction_model: false,
        }
    }
}

/// Event bus settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    pub buffer_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { buffer_size: 10_000 }
    }
}

/// Stream processor settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub event_history_size: usize,
    pub cache_capacity: usize,
    pub cache_ttl_secs: f64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            event_history_size: 5000,
            cache_capacity: 10_000,
            cache_ttl_secs: 300.0,
        }
    }
}

/// Aggregate configuration object for the whole platform.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub ebpf: EbpfConfig,
    pub collectors: CollectorsConfig,
    pub ml: MlConfig,
    pub bus: BusConfig,
    pub processor: ProcessorConfig,
}

impl Config {
    /// Validate range constraints. Called explicitly by the embedder at
    /// startup; construction itself never panics or fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.buffer_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "bus.buffer_size",
                reason: "must be at least 1",
            });
        }
        if self.processor.event_history_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "processor.event_history_size",
                reason: "must be at least 1",
            });
        }
        if self.processor.cache_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                field: "processor.cache_capacity",
                reason: "must be at least 1",
            });
        }
        if self.ml.history_window_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "ml.history_window_size",
                reason: "must be at least 1",
            });
        }
        if self.ml.z_threshold <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "ml.z_threshold",
                reason: "must be positive",
            });
        }
        if !(0.0..=1.0).contains(&self.ml.ensemble_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "ml.ensemble_threshold",
                reason: "must be within [0, 1]",
            });
        }
        if self.ml.detection_interval_secs <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "ml.detection_interval_secs",
                reason: "must be positive",
            });
        }
        if self.ml.cooldown_secs < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "ml.cooldown_secs",
                reason: "must be non-negative",
            });
        }
        if self.ml.detection_window_secs <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "ml.detection_window_secs",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

//! Stream processing and anomaly detection for the Vigil observability
//! platform.
//!
//! ```text
//!          +-----------------+        +--------------------+
//! bus ---> | StreamProcessor | -----> | AnomalyPipeline     | ---> bus (ANOMALY)
//!          | (enrich/extract)|        | (ensemble of models)|
//!          +-----------------+        +--------------------+
//! ```
//!
//! The processor and the pipeline are independent long-lived tasks that
//! share a [`StreamProcessor`] instance: the processor owns the per-metric
//! time-series buffers, and the pipeline reads from them on its own
//! detection cadence. Neither subscribes to the other's output event type.

pub mod anomaly_types;
pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod process_cache;
pub mod processor;
pub mod timeseries;

pub use anomaly_types::AnomalyPayload;
pub use error::ModelError;
pub use extract::{extract_metrics, Extracted};
pub use models::{AnomalyModel, Capability, IsolationModel, ModelOutcome, OneClassModel, ReconstructionModel, ZScoreModel};
pub use pipeline::{AnomalyPipeline, PipelineHandle};
pub use process_cache::{ProcTableLookup, ProcessCache, ProcessInfo, ProcessTableLookup};
pub use processor::{spawn as spawn_processor, spawn_with_lookup as spawn_processor_with_lookup, ProcessorHandle, ProcessorMetrics, StreamProcessor};
pub use timeseries::{single_pass_stats, MetricStats, Sample, TimeSeriesBuffer};

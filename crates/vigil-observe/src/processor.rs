use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use vigil_config::ProcessorConfig;
use vigil_fabric::{now_secs, EventBus, EventRecord};
use vigil_types::{EventType, RingBuffer};

use crate::extract::extract_metrics;
use crate::process_cache::{ProcTableLookup, ProcessCache, ProcessTableLookup};
use crate::timeseries::{MetricStats, Sample, TimeSeriesBuffer};

#[derive(Clone, Debug, Default)]
pub struct ProcessorMetrics {
    pub events_processed: u64,
    pub active_metrics: usize,
    pub process_cache_size: usize,
    pub event_history_size: usize,
}

struct State {
    metrics: HashMap<String, TimeSeriesBuffer>,
    history: RingBuffer<EventRecord>,
    process_cache: ProcessCache,
}

/// Subscribes to every event on the bus, enriches, extracts metric samples,
/// appends them to per-key circular buffers, and serves windowed queries.
/// Owns its state exclusively; read queries take a short read-lock rather
/// than a message round trip, since the processor never blocks on them.
pub struct StreamProcessor {
    state: RwLock<State>,
    metric_capacity: usize,
    events_processed: AtomicU64,
    lookup: Arc<dyn ProcessTableLookup>,
}

impl StreamProcessor {
    pub fn new(config: ProcessorConfig, metric_capacity: usize) -> Arc<Self> {
        Self::with_lookup(config, metric_capacity, Arc::new(ProcTableLookup))
    }

    pub fn with_lookup(
        config: ProcessorConfig,
        metric_capacity: usize,
        lookup: Arc<dyn ProcessTableLookup>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(State {
                metrics: HashMap::new(),
                history: RingBuffer::new(config.event_history_size),
                process_cache: ProcessCache::new(config.cache_capacity, config.cache_ttl_secs),
            }),
            metric_capacity,
            events_processed: AtomicU64::new(0),
            lookup,
        })
    }

    /// Enrich, extract, append and record one record. Never raises —
    /// enrichment failures are swallowed and only observable via logs.
    pub async fn ingest(&self, record: EventRecord) {
        let now = record.timestamp;
        let mut resolved = true;
        {
            let mut state = self.state.write().await;
            if let Some(pid) = record.pid {
                let (_info, ok) = state.process_cache.resolve(pid, now, self.lookup.as_ref());
                resolved = ok;
            }
            for item in extract_metrics(&record) {
                state
                    .metrics
                    .entry(item.metric_key)
                    .or_insert_with(|| TimeSeriesBuffer::new(self.metric_capacity))
                    .push(item.sample);
            }
            state.history.push(record);
        }
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        debug!(resolved, "processed record");
    }

    pub async fn query_metric(&self, key: &str, window_seconds: f64) -> Vec<(f64, f64)> {
        let state = self.state.read().await;
        state
            .metrics
            .get(key)
            .map(|b| b.query_window(now_secs(), window_seconds))
            .unwrap_or_default()
    }

    /// Used by the anomaly pipeline: samples with metadata retained,
    /// capped to `window_seconds` (or the whole buffer, whichever is
    /// smaller).
    pub async fn window_samples(&self, key: &str, window_seconds: f64) -> Vec<Sample> {
        let state = self.state.read().await;
        state
            .metrics
            .get(key)
            .map(|b| b.window_samples(now_secs(), window_seconds))
            .unwrap_or_default()
    }

    pub async fn metric_stats(&self, key: &str) -> Option<MetricStats> {
        let state = self.state.read().await;
        state.metrics.get(key).map(|b| b.stats())
    }

    /// The `n` most recent samples for `key`, oldest first, for the anomaly
    /// pipeline's fixed-size training windows.
    pub async fn recent_samples(&self, key: &str, n: usize) -> Vec<Sample> {
        let state = self.state.read().await;
        state.metrics.get(key).map(|b| b.recent(n)).unwrap_or_default()
    }

    pub async fn sample_count(&self, key: &str) -> usize {
        let state = self.state.read().await;
        state.metrics.get(key).map(|b| b.len()).unwrap_or(0)
    }

    pub async fn list_metric_keys(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.metrics.keys().cloned().collect()
    }

    /// Newest-first, optionally filtered to one event type, up to `limit`.
    pub async fn recent_events(&self, event_type_filter: Option<EventType>, limit: usize) -> Vec<EventRecord> {
        let state = self.state.read().await;
        state
            .history
            .iter()
            .rev()
            .filter(|r| event_type_filter.map(|t| r.event_type == t).unwrap_or(true))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn metrics(&self) -> ProcessorMetrics {
        let state = self.state.read().await;
        ProcessorMetrics {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            active_metrics: state.metrics.len(),
            process_cache_size: state.process_cache.len(),
            event_history_size: state.history.len(),
        }
    }
}

pub struct ProcessorHandle {
    task: JoinHandle<()>,
    stop: mpsc::Sender<()>,
}

impl ProcessorHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(()).await;
        let _ = self.task.await;
    }
}

/// Subscribe to the bus (accepting all event types) and run the processor's
/// ingest loop on its own task until `stop` is called or the bus closes.
pub fn spawn(bus: EventBus, config: ProcessorConfig, metric_capacity: usize) -> (Arc<StreamProcessor>, ProcessorHandle) {
    spawn_with_lookup(bus, config, metric_capacity, Arc::new(ProcTableLookup))
}

pub fn spawn_with_lookup(
    bus: EventBus,
    config: ProcessorConfig,
    metric_capacity: usize,
    lookup: Arc<dyn ProcessTableLookup>,
) -> (Arc<StreamProcessor>, ProcessorHandle) {
    let processor = StreamProcessor::with_lookup(config, metric_capacity, lookup);
    let for_task = processor.clone();
    let (stop_tx, mut stop_rx) = mpsc::channel(1);
    let subscription = bus
        .subscribe("stream-processor", vec![])
        .expect("stream processor subscribes exactly once at startup");

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                record = subscription.receive() => {
                    match record {
                        Some(record) => for_task.ingest(record).await,
                        None => break,
                    }
                }
            }
        }
        info!("stream processor stopped");
    });

    (processor, ProcessorHandle { task, stop: stop_tx })
}

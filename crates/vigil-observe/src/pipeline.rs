use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vigil_config::MlConfig;
use vigil_fabric::{now_secs, EventBus, EventRecord};
use vigil_types::EventType;

use crate::anomaly_types::AnomalyPayload;
use crate::models::{AnomalyModel, IsolationModel, ModelOutcome, OneClassModel, ReconstructionModel, ZScoreModel};
use crate::processor::StreamProcessor;
use crate::timeseries::{single_pass_stats, MetricStats, Sample};

/// Per-(metric, method) cooldown state. UNTRACKED has seen no samples yet;
/// TRACKING is accumulating towards `min_samples`; ARMED evaluates every
/// tick; a fire moves it to COOLDOWN until `cooldown_secs` has elapsed,
/// after which it returns to ARMED (not TRACKING — a model that has already
/// learned a baseline does not forget it after a single alert).
#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Untracked,
    Tracking,
    Armed,
    Cooldown { since: f64 },
}

struct MethodState {
    model: Box<dyn AnomalyModel>,
    state: State,
    samples_since_fit: usize,
}

impl MethodState {
    fn new(model: Box<dyn AnomalyModel>) -> Self {
        Self { model, state: State::Untracked, samples_since_fit: 0 }
    }

    /// Advance the state machine one tick and, if ARMED (after any cooldown
    /// has elapsed), fit against `fit_window` when due and score `value`
    /// against `eval_window`. `total_samples` is the key's whole buffer
    /// size, which gates the UNTRACKED/TRACKING → ARMED transition
    /// independent of how much of that buffer falls inside the time window.
    /// Returns `None` when the method did not run this tick at all.
    fn advance(
        &mut self,
        now: f64,
        value: f64,
        eval_window: &[Sample],
        fit_window: &[Sample],
        total_samples: usize,
        min_samples: usize,
        retrain_delta: usize,
        cooldown_secs: f64,
    ) -> Option<ModelOutcome> {
        if self.state == State::Untracked {
            if total_samples == 0 {
                return None;
            }
            self.state = State::Tracking;
        }

        if let State::Cooldown { since } = self.state {
            if now - since >= cooldown_secs {
                self.state = State::Armed;
            } else {
                return None;
            }
        }

        if self.state == State::Tracking {
            if total_samples < min_samples {
                return None;
            }
            if self.model.fit(fit_window).is_err() {
                return None;
            }
            self.samples_since_fit = 0;
            self.state = State::Armed;
        }

        if self.samples_since_fit >= retrain_delta {
            if self.model.fit(fit_window).is_err() {
                return None;
            }
            self.samples_since_fit = 0;
        }
        self.samples_since_fit += 1;

        match self.model.score(value, eval_window) {
            Ok(outcome) => {
                if outcome.fired {
                    self.state = State::Cooldown { since: now };
                }
                Some(outcome)
            }
            Err(err) => {
                warn!(model = self.model.name(), error = %err, "model scoring failed, skipping this tick");
                None
            }
        }
    }
}

fn fresh_models(config: &MlConfig) -> HashMap<&'static str, MethodState> {
    let mut models: HashMap<&'static str, MethodState> = HashMap::new();
    models.insert("zscore", MethodState::new(Box::new(ZScoreModel::new(config.z_threshold))));
    models.insert("isolation", MethodState::new(Box::new(IsolationModel::new())));
    models.insert("one_class", MethodState::new(Box::new(OneClassModel::new())));
    if config.enable_reconstruction_model {
        models.insert("reconstruction", MethodState::new(Box::new(ReconstructionModel::new())));
    }
    models
}

fn z_score_of(value: f64, stats: &MetricStats) -> f64 {
    if stats.std_dev < 1e-9 {
        0.0
    } else {
        (value - stats.mean).abs() / stats.std_dev
    }
}

/// Drives the ensemble of anomaly models over every metric key known to the
/// stream processor, once per detection interval. Never subscribes to
/// `ANOMALY` events itself — it only ever publishes them — so it cannot
/// feed back into its own input.
pub struct AnomalyPipeline {
    processor: Arc<StreamProcessor>,
    config: MlConfig,
    states: HashMap<String, HashMap<&'static str, MethodState>>,
    /// The ensemble aggregate's own cooldown, kept independent of any
    /// individual model's `State::Cooldown` — firing solo doesn't cool the
    /// ensemble down, and the ensemble firing doesn't cool any model down.
    ensemble_cooldown: HashMap<String, f64>,
}

impl AnomalyPipeline {
    pub fn new(processor: Arc<StreamProcessor>, config: MlConfig) -> Self {
        Self { processor, config, states: HashMap::new(), ensemble_cooldown: HashMap::new() }
    }

    /// Run one detection pass over every metric with at least one sample.
    /// Returns the anomalies that should be published this tick: a record
    /// for every model that individually fired, plus (separately) a
    /// `method = "ensemble"` record when the fused vote clears its own
    /// threshold — each under its own independent cooldown.
    pub async fn tick(&mut self, now: f64) -> Vec<AnomalyPayload> {
        let keys = self.processor.list_metric_keys().await;
        let mut fires = Vec::new();

        for key in keys {
            let total_samples = self.processor.sample_count(&key).await;
            if total_samples == 0 {
                continue;
            }
            let eval_window = self.processor.window_samples(&key, now, self.config.detection_window_secs).await;
            let fit_window = self.processor.recent_samples(&key, self.config.train_window).await;
            let Some(latest) = eval_window.last().or_else(|| fit_window.last()) else {
                continue;
            };
            let value = latest.value;

            let metric_states = self.states.entry(key.clone()).or_insert_with(|| fresh_models(&self.config));

            let mut ran: Vec<(&'static str, ModelOutcome)> = Vec::new();
            for (name, method_state) in metric_states.iter_mut() {
                if let Some(outcome) = method_state.advance(
                    now,
                    value,
                    &eval_window,
                    &fit_window,
                    total_samples,
                    self.config.min_samples,
                    self.config.retrain_delta,
                    self.config.cooldown_secs,
                ) {
                    ran.push((name, outcome));
                }
            }

            if ran.is_empty() {
                continue;
            }

            let values: Vec<f64> = eval_window.iter().map(|s| s.value).collect();
            let stats = single_pass_stats(&values);

            // (a) every model that individually fired emits its own record.
            // `advance` already gates this against that model's own
            // per-(metric, method) cooldown — a model cooling down simply
            // doesn't appear in `ran`.
            for (name, outcome) in &ran {
                if !outcome.fired {
                    continue;
                }
                fires.push(AnomalyPayload {
                    metric_key: key.clone(),
                    value,
                    window_size: eval_window.len(),
                    mean: stats.mean,
                    std_dev: stats.std_dev,
                    z_score: (*name == "zscore").then(|| z_score_of(value, &stats)),
                    method: name.to_string(),
                    confidence: outcome.score,
                    contributing_methods: Vec::new(),
                });
            }

            // (b) the ensemble fusion fires independently, under its own
            // cooldown track, regardless of whether any single model fired.
            let voters = ran.iter().filter(|(_, o)| o.fired).count();
            let fused_confidence = ran.iter().map(|(_, o)| o.score).sum::<f64>() / ran.len() as f64;
            let ensemble_ready = match self.ensemble_cooldown.get(&key) {
                Some(&since) => now - since >= self.config.cooldown_secs,
                None => true,
            };
            let ensemble_fires =
                ensemble_ready && (voters >= self.config.min_voters || fused_confidence > self.config.ensemble_threshold);

            if ensemble_fires {
                self.ensemble_cooldown.insert(key.clone(), now);
                let zscore_ran = ran.iter().any(|(name, _)| *name == "zscore");
                fires.push(AnomalyPayload {
                    metric_key: key,
                    value,
                    window_size: eval_window.len(),
                    mean: stats.mean,
                    std_dev: stats.std_dev,
                    z_score: zscore_ran.then(|| z_score_of(value, &stats)),
                    method: "ensemble".to_string(),
                    confidence: fused_confidence,
                    contributing_methods: ran.into_iter().map(|(n, o)| (n.to_string(), o.score)).collect(),
                });
            }
        }

        fires
    }
}

pub struct PipelineHandle {
    task: JoinHandle<()>,
    stop: mpsc::Sender<()>,
}

impl PipelineHandle {
    pub async fn stop(self) {
        let _ = self.stop.send(()).await;
        let _ = self.task.await;
    }
}

/// Run `AnomalyPipeline::tick` on its own task at `detection_interval_secs`
/// cadence, publishing every fire back to the bus as an `ANOMALY` event.
pub fn spawn(processor: Arc<StreamProcessor>, bus: EventBus, config: MlConfig) -> PipelineHandle {
    let (stop_tx, mut stop_rx) = mpsc::channel(1);
    let interval_secs = config.detection_interval_secs;
    let mut pipeline = AnomalyPipeline::new(processor, config);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs_f64(interval_secs));
        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = ticker.tick() => {
                    let fires = pipeline.tick(now_secs()).await;
                    for fire in fires {
                        let record = EventRecord::new(EventType::Anomaly, "ml::anomaly_detector", fire.to_payload());
                        if let Err(err) = bus.publish(record) {
                            warn!(error = %err, "failed to publish anomaly record");
                        }
                    }
                }
            }
        }
        info!("anomaly pipeline stopped");
    });

    PipelineHandle { task, stop: stop_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_config::ProcessorConfig;

    fn samples(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample { timestamp: i as f64, value: v, metadata: None })
            .collect()
    }

    #[tokio::test]
    async fn untracked_method_does_not_score_before_first_sample() {
        let mut state = MethodState::new(Box::new(ZScoreModel::new(3.0)));
        let outcome = state.advance(0.0, 1.0, &[], &[], 0, 20, 20, 30.0);
        assert!(outcome.is_none());
        assert_eq!(state.state, State::Untracked);
    }

    #[tokio::test]
    async fn tracking_does_not_score_until_min_samples_reached() {
        let mut state = MethodState::new(Box::new(ZScoreModel::new(3.0)));
        let window = samples(&[10.0; 5]);
        let outcome = state.advance(0.0, 10.0, &window, &window, 5, 20, 20, 30.0);
        assert!(outcome.is_none());
        assert_eq!(state.state, State::Tracking);
    }

    #[tokio::test]
    async fn armed_fires_and_enters_cooldown_then_rearms_after_elapsed() {
        let mut state = MethodState::new(Box::new(ZScoreModel::new(3.0)));
        let mut window = samples(&[10.0; 25]);
        // reach ARMED
        state.advance(0.0, 10.0, &window, &window, 25, 20, 1000, 30.0);
        assert_eq!(state.state, State::Armed);

        window.push(Sample { timestamp: 25.0, value: 500.0, metadata: None });
        let outcome = state.advance(25.0, 500.0, &window, &window, 26, 20, 1000, 30.0).unwrap();
        assert!(outcome.fired);
        assert!(matches!(state.state, State::Cooldown { .. }));

        let suppressed = state.advance(26.0, 500.0, &window, &window, 26, 20, 1000, 30.0);
        assert!(suppressed.is_none());

        let rearmed = state.advance(60.0, 10.0, &window, &window, 26, 20, 1000, 30.0);
        assert!(rearmed.is_some());
        assert_eq!(state.state, State::Armed);
    }

    #[tokio::test]
    async fn tick_fires_both_per_model_and_ensemble_anomaly_on_sustained_spike() {
        let processor = StreamProcessor::new(ProcessorConfig::default(), 1000);
        let config = MlConfig {
            min_samples: 10,
            train_window: 30,
            detection_window_secs: 1000.0,
            retrain_delta: 1000,
            min_voters: 2,
            ..Default::default()
        };
        let mut pipeline = AnomalyPipeline::new(processor.clone(), config);

        for i in 0..30 {
            let mut payload = std::collections::BTreeMap::new();
            payload.insert("total".to_string(), vigil_types::Value::Float(10.0));
            let record = EventRecord::new(EventType::CpuMetric, "collector::cpu", payload).with_timestamp(i as f64);
            processor.ingest(record).await;
        }
        let fires = pipeline.tick(29.0).await;
        assert!(fires.is_empty());

        let mut payload = std::collections::BTreeMap::new();
        payload.insert("total".to_string(), vigil_types::Value::Float(999.0));
        let spike = EventRecord::new(EventType::CpuMetric, "collector::cpu", payload).with_timestamp(30.0);
        processor.ingest(spike).await;

        // the spike is extreme enough that every model fires individually,
        // so this tick emits one record per model plus the ensemble record.
        let fires = pipeline.tick(30.0).await;
        assert!(fires.iter().all(|f| f.metric_key == "cpu.total"));
        let methods: std::collections::BTreeSet<&str> = fires.iter().map(|f| f.method.as_str()).collect();
        assert!(methods.contains("ensemble"));
        assert!(methods.contains("zscore"));
        let ensemble = fires.iter().find(|f| f.method == "ensemble").unwrap();
        assert_eq!(ensemble.contributing_methods.len(), 3);
        assert!(ensemble.confidence > 0.0);

        let fires_again = pipeline.tick(31.0).await;
        assert!(fires_again.is_empty(), "both per-model and ensemble cooldowns should suppress an immediate re-fire");
    }

    #[tokio::test]
    async fn solo_model_fire_does_not_trigger_ensemble_when_votes_and_confidence_fall_short() {
        let processor = StreamProcessor::new(ProcessorConfig::default(), 1000);
        let config = MlConfig {
            min_samples: 10,
            train_window: 30,
            detection_window_secs: 1000.0,
            retrain_delta: 1000,
            min_voters: 2,
            ensemble_threshold: 0.7,
            ..Default::default()
        };
        let mut pipeline = AnomalyPipeline::new(processor.clone(), config);

        for i in 0..20 {
            let mut payload = std::collections::BTreeMap::new();
            payload.insert("total".to_string(), vigil_types::Value::Float(i as f64));
            let record = EventRecord::new(EventType::CpuMetric, "collector::cpu", payload).with_timestamp(i as f64);
            processor.ingest(record).await;
        }
        let warmup = pipeline.tick(19.0).await;
        assert!(warmup.is_empty());

        let mut payload = std::collections::BTreeMap::new();
        payload.insert("total".to_string(), vigil_types::Value::Float(26.6));
        let record = EventRecord::new(EventType::CpuMetric, "collector::cpu", payload).with_timestamp(20.0);
        processor.ingest(record).await;

        let fires = pipeline.tick(20.0).await;
        assert_eq!(fires.len(), 1, "exactly the solo-firing model's own record should publish");
        assert_eq!(fires[0].method, "isolation");
        assert!(fires.iter().all(|f| f.method != "ensemble"));
    }

    #[tokio::test]
    async fn zscore_fires_once_on_spike_then_cools_down_independent_of_ensemble() {
        let processor = StreamProcessor::new(ProcessorConfig::default(), 1000);
        let config = MlConfig {
            min_samples: 10,
            train_window: 30,
            detection_window_secs: 1000.0,
            retrain_delta: 1000,
            z_threshold: 3.0,
            cooldown_secs: 10.0,
            ..Default::default()
        };
        let mut pipeline = AnomalyPipeline::new(processor.clone(), config);

        for i in 0..20 {
            let mut payload = std::collections::BTreeMap::new();
            payload.insert("total".to_string(), vigil_types::Value::Float(25.0));
            let record = EventRecord::new(EventType::CpuMetric, "collector::cpu", payload).with_timestamp(i as f64);
            processor.ingest(record).await;
        }
        pipeline.tick(19.0).await;

        let mut zscore_fire_timestamps = Vec::new();
        for t in [20.0, 22.0, 24.0] {
            let mut payload = std::collections::BTreeMap::new();
            payload.insert("total".to_string(), vigil_types::Value::Float(95.0));
            let record = EventRecord::new(EventType::CpuMetric, "collector::cpu", payload).with_timestamp(t);
            processor.ingest(record).await;
            let fires = pipeline.tick(t).await;
            if fires.iter().any(|f| f.method == "zscore") {
                zscore_fire_timestamps.push(t);
            }
        }

        assert_eq!(
            zscore_fire_timestamps,
            vec![20.0],
            "only the first spike should produce a zscore anomaly; later ones fall within cooldown"
        );
    }

    #[tokio::test]
    async fn min_samples_zero_evaluates_on_the_first_sample() {
        let processor = StreamProcessor::new(ProcessorConfig::default(), 1000);
        let config = MlConfig {
            min_samples: 0,
            train_window: 30,
            detection_window_secs: 1000.0,
            retrain_delta: 1000,
            ..Default::default()
        };
        let mut pipeline = AnomalyPipeline::new(processor.clone(), config);

        let mut payload = std::collections::BTreeMap::new();
        payload.insert("total".to_string(), vigil_types::Value::Float(10.0));
        let record = EventRecord::new(EventType::CpuMetric, "collector::cpu", payload).with_timestamp(0.0);
        processor.ingest(record).await;

        // must not divide by zero or panic with a single sample and min_samples=0
        let fires = pipeline.tick(0.0).await;
        assert!(fires.is_empty());
    }
}

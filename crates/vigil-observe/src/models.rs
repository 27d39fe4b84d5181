use crate::error::ModelError;
use crate::timeseries::{single_pass_stats, Sample};

/// Whether a model is available to contribute a vote this tick. All models
/// here are self-contained statistical approximations (no external ML
/// library appears anywhere in the dependency stack this crate draws on),
/// so `capability()` only ever reflects configuration, not a missing
/// collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    Available,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelOutcome {
    pub fired: bool,
    pub score: f64,
}

/// One ensemble member. Implementations are free to keep fitted state
/// between calls, but `fit` is always called again once `retrain_delta`
/// new samples have accumulated since the last fit.
pub trait AnomalyModel: Send + Sync {
    fn name(&self) -> &'static str;
    fn capability(&self) -> Capability;
    fn fit(&mut self, window: &[Sample]) -> Result<(), ModelError>;
    fn score(&self, value: f64, window: &[Sample]) -> Result<ModelOutcome, ModelError>;
}

fn values_of(window: &[Sample]) -> Vec<f64> {
    window.iter().map(|s| s.value).collect()
}

/// z = |v - mean| / std_dev. Mandatory, always available, stateless
/// between calls (fit is a no-op — score recomputes from the window it is
/// given every time).
pub struct ZScoreModel {
    threshold: f64,
}

impl ZScoreModel {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl AnomalyModel for ZScoreModel {
    fn name(&self) -> &'static str {
        "zscore"
    }

    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn fit(&mut self, _window: &[Sample]) -> Result<(), ModelError> {
        Ok(())
    }

    fn score(&self, value: f64, window: &[Sample]) -> Result<ModelOutcome, ModelError> {
        let values = values_of(window);
        let stats = single_pass_stats(&values);
        if stats.std_dev < 1e-9 {
            return Ok(ModelOutcome { fired: false, score: 0.0 });
        }
        let z = (value - stats.mean).abs() / stats.std_dev;
        Ok(ModelOutcome {
            fired: z > self.threshold,
            score: (z / (2.0 * self.threshold)).min(1.0),
        })
    }
}

/// Percentile-boundary approximation of isolation-forest scoring: a value
/// outside the window's [p_low, p_high] range, scaled by how far past it,
/// is treated as easy to isolate.
pub struct IsolationModel {
    lower: Vec<f64>,
    fitted: bool,
}

impl IsolationModel {
    pub fn new() -> Self {
        Self { lower: Vec::new(), fitted: false }
    }
}

impl Default for IsolationModel {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

impl AnomalyModel for IsolationModel {
    fn name(&self) -> &'static str {
        "isolation"
    }

    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn fit(&mut self, window: &[Sample]) -> Result<(), ModelError> {
        if window.len() < 8 {
            return Err(ModelError::InsufficientSamples { model: self.name(), have: window.len(), need: 8 });
        }
        let mut values = values_of(window);
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        self.lower = vec![percentile(&values, 0.05), percentile(&values, 0.95)];
        self.fitted = true;
        Ok(())
    }

    fn score(&self, value: f64, _window: &[Sample]) -> Result<ModelOutcome, ModelError> {
        if !self.fitted {
            return Err(ModelError::NotFitted { model: self.name() });
        }
        let (p05, p95) = (self.lower[0], self.lower[1]);
        let span = (p95 - p05).max(1e-9);
        let distance = if value < p05 {
            p05 - value
        } else if value > p95 {
            value - p95
        } else {
            0.0
        };
        let score = (distance / span).min(1.0);
        Ok(ModelOutcome { fired: score > 0.5, score })
    }
}

/// Boundary distance from the window's centroid in standard-deviation
/// units, the one-class-SVM stand-in: a single learned radius rather than
/// the z-score model's symmetric threshold, so the two disagree on
/// asymmetric distributions.
pub struct OneClassModel {
    center: f64,
    radius: f64,
    fitted: bool,
}

impl OneClassModel {
    pub fn new() -> Self {
        Self { center: 0.0, radius: 0.0, fitted: false }
    }
}

impl Default for OneClassModel {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyModel for OneClassModel {
    fn name(&self) -> &'static str {
        "one_class"
    }

    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn fit(&mut self, window: &[Sample]) -> Result<(), ModelError> {
        if window.len() < 8 {
            return Err(ModelError::InsufficientSamples { model: self.name(), have: window.len(), need: 8 });
        }
        let values = values_of(window);
        let stats = single_pass_stats(&values);
        self.center = stats.mean;
        self.radius = (stats.max - stats.min).max(stats.std_dev * 3.0).max(1e-9);
        self.fitted = true;
        Ok(())
    }

    fn score(&self, value: f64, _window: &[Sample]) -> Result<ModelOutcome, ModelError> {
        if !self.fitted {
            return Err(ModelError::NotFitted { model: self.name() });
        }
        let distance = (value - self.center).abs();
        let score = (distance / self.radius).min(1.0);
        Ok(ModelOutcome { fired: distance > self.radius, score })
    }
}

/// Moving-average reconstruction error: predicts the next value as the
/// trailing mean and scores by the residual relative to the window's
/// std_dev. Optional — gated behind `MlConfig.enable_reconstruction_model`
/// by the pipeline, not by this type itself.
pub struct ReconstructionModel {
    fitted_mean: f64,
    fitted_std: f64,
    fitted: bool,
}

impl ReconstructionModel {
    pub fn new() -> Self {
        Self { fitted_mean: 0.0, fitted_std: 0.0, fitted: false }
    }
}

impl Default for ReconstructionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyModel for ReconstructionModel {
    fn name(&self) -> &'static str {
        "reconstruction"
    }

    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn fit(&mut self, window: &[Sample]) -> Result<(), ModelError> {
        if window.len() < 8 {
            return Err(ModelError::InsufficientSamples { model: self.name(), have: window.len(), need: 8 });
        }
        let values = values_of(window);
        let stats = single_pass_stats(&values);
        self.fitted_mean = stats.mean;
        self.fitted_std = stats.std_dev.max(1e-9);
        self.fitted = true;
        Ok(())
    }

    fn score(&self, value: f64, _window: &[Sample]) -> Result<ModelOutcome, ModelError> {
        if !self.fitted {
            return Err(ModelError::NotFitted { model: self.name() });
        }
        let residual = (value - self.fitted_mean).abs();
        let score = (residual / (3.0 * self.fitted_std)).min(1.0);
        Ok(ModelOutcome { fired: score > 0.66, score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample { timestamp: i as f64, value: v, metadata: None })
            .collect()
    }

    #[test]
    fn zscore_fires_on_clear_outlier() {
        let model = ZScoreModel::new(3.0);
        let window = samples(&[10.0, 10.2, 9.8, 10.1, 9.9, 10.0, 10.0, 9.9]);
        let outcome = model.score(200.0, &window).unwrap();
        assert!(outcome.fired);
    }

    #[test]
    fn zscore_silent_on_zero_variance_window() {
        let model = ZScoreModel::new(3.0);
        let window = samples(&[5.0; 10]);
        let outcome = model.score(5.0, &window).unwrap();
        assert!(!outcome.fired);
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn isolation_requires_fit_before_score() {
        let model = IsolationModel::new();
        let window = samples(&[1.0; 10]);
        assert!(matches!(model.score(1.0, &window), Err(ModelError::NotFitted { .. })));
    }

    #[test]
    fn isolation_fit_needs_minimum_samples() {
        let mut model = IsolationModel::new();
        let window = samples(&[1.0, 2.0]);
        assert!(matches!(model.fit(&window), Err(ModelError::InsufficientSamples { .. })));
    }

    #[test]
    fn isolation_fires_outside_learned_percentile_band() {
        let mut model = IsolationModel::new();
        let window = samples(&[10.0, 10.1, 9.9, 10.0, 9.8, 10.2, 10.0, 9.9, 10.1, 10.0]);
        model.fit(&window).unwrap();
        let outcome = model.score(500.0, &window).unwrap();
        assert!(outcome.fired);
    }

    #[test]
    fn one_class_boundary_uses_learned_radius() {
        let mut model = OneClassModel::new();
        let window = samples(&[10.0, 10.1, 9.9, 10.0, 9.8, 10.2, 10.0, 9.9]);
        model.fit(&window).unwrap();
        let near = model.score(10.0, &window).unwrap();
        let far = model.score(1000.0, &window).unwrap();
        assert!(!near.fired);
        assert!(far.fired);
    }

    #[test]
    fn reconstruction_scores_by_residual_over_std_dev() {
        let mut model = ReconstructionModel::new();
        let window = samples(&[10.0, 10.1, 9.9, 10.0, 9.8, 10.2, 10.0, 9.9]);
        model.fit(&window).unwrap();
        let outcome = model.score(10.0, &window).unwrap();
        assert!(!outcome.fired);
        let outcome = model.score(1000.0, &window).unwrap();
        assert!(outcome.fired);
    }
}

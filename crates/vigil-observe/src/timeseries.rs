use vigil_types::{Payload, RingBuffer};

/// One scalar observation appended to a metric's buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
    pub metadata: Option<Payload>,
}

/// Summary statistics computed on-demand over a buffer's entire contents,
/// by a single pass — no running sums, so eviction never needs to
/// correct accumulated state.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct MetricStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub latest: f64,
}

/// Fixed-capacity circular buffer of samples for one metric key. Physically
/// indexed; oldest sample evicted on overflow. Samples are allowed to be
/// slightly out of order (a late arrival is accepted, not rejected) —
/// queries treat the buffer as a set filtered by timestamp, not a sorted
/// sequence.
#[derive(Debug)]
pub struct TimeSeriesBuffer {
    samples: RingBuffer<Sample>,
}

impl TimeSeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The `n` most recent samples, oldest first. Used by the anomaly
    /// pipeline to fit models over a fixed sample count rather than a time
    /// window, since burst traffic and idle periods should train over the
    /// same amount of data either way.
    pub fn recent(&self, n: usize) -> Vec<Sample> {
        let len = self.samples.len();
        let skip = len.saturating_sub(n);
        self.samples.iter().skip(skip).cloned().collect()
    }

    /// Every sample `s` with `now - window_seconds <= s.timestamp <= now`.
    pub fn query_window(&self, now: f64, window_seconds: f64) -> Vec<(f64, f64)> {
        let floor = now - window_seconds;
        self.samples
            .iter()
            .filter(|s| s.timestamp >= floor && s.timestamp <= now)
            .map(|s| (s.timestamp, s.value))
            .collect()
    }

    /// The `Sample`s within the window, retaining metadata — used by the
    /// anomaly pipeline, which needs values, not just (timestamp, value)
    /// pairs.
    pub fn window_samples(&self, now: f64, window_seconds: f64) -> Vec<Sample> {
        let floor = now - window_seconds;
        self.samples
            .iter()
            .filter(|s| s.timestamp >= floor && s.timestamp <= now)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> MetricStats {
        let values: Vec<f64> = self.samples.iter().map(|s| s.value).collect();
        single_pass_stats(&values)
    }
}

/// Single-pass mean/variance/min/max over an arbitrary slice of values.
/// `std_dev` is reported as 0 when fewer than two values are present.
pub fn single_pass_stats(values: &[f64]) -> MetricStats {
    if values.is_empty() {
        return MetricStats::default();
    }
    let count = values.len();
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    let mean = sum / count as f64;
    let std_dev = if count < 2 {
        0.0
    } else {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        variance.sqrt()
    };
    MetricStats {
        count,
        min,
        max,
        mean,
        std_dev,
        latest: values[count - 1],
    }
}

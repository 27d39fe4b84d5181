use std::collections::BTreeMap;

use vigil_types::{Payload, Value};

/// The payload embedded in an `ANOMALY` event record, per the fixed shape
/// every anomaly, regardless of which model(s) voted, is published with.
#[derive(Clone, Debug, PartialEq)]
pub struct AnomalyPayload {
    pub metric_key: String,
    pub value: f64,
    pub window_size: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub z_score: Option<f64>,
    pub method: String,
    pub confidence: f64,
    pub contributing_methods: Vec<(String, f64)>,
}

impl AnomalyPayload {
    pub fn to_payload(&self) -> Payload {
        let mut m = BTreeMap::new();
        m.insert("metric_key".into(), Value::Str(self.metric_key.clone()));
        m.insert("value".into(), Value::Float(self.value));
        m.insert("window_size".into(), Value::Int(self.window_size as i64));
        m.insert("mean".into(), Value::Float(self.mean));
        m.insert("std_dev".into(), Value::Float(self.std_dev));
        if let Some(z) = self.z_score {
            m.insert("z_score".into(), Value::Float(z));
        }
        m.insert("method".into(), Value::Str(self.method.clone()));
        m.insert("confidence".into(), Value::Float(self.confidence));
        let contributing: Vec<Value> = self
            .contributing_methods
            .iter()
            .map(|(name, score)| {
                let mut entry = BTreeMap::new();
                entry.insert("method".to_string(), Value::Str(name.clone()));
                entry.insert("score".to_string(), Value::Float(*score));
                Value::Map(entry)
            })
            .collect();
        m.insert("contributing_methods".into(), Value::Array(contributing));
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_payload_round_trips_through_json() {
        let payload = AnomalyPayload {
            metric_key: "cpu.total".to_string(),
            value: 99.5,
            window_size: 50,
            mean: 10.0,
            std_dev: 2.0,
            z_score: Some(4.5),
            method: "ensemble".to_string(),
            confidence: 0.82,
            contributing_methods: vec![("zscore".to_string(), 0.9), ("isolation".to_string(), 0.7)],
        };
        let value = payload.to_payload();
        let json = serde_json::to_string(&value).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("metric_key").unwrap().as_str(), Some("cpu.total"));
        assert_eq!(back.get("confidence").unwrap().as_f64(), Some(0.82));
    }

    #[test]
    fn z_score_omitted_when_model_does_not_report_one() {
        let payload = AnomalyPayload {
            metric_key: "disk.sda.write_bytes_delta".to_string(),
            value: 5.0,
            window_size: 20,
            mean: 1.0,
            std_dev: 0.5,
            z_score: None,
            method: "isolation".to_string(),
            confidence: 0.6,
            contributing_methods: vec![("isolation".to_string(), 0.6)],
        };
        assert!(!payload.to_payload().contains_key("z_score"));
    }
}

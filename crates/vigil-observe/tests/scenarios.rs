use std::collections::BTreeMap;
use std::time::Duration;

use vigil_config::{BusConfig, MlConfig, ProcessorConfig};
use vigil_fabric::EventBus;
use vigil_observe::{pipeline, processor};
use vigil_types::{EventType, Value};

fn cpu_record(total: f64, ts: f64) -> vigil_fabric::EventRecord {
    let mut payload = BTreeMap::new();
    payload.insert("total".to_string(), Value::Float(total));
    vigil_fabric::EventRecord::new(EventType::CpuMetric, "collector::cpu", payload).with_timestamp(ts)
}

/// End-to-end: kernel/poller publishes, the stream processor ingests and
/// windows it, the anomaly pipeline reads the processor's buffers and
/// republishes an ANOMALY event that an external subscriber observes.
#[tokio::test]
async fn sustained_spike_flows_from_bus_through_processor_and_pipeline_back_to_bus() {
    let bus = EventBus::new(&BusConfig { buffer_size: 1000 });
    let (stream_processor, processor_handle) = processor::spawn(bus.clone(), ProcessorConfig::default(), 1000);

    let ml_config = MlConfig {
        min_samples: 10,
        train_window: 30,
        detection_window_secs: 1000.0,
        retrain_delta: 1000,
        detection_interval_secs: 1000.0, // we drive ticks manually below
        min_voters: 2,
        ..Default::default()
    };

    let external = bus.subscribe("external-subscriber", vec![EventType::Anomaly]).unwrap();

    for i in 0..30 {
        bus.publish(cpu_record(10.0, i as f64)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    bus.publish(cpu_record(999.0, 30.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut anomaly_pipeline = pipeline::AnomalyPipeline::new(stream_processor.clone(), ml_config);
    let fires = anomaly_pipeline.tick(30.0).await;
    // the spike is extreme enough that every model fires individually, so
    // this tick emits one record per model plus a separate ensemble record.
    assert!(fires.len() > 1);
    assert!(fires.iter().any(|f| f.method == "ensemble"));

    for fire in fires {
        let record = vigil_fabric::EventRecord::new(EventType::Anomaly, "ml::anomaly_detector", fire.to_payload());
        bus.publish(record).unwrap();
    }

    for _ in 0..2 {
        let received = tokio::time::timeout(Duration::from_millis(200), external.receive())
            .await
            .expect("anomaly should arrive before the timeout")
            .expect("subscription should not be closed");
        assert_eq!(received.event_type, EventType::Anomaly);
        assert_eq!(received.get("metric_key").and_then(Value::as_str), Some("cpu.total"));
    }

    processor_handle.stop().await;
}

/// A subscriber to CPU_METRIC only never observes the ANOMALY record, even
/// though both were published on the same bus.
#[tokio::test]
async fn filtered_subscriber_does_not_see_anomaly_events() {
    let bus = EventBus::new(&BusConfig { buffer_size: 100 });
    let cpu_only = bus.subscribe("cpu-only", vec![EventType::CpuMetric]).unwrap();

    bus.publish(cpu_record(1.0, 0.0)).unwrap();
    let mut payload = BTreeMap::new();
    payload.insert("metric_key".to_string(), Value::Str("cpu.total".to_string()));
    bus.publish(vigil_fabric::EventRecord::new(EventType::Anomaly, "ml::anomaly_detector", payload)).unwrap();

    let first = tokio::time::timeout(Duration::from_millis(100), cpu_only.receive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.event_type, EventType::CpuMetric);

    // nothing else should show up within a short window
    let second = tokio::time::timeout(Duration::from_millis(50), cpu_only.receive()).await;
    assert!(second.is_err(), "no further (filtered-out) record should be delivered");
}

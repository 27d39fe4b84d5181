use std::collections::BTreeMap;

use vigil_config::BusConfig;
use vigil_fabric::EventBus;
use vigil_types::EventType;

fn cpu_record(seq: i64) -> vigil_fabric::EventRecord {
    let mut payload = BTreeMap::new();
    payload.insert("seq".to_string(), vigil_types::Value::Int(seq));
    vigil_fabric::EventRecord::new(EventType::CpuMetric, "collector::cpu", payload)
}

/// Throughput and no drops under normal load: a subscriber with capacity
/// matching the publish volume observes everything, in order, with zero
/// drops.
#[tokio::test]
async fn no_drops_when_capacity_covers_volume() {
    let bus = EventBus::new(&BusConfig { buffer_size: 10_000 });
    let handle = bus.subscribe("sub", vec![EventType::CpuMetric]).unwrap();

    for seq in 0..10_000 {
        bus.publish(cpu_record(seq)).unwrap();
    }

    let metrics = bus.metrics();
    assert_eq!(metrics.total_published, 10_000);
    assert_eq!(metrics.total_dropped, 0);

    for expected in 0..10_000 {
        let record = handle.receive().await.unwrap();
        let seq = record.get("seq").unwrap().as_i64().unwrap();
        assert_eq!(seq, expected);
    }
}

/// Drop-oldest under a slow consumer: a full queue keeps exactly the
/// most recent `capacity` records and counts the rest as dropped.
#[tokio::test]
async fn drop_oldest_under_slow_consumer() {
    let bus = EventBus::new(&BusConfig { buffer_size: 100 });
    let handle = bus.subscribe("slow", vec![EventType::CpuMetric]).unwrap();

    for seq in 0..1000 {
        bus.publish(cpu_record(seq)).unwrap();
    }

    let metrics = bus.metrics();
    assert_eq!(metrics.per_subscriber_dropped[&"slow".into()], 900);

    let mut seen = Vec::new();
    while let Ok(Some(record)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), handle.receive()).await
    {
        seen.push(record.get("seq").unwrap().as_i64().unwrap());
    }
    assert_eq!(seen.len(), 100);
    assert_eq!(seen, (900..1000).collect::<Vec<_>>());
}

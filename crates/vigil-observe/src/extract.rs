use std::collections::BTreeMap;

use vigil_fabric::EventRecord;
use vigil_types::{EventType, Payload, Value};

use crate::timeseries::Sample;

/// One metric sample extracted from a single Event Record.
pub struct Extracted {
    pub metric_key: String,
    pub sample: Sample,
}

fn meta(pairs: &[(&str, &str)]) -> Option<Payload> {
    if pairs.is_empty() {
        return None;
    }
    let mut m = BTreeMap::new();
    for (k, v) in pairs {
        m.insert((*k).to_string(), Value::Str((*v).to_string()));
    }
    Some(m)
}

fn push(out: &mut Vec<Extracted>, key: String, value: f64, timestamp: f64, metadata: Option<Payload>) {
    out.push(Extracted {
        metric_key: key,
        sample: Sample { timestamp, value, metadata },
    });
}

/// Extract zero or more `(metric_key, value, metadata)` samples from a
/// record's payload, per the fixed mapping keyed by `event_type`. Unknown
/// event types extract nothing.
pub fn extract_metrics(record: &EventRecord) -> Vec<Extracted> {
    let ts = record.timestamp;
    let mut out = Vec::new();

    match record.event_type {
        EventType::CpuMetric => {
            if let Some(total) = record.get("total").and_then(Value::as_f64) {
                push(&mut out, "cpu.total".to_string(), total, ts, None);
            }
            if let Some(cores) = record.get("cores").and_then(Value::as_array) {
                for (idx, core) in cores.iter().enumerate() {
                    if let Some(v) = core.as_f64() {
                        push(&mut out, format!("cpu.{idx}"), v, ts, None);
                    }
                }
            }
            if let Some(freq) = record.get("freq_mhz").and_then(Value::as_f64) {
                push(&mut out, "cpu.freq_mhz".to_string(), freq, ts, None);
            }
        }
        EventType::MemoryMetric => {
            for field in ["virtual", "virtual_percent", "swap", "swap_percent"] {
                if let Some(v) = record.get(field).and_then(Value::as_f64) {
                    push(&mut out, format!("memory.{field}"), v, ts, None);
                }
            }
        }
        EventType::DiskMetric => {
            if let Some(devices) = record.get("devices").and_then(Value::as_map) {
                for (device, stats) in devices {
                    let Some(stats) = stats.as_map() else { continue };
                    for field in ["read_bytes_delta", "write_bytes_delta", "read_ops_delta", "write_ops_delta"] {
                        if let Some(v) = stats.get(field).and_then(Value::as_f64) {
                            push(
                                &mut out,
                                format!("disk.{device}.{field}"),
                                v,
                                ts,
                                meta(&[("device", device)]),
                            );
                        }
                    }
                }
            }
        }
        EventType::NetworkMetric => {
            if let Some(interfaces) = record.get("interfaces").and_then(Value::as_map) {
                for (iface, stats) in interfaces {
                    let Some(stats) = stats.as_map() else { continue };
                    for field in ["rx_bytes_delta", "tx_bytes_delta", "errors_delta", "drops_delta"] {
                        if let Some(v) = stats.get(field).and_then(Value::as_f64) {
                            push(
                                &mut out,
                                format!("net.{iface}.{field}"),
                                v,
                                ts,
                                meta(&[("iface", iface)]),
                            );
                        }
                    }
                }
            }
        }
        EventType::ProcessMetric => {
            if let Some(processes) = record.get("processes").and_then(Value::as_array) {
                for proc in processes {
                    let Some(proc) = proc.as_map() else { continue };
                    let Some(pid) = proc.get("pid").and_then(Value::as_i64) else { continue };
                    for field in ["cpu_percent", "rss"] {
                        if let Some(v) = proc.get(field).and_then(Value::as_f64) {
                            push(
                                &mut out,
                                format!("proc.{pid}.{field}"),
                                v,
                                ts,
                                meta(&[("pid", &pid.to_string())]),
                            );
                        }
                    }
                }
            }
        }
        EventType::Syscall | EventType::Anomaly | EventType::Trend => {}
    }

    out
}

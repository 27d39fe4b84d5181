use serde::{Deserialize, Serialize};

/// Classification of an Event Record. `event_type` drives both bus filter
/// routing and the stream processor's metric-extraction mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Syscall,
    CpuMetric,
    MemoryMetric,
    DiskMetric,
    NetworkMetric,
    ProcessMetric,
    Anomaly,
    Trend,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Syscall => "SYSCALL",
            EventType::CpuMetric => "CPU_METRIC",
            EventType::MemoryMetric => "MEMORY_METRIC",
            EventType::DiskMetric => "DISK_METRIC",
            EventType::NetworkMetric => "NETWORK_METRIC",
            EventType::ProcessMetric => "PROCESS_METRIC",
            EventType::Anomaly => "ANOMALY",
            EventType::Trend => "TREND",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(EventType::CpuMetric.as_str(), "CPU_METRIC");
        assert_eq!(format!("{}", EventType::Anomaly), "ANOMALY");
    }
}

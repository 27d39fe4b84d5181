use vigil_types::{EventId, EventType, Payload, Value};

use crate::error::BusError;

/// The universal streaming unit. Immutable once constructed; subscribers
/// each receive their own clone.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub event_id: EventId,
    pub event_type: EventType,
    /// Seconds since epoch, sub-second precision. Wall-clock, never monotonic.
    pub timestamp: f64,
    pub source: String,
    pub pid: Option<u32>,
    pub comm: Option<String>,
    pub payload: Payload,
}

impl EventRecord {
    pub fn new(event_type: EventType, source: impl Into<String>, payload: Payload) -> Self {
        Self {
            event_id: EventId::new(),
            event_type,
            timestamp: now_secs(),
            source: source.into(),
            pid: None,
            comm: None,
            payload,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_comm(mut self, comm: impl Into<String>) -> Self {
        self.comm = Some(comm.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// A record is malformed if it is missing the fields the bus requires
    /// to route and the processor requires to enrich/extract. `publish`
    /// rejects a malformed record outright rather than delivering it
    /// partially.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.source.trim().is_empty() {
            return Err(BusError::MalformedRecord("source must not be empty".into()));
        }
        if !self.timestamp.is_finite() || self.timestamp < 0.0 {
            return Err(BusError::MalformedRecord(format!(
                "timestamp {} is not a valid epoch seconds value",
                self.timestamp
            )));
        }
        Ok(())
    }
}

pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

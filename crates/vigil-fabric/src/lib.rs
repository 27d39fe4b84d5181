//! Event fabric: the in-process pub/sub broker plus the kernel ring-buffer
//! reader.
//!
//! ```text
//! kernel probe ─┐
//!               ├─▶ EventBus ──▶ subscriber queue (drop-oldest) ──▶ receive()
//! pollers ──────┘
//! ```
//!
//! `EventBus::publish` never awaits; backpressure is handled per-subscriber
//! by evicting the oldest queued record rather than blocking the producer.

pub mod bus;
pub mod error;
pub mod kernel;
pub mod record;

pub use bus::{BusMetrics, EventBus, SubscriptionHandle};
pub use error::{BusError, RecordDecodeError};
pub use kernel::{
    decode_record, decoded_to_record, syscall_name, DecodedSyscall, KernelReaderHandle,
    RawRecordSource, ReaderMetrics, RECORD_LEN,
};
pub use record::{now_secs, EventRecord};

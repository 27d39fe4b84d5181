use thiserror::Error;

use vigil_types::SubscriberId;

/// Errors raised by the event bus itself.
#[derive(Debug, Error, PartialEq)]
pub enum BusError {
    #[error("subscriber `{0}` is already registered")]
    SubscriberConflict(SubscriberId),

    #[error("record rejected: {0}")]
    MalformedRecord(String),

    #[error("bus is shutting down")]
    Closed,

    #[error("subscriber queue capacity must be at least 1")]
    ZeroCapacity,
}

/// Errors raised while decoding a kernel ring-buffer record. Always logged
/// and counted by the reader; never propagated past the feed loop.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RecordDecodeError {
    #[error("record is {actual} bytes, expected exactly {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("comm field is not valid UTF-8 once NUL-trimmed")]
    InvalidComm,
}

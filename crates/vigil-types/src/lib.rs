//! Shared value and identifier types for the Vigil observability platform.
//!
//! This crate carries no business logic, only the types every other Vigil
//! crate builds on: the tagged payload value, event-type enum and strong
//! identifiers.

pub mod event_type;
pub mod ids;
pub mod ring;
pub mod value;

pub use event_type::EventType;
pub use ids::{EventId, SubscriberId};
pub use ring::RingBuffer;
pub use value::{Payload, Value};

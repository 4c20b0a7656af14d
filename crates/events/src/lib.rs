//! Domain events and their distribution.
//!
//! Aggregates emit typed events; infrastructure wraps them in an
//! [`EventEnvelope`] (JSON payload + stream metadata) after the aggregate
//! snapshot is saved, and publishes the envelope on an [`EventBus`].

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EnvelopeError, EventEnvelope};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

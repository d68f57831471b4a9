//! Enqueue events for the relay to consume. Check out [`EventPublisher`] as a starting point.
//!
//! The relay itself never publishes: this is the producer side, used by upstream services and by
//! our integration tests.
mod publisher;

pub use publisher::{EventPublisher, EventPublisherBuilder, PublisherError};

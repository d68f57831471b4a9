//! Relay messages from broker queues to a processing collaborator. Check out [`QueueRelay`] as a
//! starting point.
//!
//! # Delivery semantics
//!
//! A message is acknowledged (completed) only after its handler succeeded. When decoding or
//! processing fails, the message is abandoned back to the broker and the failure is reported to
//! the [`ErrorSink`]. The relay keeps no retry counters and applies no backoff: redelivery and
//! dead-lettering are broker concerns (see [`hooks`] to configure them on RabbitMq).
//!
//! A queue receiver that fails is reported to the [`ErrorSink`] too, then reopened.

pub use amqp::AmqpTransport;
pub use binding::QueueBinding;
pub use error::{MessageError, RelayError};
pub use handler::{EmailDispatch, Handler, Incoming};
pub use message::{Acknowledger, DeliveryMetadata, InboundMessage};
pub use pre_start_hook::ConsumerPreStartHook;
pub use queue_relay::{QueueRelay, QueueRelayBuilder};
pub use sink::{ErrorReport, ErrorSink, TracingErrorSink};
pub use transport::{Receiver, Transport};

mod amqp;
mod binding;
mod consumer;
mod error;
mod handler;
pub mod hooks;
mod message;
mod pre_start_hook;
mod queue_relay;
mod sink;
mod transport;

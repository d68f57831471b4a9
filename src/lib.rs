//! `email-relay` moves events from RabbitMQ queues to an email-processing service, built on top
//! of [`lapin`].
//!
//! Each configured queue is bound to a payload schema and a handler. Messages are decoded into
//! typed events, handed to the processing collaborator and acknowledged only once the
//! collaborator succeeds: delivery is at-least-once, redelivery is left to the broker.
//!
//! [`QueueRelay`](crate::relay::QueueRelay) is the best starting point to learn more about
//! what `email-relay` provides.

pub mod events;
pub mod processor;
pub mod publishers;
pub mod relay;
pub mod settings;

pub mod amqp;
pub mod pool;

//! Connection plumbing for the RabbitMq broker the relay consumes from.
//!
//! [`ConnectionFactory`] turns [`BrokerSettings`](configuration::BrokerSettings) into live
//! `lapin` connections, [`convenience`] has the header helpers used to read delivery metadata.

pub mod configuration;
pub mod convenience;
mod factory;

pub use factory::ConnectionFactory;
pub use lapin::{options, types, BasicProperties, Channel};

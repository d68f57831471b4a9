//! Broker connection and channel management.
//!
//! A process talks to the broker over a single [`SharedConnection`]. It is opened lazily, reopened
//! by the first channel request after it broke, and closing it never opens a new one.
//!
//! Publishers check channels out of a [`ChannelPool`] ([`deadpool`]) built on top of the shared
//! connection. Consumers open their own channels straight from the [`SharedConnection`]: a
//! consuming channel lives as long as its receiver and is never handed back.
//!
//! ```rust
//! use email_relay::amqp::configuration::BrokerSettings;
//! use email_relay::amqp::ConnectionFactory;
//! use email_relay::pool::{ChannelManager, ChannelPool, SharedConnection};
//! use std::sync::Arc;
//!
//! fn publisher_channels() -> anyhow::Result<(Arc<SharedConnection>, ChannelPool)> {
//!     let factory = ConnectionFactory::new_from_config(&BrokerSettings::default())?;
//!     let connection = Arc::new(SharedConnection::new(factory));
//!
//!     let channels = ChannelPool::builder(ChannelManager::new(connection.clone()))
//!         .max_size(8)
//!         .build()?;
//!     Ok((connection, channels))
//! }
//! ```

mod channel;
mod connection;
mod error;

pub use channel::{ChannelManager, ChannelPool};
pub use connection::SharedConnection;
pub use error::Error;

use crate::events::{CartEvent, UserRegisteredEvent};
use crate::pool::ChannelPool;
use anyhow::Context;
use lapin::message::BasicReturnMessage;
use lapin::options::BasicPublishOptions;
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

/// Publishes events as persistent JSON messages, straight to a queue.
///
/// Messages go through the default exchange, with the queue name as routing key. Each message
/// gets a `message_id` and a `timestamp` if the caller did not set them.
///
/// # Fault tolerance
///
/// Channels come from a [`ChannelPool`]: broken channels are replaced on the next publish, and
/// so is the connection under them.
///
/// ```rust
/// use email_relay::amqp::configuration::BrokerSettings;
/// use email_relay::amqp::ConnectionFactory;
/// use email_relay::pool::{ChannelManager, ChannelPool, SharedConnection};
/// use email_relay::publishers::EventPublisher;
/// use std::sync::Arc;
///
/// pub fn get_publisher() -> anyhow::Result<EventPublisher> {
///     let connection_factory = ConnectionFactory::new_from_config(&BrokerSettings::default())?;
///     let connection = Arc::new(SharedConnection::new(connection_factory));
///     let channel_pool = ChannelPool::builder(ChannelManager::new(connection))
///         .max_size(10)
///         .build()?;
///
///     Ok(EventPublisher::builder(channel_pool)
///         .publish_timeout(std::time::Duration::from_secs(3))
///         .build())
/// }
/// ```
pub struct EventPublisher {
    channel_pool: ChannelPool,
    timeout: Duration,
}

impl EventPublisher {
    pub fn builder(channel_pool: ChannelPool) -> EventPublisherBuilder {
        EventPublisherBuilder {
            channel_pool,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Enqueue a cart checkout on `queue_name`.
    pub async fn publish_cart_event(
        &self,
        queue_name: &str,
        event: &CartEvent,
    ) -> Result<(), PublisherError> {
        self.publish_json(queue_name, event, BasicProperties::default())
            .await
    }

    /// Enqueue a user registration on `queue_name`.
    pub async fn publish_user_registered(
        &self,
        queue_name: &str,
        email: &str,
    ) -> Result<(), PublisherError> {
        let event = UserRegisteredEvent(email.to_owned());
        self.publish_json(queue_name, &event, BasicProperties::default())
            .await
    }

    /// Serialize `payload` as JSON and enqueue it on `queue_name`.
    pub async fn publish_json<T: Serialize + ?Sized>(
        &self,
        queue_name: &str,
        payload: &T,
        properties: BasicProperties,
    ) -> Result<(), PublisherError> {
        let payload = serde_json::to_vec(payload).map_err(PublisherError::Serialization)?;
        let properties = properties.with_content_type("application/json".into());
        self.publish(queue_name, &payload, properties).await
    }

    /// Enqueue raw bytes on `queue_name`.
    ///
    /// The message is published with the mandatory flag, so a missing queue surfaces as
    /// [`PublisherError::UnroutableMessage`].
    #[tracing::instrument(name = "publish_event", skip(self, payload, properties))]
    pub async fn publish(
        &self,
        queue_name: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), PublisherError> {
        let options = BasicPublishOptions {
            mandatory: true,
            // Not supported since RabbitMq 3.0.
            immediate: false,
        };
        let properties = inject_amqp_properties(properties);

        // The checkout of a channel and the publishing share the same timeout.
        let publish_future = async {
            let channel = self
                .channel_pool
                .get()
                .await
                .map_err(anyhow::Error::msg)
                .context("Failed to acquire a healthy channel from the pool when trying to publish")
                .map_err(PublisherError::GenericError)?;

            publish(&channel, payload, options, queue_name, properties).await
        };

        match tokio::time::timeout(self.timeout, publish_future).await {
            Ok(result) => result,
            Err(_) => Err(PublisherError::TimeoutError),
        }
    }
}

/// Error returned when trying to publish a message using [`EventPublisher`].
#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("Failed to serialize the event as JSON")]
    Serialization(#[source] serde_json::Error),
    #[error("Generic error encountered when interacting with the RabbitMq broker")]
    GenericError(#[source] anyhow::Error),
    #[error("The timeout threshold was reached while trying to publish the message")]
    TimeoutError,
    #[error("The message could not be routed: {0:?}")]
    UnroutableMessage(Box<BasicReturnMessage>),
    #[error("The RabbitMq broker nacked the publishing of the message: {0:?}")]
    NegativeAck(Option<Box<BasicReturnMessage>>),
}

/// A builder for [`EventPublisher`]. Use [`EventPublisher::builder`] as entrypoint.
pub struct EventPublisherBuilder {
    channel_pool: ChannelPool,
    timeout: Duration,
}

impl EventPublisherBuilder {
    /// Timeout applied when attempting to publish a message.
    /// Defaults to 3 seconds if left unspecified.
    #[must_use]
    pub fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> EventPublisher {
        EventPublisher {
            channel_pool: self.channel_pool,
            timeout: self.timeout,
        }
    }
}

/// Publish a persistent message on the default exchange and wait for the broker confirmation.
async fn publish(
    channel: &Channel,
    payload: &[u8],
    options: BasicPublishOptions,
    queue_name: &str,
    properties: BasicProperties,
) -> Result<(), PublisherError> {
    // Delivery mode: Non-persistent (1) or persistent (2).
    let properties = properties.with_delivery_mode(2);

    let confirm = channel
        .basic_publish("", queue_name, options, payload, properties)
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?
        .await
        .map_err(|e| PublisherError::GenericError(e.into()))?;

    match confirm {
        Confirmation::Ack(Some(returned)) if returned.reply_code == 312 => {
            // NO_ROUTE: the queue does not exist.
            Err(PublisherError::UnroutableMessage(returned))
        }
        Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        Confirmation::Nack(nack) => Err(PublisherError::NegativeAck(nack)),
    }
}

fn inject_amqp_properties(properties: BasicProperties) -> BasicProperties {
    let properties = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(now) => {
            let timestamp = (*properties.timestamp()).unwrap_or(now.as_secs());
            properties.with_timestamp(timestamp)
        }
        Err(_) => {
            warn!("System time is before 1970");
            properties
        }
    };

    let message_id = properties
        .message_id()
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string().into());
    properties.with_message_id(message_id)
}

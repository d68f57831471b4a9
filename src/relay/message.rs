use crate::amqp::convenience::BasicPropertiesExt;
use amq_protocol_types::DeliveryTag;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use std::fmt;

/// Settles a delivery with the broker.
///
/// Implemented for `lapin`'s acker; implement it yourself to plug another broker client (or a
/// test double) into the relay.
#[async_trait::async_trait]
pub trait Acknowledger: Send + Sync + 'static {
    /// The message was processed: the broker must not deliver it again.
    async fn complete(&self) -> Result<(), anyhow::Error>;

    /// The message was not processed: hand it back to the broker for redelivery.
    async fn abandon(&self) -> Result<(), anyhow::Error>;
}

#[async_trait::async_trait]
impl Acknowledger for lapin::acker::Acker {
    async fn complete(&self) -> Result<(), anyhow::Error> {
        self.ack(BasicAckOptions { multiple: false }).await?;
        Ok(())
    }

    async fn abandon(&self) -> Result<(), anyhow::Error> {
        // Requeueing bumps the delivery count on quorum queues, which is what broker-side
        // dead-lettering (`x-delivery-limit`) keys on.
        self.nack(BasicNackOptions {
            multiple: false,
            requeue: true,
        })
        .await?;
        Ok(())
    }
}

/// What the broker told us about a delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryMetadata {
    /// The producer-assigned message id, if any.
    pub message_id: Option<String>,
    pub delivery_tag: DeliveryTag,
    /// How many times delivery was attempted before, when the broker tracks it.
    pub delivery_count: Option<u64>,
    /// Whether this message was delivered before to this or another consumer.
    pub redelivered: bool,
}

/// A message received from a queue, waiting to be processed.
///
/// It owns the means to settle the delivery: [`InboundMessage::complete`] and
/// [`InboundMessage::abandon`] consume the message, so each delivery attempt is settled at most
/// once.
pub struct InboundMessage {
    /// The raw message body.
    pub data: Vec<u8>,
    pub metadata: DeliveryMetadata,
    acker: Box<dyn Acknowledger>,
}

impl InboundMessage {
    pub fn new(data: Vec<u8>, metadata: DeliveryMetadata, acker: impl Acknowledger) -> Self {
        Self {
            data,
            metadata,
            acker: Box::new(acker),
        }
    }

    /// Acknowledge the message.
    pub async fn complete(self) -> Result<(), anyhow::Error> {
        self.acker.complete().await
    }

    /// Give the message back to the broker without acknowledging it.
    pub async fn abandon(self) -> Result<(), anyhow::Error> {
        self.acker.abandon().await
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("data_len", &self.data.len())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl From<lapin::message::Delivery> for InboundMessage {
    fn from(delivery: lapin::message::Delivery) -> Self {
        let metadata = DeliveryMetadata {
            message_id: delivery
                .properties
                .message_id()
                .as_ref()
                .map(|id| id.as_str().to_owned()),
            delivery_tag: delivery.delivery_tag,
            delivery_count: delivery.properties.delivery_count(),
            redelivered: delivery.redelivered,
        };
        Self {
            data: delivery.data,
            metadata,
            acker: Box::new(delivery.acker),
        }
    }
}

//! Pre-start hooks to set up the queues the relay consumes from.
//!
//! Queue arguments are immutable on RabbitMq: changing the hooks of an existing queue (e.g.
//! adding a dead letter queue) requires rolling a new queue.
//!
//! ```
//! use email_relay::relay::hooks::{DeclareQuorumQueue, WithDeadLetterQueue, WithDeliveryLimit};
//!
//! // A quorum queue that dead-letters messages after 5 failed delivery attempts.
//! let pre_start_hook = WithDeadLetterQueue(WithDeliveryLimit {
//!     queue: DeclareQuorumQueue,
//!     limit: 5,
//! });
//! # drop(pre_start_hook);
//! ```

use crate::relay::ConsumerPreStartHook;
use crate::settings::ConsumerSettings;
use amq_protocol_types::{AMQPValue, FieldTable, LongString};
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::{Channel, ExchangeKind};
use std::sync::Arc;

const DURABLE: QueueDeclareOptions = QueueDeclareOptions {
    passive: false,
    durable: true,
    exclusive: false,
    auto_delete: false,
    nowait: false,
};

/// Declare a durable (classic) queue.
#[derive(Clone)]
pub struct DeclareDurableQueue;

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeclareDurableQueue {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        channel
            .queue_declare(queue_name, DURABLE, queue_args)
            .await?;
        Ok(())
    }
}

/// Declare a durable [quorum queue](https://www.rabbitmq.com/quorum-queues.html).
///
/// Quorum queues track how many times each message was delivered (`x-delivery-count`), which the
/// relay surfaces in [`DeliveryMetadata`](super::DeliveryMetadata).
#[derive(Clone)]
pub struct DeclareQuorumQueue;

#[async_trait::async_trait]
impl ConsumerPreStartHook for DeclareQuorumQueue {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        mut queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        queue_args.insert(
            "x-queue-type".into(),
            AMQPValue::LongString(LongString::from("quorum")),
        );
        DeclareDurableQueue.run(channel, queue_name, queue_args).await
    }
}

/// Wraps another hook with a [dead letter exchange](https://www.rabbitmq.com/dlx.html).
///
/// It declares a fanout exchange and a durable queue, both named `<queue_name>.deadletter`, binds
/// them and marks the exchange as the dead letter exchange of the wrapped queue.
pub struct WithDeadLetterQueue<H: ConsumerPreStartHook>(pub H);

#[async_trait::async_trait]
impl<H: ConsumerPreStartHook> ConsumerPreStartHook for WithDeadLetterQueue<H> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        mut queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        let dead_letter = format!("{queue_name}.deadletter");

        channel
            .exchange_declare(
                &dead_letter,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    passive: false,
                    durable: true,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await?;
        DeclareDurableQueue
            .run(channel, &dead_letter, FieldTable::default())
            .await?;
        channel
            .queue_bind(
                &dead_letter,
                &dead_letter,
                "",
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await?;

        queue_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(dead_letter.into()),
        );
        self.0.run(channel, queue_name, queue_args).await
    }
}

/// Cap the number of delivery attempts of a message on a quorum queue.
///
/// Once a message has been abandoned `limit` times, the broker drops it or, if a dead letter
/// exchange is configured, dead-letters it.
pub struct WithDeliveryLimit<H: ConsumerPreStartHook> {
    pub queue: H,
    pub limit: u32,
}

#[async_trait::async_trait]
impl<H: ConsumerPreStartHook> ConsumerPreStartHook for WithDeliveryLimit<H> {
    async fn run(
        &self,
        channel: &Channel,
        queue_name: &str,
        mut queue_args: FieldTable,
    ) -> Result<(), anyhow::Error> {
        queue_args.insert("x-delivery-limit".into(), AMQPValue::LongUInt(self.limit));
        self.queue.run(channel, queue_name, queue_args).await
    }
}

/// The queue declaration described by `settings`, if the relay is in charge of declaring queues.
pub fn from_settings(settings: &ConsumerSettings) -> Option<Arc<dyn ConsumerPreStartHook>> {
    if !settings.declare_queues {
        return None;
    }

    let mut hook: Arc<dyn ConsumerPreStartHook> = if settings.quorum_queues {
        Arc::new(DeclareQuorumQueue)
    } else {
        Arc::new(DeclareDurableQueue)
    };
    if let Some(limit) = settings.delivery_limit {
        hook = Arc::new(WithDeliveryLimit { queue: hook, limit });
    }
    if settings.dead_letter {
        hook = Arc::new(WithDeadLetterQueue(hook));
    }
    Some(hook)
}

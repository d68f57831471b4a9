use crate::amqp::ConnectionFactory;
use crate::pool::SharedConnection;
use crate::relay::{ConsumerPreStartHook, InboundMessage, QueueBinding, Receiver, Transport};
use amq_protocol_types::FieldTable;
use futures_util::StreamExt;
use lapin::options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions};
use lapin::Channel;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_PREFETCH_COUNT: u16 = 50;

/// A [`Transport`] backed by RabbitMq.
///
/// All receivers share a single connection, each on its own channel. The prefetch count bounds
/// how many unsettled messages the broker pushes to each receiver, hence how many messages of a
/// queue the relay processes concurrently.
///
/// Consuming channels never publish, so they are not put in confirm mode.
pub struct AmqpTransport {
    connection: Arc<SharedConnection>,
    prefetch_count: u16,
    pre_start_hooks: Vec<Arc<dyn ConsumerPreStartHook>>,
}

impl AmqpTransport {
    /// No connection is established until the relay starts.
    pub fn new(connection_factory: ConnectionFactory) -> Self {
        Self::with_connection(Arc::new(SharedConnection::new(connection_factory)))
    }

    /// Consume over `connection`, e.g. one that an
    /// [`EventPublisher`](crate::publishers::EventPublisher) publishes on too.
    ///
    /// Stopping the relay closes the connection.
    pub fn with_connection(connection: Arc<SharedConnection>) -> Self {
        Self {
            connection,
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            pre_start_hooks: Vec::new(),
        }
    }

    /// Configure the prefetch count of every receiver.
    /// If not configured, the prefetch count is set to a default value of 50.
    #[must_use]
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    /// Add a hook to run before consuming from each queue.
    ///
    /// Hooks are executed in the order they are registered.
    #[must_use]
    pub fn with_pre_start_hook<H: ConsumerPreStartHook>(self, hook: H) -> Self {
        self.with_dyn_pre_start_hook(Arc::new(hook))
    }

    /// A version of [`AmqpTransport::with_pre_start_hook`] for type-erased hooks.
    #[must_use]
    pub fn with_dyn_pre_start_hook(mut self, hook: Arc<dyn ConsumerPreStartHook>) -> Self {
        self.pre_start_hooks.push(hook);
        self
    }
}

#[async_trait::async_trait]
impl Transport for AmqpTransport {
    #[tracing::instrument(
        name = "open_receiver",
        skip_all,
        fields(queue_name = %binding.queue_name())
    )]
    async fn open_receiver(
        &self,
        binding: &QueueBinding,
    ) -> Result<Box<dyn Receiver>, anyhow::Error> {
        let channel = self.connection.open_channel().await?;
        channel
            .basic_qos(self.prefetch_count, BasicQosOptions { global: false })
            .await?;

        for hook in &self.pre_start_hooks {
            hook.run(&channel, binding.queue_name(), FieldTable::default())
                .await?;
        }

        let consumer = channel
            .basic_consume(
                binding.queue_name(),
                &Uuid::new_v4().to_string(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        tracing::debug!(consumer_tag = %consumer.tag(), "Consuming from queue");

        Ok(Box::new(AmqpReceiver { channel, consumer }))
    }

    async fn close(&self) {
        // Closes every receiver channel. The next start connects again.
        self.connection.close("relay stopped").await;
    }
}

struct AmqpReceiver {
    channel: Channel,
    consumer: lapin::Consumer,
}

#[async_trait::async_trait]
impl Receiver for AmqpReceiver {
    async fn next(&mut self) -> Option<Result<InboundMessage, anyhow::Error>> {
        let delivery = self.consumer.next().await?;
        Some(delivery.map(InboundMessage::from).map_err(Into::into))
    }

    async fn cancel(&mut self) -> Result<(), anyhow::Error> {
        self.channel
            .basic_cancel(self.consumer.tag().as_str(), BasicCancelOptions::default())
            .await?;
        Ok(())
    }
}

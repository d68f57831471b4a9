use crate::relay::{InboundMessage, QueueBinding};

/// The broker client behind a [`QueueRelay`](super::QueueRelay).
///
/// The relay asks the transport for one [`Receiver`] per binding when it starts and calls
/// [`Transport::close`] once every receiver has been drained on stop.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start receiving messages from the queue of `binding`.
    ///
    /// An error here means the broker could not be reached or the queue could not be consumed.
    async fn open_receiver(
        &self,
        binding: &QueueBinding,
    ) -> Result<Box<dyn Receiver>, anyhow::Error>;

    /// Release every broker resource held by the transport.
    ///
    /// Called after all receivers were cancelled and their in-flight messages settled, or after
    /// a failed start. The relay may open new receivers afterwards if it is started again.
    async fn close(&self);
}

/// A stream of messages from a single queue.
#[async_trait::async_trait]
pub trait Receiver: Send + 'static {
    /// The next message. `None` once the receiver was cancelled (or the broker cancelled it).
    async fn next(&mut self) -> Option<Result<InboundMessage, anyhow::Error>>;

    /// Ask the broker to stop delivering new messages.
    ///
    /// Messages already delivered are still returned by [`Receiver::next`] before it yields
    /// `None`, and can still be settled.
    async fn cancel(&mut self) -> Result<(), anyhow::Error>;
}

use crate::events::TypedEvent;
use crate::processor::EmailProcessor;
use crate::relay::DeliveryMetadata;
use std::sync::Arc;

/// A decoded message, ready for processing.
pub struct Incoming<'a> {
    /// The payload, already validated against the queue schema.
    pub event: TypedEvent,
    /// The queue the message was received from.
    pub queue_name: &'a str,
    /// Useful to deduplicate redeliveries (message id, delivery count).
    pub metadata: &'a DeliveryMetadata,
}

/// Implementers of the `Handler` trait process the messages of a [`QueueBinding`].
///
/// # Scope
///
/// `handle` never sees raw bytes nor the broker: the relay decodes the payload before calling it
/// and settles the message according to the returned value. `Ok` completes the message, `Err`
/// abandons it and gets reported to the error sink.
///
/// [`QueueBinding`]: crate::relay::QueueBinding
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, incoming: Incoming<'_>) -> Result<(), anyhow::Error>;
}

/// Route each event variant to the matching [`EmailProcessor`] call.
pub struct EmailDispatch {
    processor: Arc<dyn EmailProcessor>,
}

impl EmailDispatch {
    pub fn new(processor: Arc<dyn EmailProcessor>) -> Self {
        Self { processor }
    }
}

#[async_trait::async_trait]
impl Handler for EmailDispatch {
    async fn handle(&self, incoming: Incoming<'_>) -> Result<(), anyhow::Error> {
        match incoming.event {
            TypedEvent::Cart(event) => self.processor.process_cart_event(event).await,
            TypedEvent::UserRegistered(event) => {
                self.processor
                    .process_user_registered_event(event.into_email())
                    .await
            }
        }
    }
}

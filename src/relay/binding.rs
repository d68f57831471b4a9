use crate::events::PayloadSchema;
use crate::relay::{Handler, InboundMessage, Incoming, MessageError};
use std::fmt;
use std::sync::Arc;

/// Associates a queue with the schema of its messages and the handler processing them.
///
/// Bindings are fixed when the [`QueueRelay`](super::QueueRelay) is built and shared, read-only,
/// by every message received on the queue.
#[derive(Clone)]
pub struct QueueBinding {
    queue_name: String,
    schema: PayloadSchema,
    handler: Arc<dyn Handler>,
}

impl QueueBinding {
    pub fn new<T: Into<String>, H: Handler>(
        queue_name: T,
        schema: PayloadSchema,
        handler: H,
    ) -> Self {
        Self::with_dyn_handler(queue_name, schema, Arc::new(handler))
    }

    /// A version of [`QueueBinding::new`] for handlers shared across bindings.
    pub fn with_dyn_handler<T: Into<String>>(
        queue_name: T,
        schema: PayloadSchema,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            schema,
            handler,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn schema(&self) -> PayloadSchema {
        self.schema
    }

    /// Decode `message` with the binding schema, then run the handler.
    ///
    /// The handler is not called at all if decoding fails.
    pub(super) async fn process(&self, message: &InboundMessage) -> Result<(), MessageError> {
        let event = self.schema.decode(&message.data)?;
        let incoming = Incoming {
            event,
            queue_name: &self.queue_name,
            metadata: &message.metadata,
        };
        self.handler
            .handle(incoming)
            .await
            .map_err(MessageError::Processing)
    }
}

impl fmt::Debug for QueueBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBinding")
            .field("queue_name", &self.queue_name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

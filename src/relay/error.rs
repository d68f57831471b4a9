use crate::events::DeserializationError;

/// Errors returned to the caller of the relay lifecycle methods.
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    /// The broker could not be reached while opening the queue receivers.
    #[error("Failed to connect to the message broker.")]
    Connection(#[source] anyhow::Error),
    #[error("The relay has already been started.")]
    AlreadyStarted,
    #[error("The relay has not been started.")]
    NotStarted,
}

/// A failure while consuming a queue.
///
/// These never reach the caller of the relay: they are reported to the
/// [`ErrorSink`](super::ErrorSink). A failed message is left to the broker for redelivery, a
/// failed receiver is reopened.
#[derive(thiserror::Error, Debug)]
pub enum MessageError {
    /// The payload does not match the schema of its queue.
    #[error("Failed to deserialize the message payload.")]
    Deserialization(#[from] DeserializationError),
    /// The processing collaborator returned an error.
    #[error("The processing collaborator failed to handle the event.")]
    Processing(#[source] anyhow::Error),
    /// The broker did not take our ack/abandon instruction (e.g. the channel was closed).
    #[error("Failed to settle the message with the broker.")]
    Settlement(#[source] anyhow::Error),
    /// The queue receiver failed or was closed by the broker. No message is attached.
    #[error("The queue receiver stopped delivering messages.")]
    Receiver(#[source] anyhow::Error),
}

impl MessageError {
    /// A short label for the error, suitable as a log field or metric tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Deserialization(_) => "deserialization",
            Self::Processing(_) => "processing",
            Self::Settlement(_) => "settlement",
            Self::Receiver(_) => "receiver",
        }
    }
}

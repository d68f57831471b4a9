use crate::relay::{DeliveryMetadata, MessageError};
use std::error::Error;

/// A failure to process one message, as seen by operators.
///
/// Receiver failures are not tied to a message: their `metadata` is the default one.
#[derive(Debug)]
pub struct ErrorReport {
    pub queue_name: String,
    pub metadata: DeliveryMetadata,
    pub error: MessageError,
}

impl ErrorReport {
    /// The error and all its sources, outermost first, separated by `: `.
    pub fn error_chain(&self) -> String {
        let mut chain = self.error.to_string();
        let mut source = self.error.source();
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        chain
    }
}

/// Where per-message and receiver failures end up.
///
/// Reporting cannot fail and must not block for long: it runs inline with message dispatch.
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, report: &ErrorReport);
}

impl<F> ErrorSink for F
where
    F: Fn(&ErrorReport) + Send + Sync + 'static,
{
    fn report(&self, report: &ErrorReport) {
        (self)(report)
    }
}

/// Emits every report as a `tracing` error event. The default sink.
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, report: &ErrorReport) {
        tracing::error!(
            queue_name = %report.queue_name,
            message_id = ?report.metadata.message_id,
            delivery_count = ?report.metadata.delivery_count,
            redelivered = report.metadata.redelivered,
            error.kind = report.error.kind(),
            error.message = %report.error_chain(),
            "Failed to relay from a queue"
        );
    }
}

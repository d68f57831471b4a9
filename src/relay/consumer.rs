use crate::relay::{
    ErrorReport, ErrorSink, InboundMessage, MessageError, QueueBinding, Receiver, Transport,
};
use futures_util::{stream::FuturesUnordered, FutureExt, StreamExt};
use shutdown_handler::ShutdownHandler;
use std::sync::Arc;
use std::time::Duration;

/// Everything a consumer loop needs besides its receiver.
pub(super) struct ConsumerContext {
    pub(super) binding: QueueBinding,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) error_sink: Arc<dyn ErrorSink>,
    pub(super) shutdown: Arc<ShutdownHandler>,
    pub(super) reopen_delay: Duration,
}

/// Pull messages from `receiver` until `shutdown` is signalled.
///
/// Each message is processed on its own task. On shutdown the receiver is cancelled, messages the
/// broker already pushed are still dispatched, and the loop only returns once every in-flight
/// dispatch has settled its message.
///
/// A receiver that fails, or that the broker closes, is reported to the error sink and replaced
/// by a new one from the transport. If that fails too, the whole relay is shut down.
#[tracing::instrument(
    skip_all,
    name = "consumer_run",
    fields(queue_name = %context.binding.queue_name())
)]
pub(super) async fn run_until_shutdown(
    context: ConsumerContext,
    mut receiver: Box<dyn Receiver>,
) -> Result<(), anyhow::Error> {
    let ConsumerContext {
        binding,
        transport,
        error_sink,
        shutdown,
        reopen_delay,
    } = context;
    let report_receiver_failure = |error: anyhow::Error| {
        error_sink.report(&ErrorReport {
            queue_name: binding.queue_name().to_owned(),
            metadata: Default::default(),
            error: MessageError::Receiver(error),
        })
    };

    let mut task_handles = FuturesUnordered::new();
    let mut cancelled = false;

    let signal = shutdown.wait_for_signal().fuse();
    tokio::pin!(signal);

    let result = 'event_loop: loop {
        tokio::select! {
            // handle shutdowns before pulling more messages
            biased;

            _ = &mut signal => {
                tracing::info!("Consumer received a shutdown signal");
                cancelled = true;
                if let Err(e) = receiver.cancel().await {
                    tracing::warn!(error = %e, "Failed to cancel the queue receiver");
                    break 'event_loop Ok(());
                }
            }

            // clear out finished dispatches
            Some(outcome) = task_handles.next(), if !task_handles.is_empty() => {
                log_join_failure(outcome);
            }

            message = receiver.next() => {
                let failure = match message {
                    Some(Ok(message)) => {
                        // A failure (even a panic) while processing one message does not tear
                        // the consumer down.
                        let future = dispatch(binding.clone(), message, error_sink.clone());
                        task_handles.push(tokio::spawn(future));
                        None
                    }
                    None if cancelled => break 'event_loop Ok(()),
                    None => Some(anyhow::anyhow!("The broker closed the queue receiver")),
                    Some(Err(e)) => Some(e),
                };
                if let Some(error) = failure {
                    tracing::warn!(error = %error, "Queue receiver failed");
                    report_receiver_failure(error);
                    if cancelled {
                        break 'event_loop Ok(());
                    }

                    tokio::time::sleep(reopen_delay).await;
                    match transport.open_receiver(&binding).await {
                        Ok(reopened) => {
                            tracing::info!("Queue receiver reopened");
                            receiver = reopened;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reopen the queue receiver");
                            let message = format!("Failed to reopen the queue receiver: {e}");
                            report_receiver_failure(e);
                            // Without a receiver this binding is gone: stop the other ones too
                            // rather than relaying a subset of the queues.
                            shutdown.shutdown();
                            break 'event_loop Err(anyhow::anyhow!(message));
                        }
                    }
                }
            }
        }
    };

    // Wait for in-flight messages to be settled before returning.
    while let Some(outcome) = task_handles.next().await {
        log_join_failure(outcome);
    }

    result
}

/// Process one message and settle it with the broker according to the outcome.
///
/// Success completes the message. Any failure abandons it and is reported to `error_sink`, as is
/// a failure to settle.
#[tracing::instrument(
    name = "process_message",
    skip_all,
    fields(
        queue_name = %binding.queue_name(),
        message_id = ?message.metadata.message_id,
    ),
    level = tracing::Level::DEBUG
)]
pub(super) async fn dispatch(
    binding: QueueBinding,
    message: InboundMessage,
    error_sink: Arc<dyn ErrorSink>,
) {
    let metadata = message.metadata.clone();
    let report = |error: MessageError| {
        error_sink.report(&ErrorReport {
            queue_name: binding.queue_name().to_owned(),
            metadata: metadata.clone(),
            error,
        })
    };

    match binding.process(&message).await {
        Ok(()) => {
            if let Err(e) = message.complete().await {
                report(MessageError::Settlement(e));
            } else {
                tracing::debug!("Message completed");
            }
        }
        Err(error) => {
            let abandoned = message.abandon().await;
            report(error);
            if let Err(e) = abandoned {
                report(MessageError::Settlement(e));
            }
        }
    }
}

fn log_join_failure(outcome: Result<(), tokio::task::JoinError>) {
    if let Err(e) = outcome {
        // The message was never settled: the broker redelivers it once the channel closes.
        tracing::error!(error = %e, "Message dispatch task panicked");
    }
}

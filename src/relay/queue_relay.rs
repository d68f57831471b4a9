use crate::events::PayloadSchema;
use crate::processor::EmailProcessor;
use crate::relay::{
    consumer, EmailDispatch, ErrorReport, ErrorSink, Handler, InboundMessage, QueueBinding,
    Receiver, RelayError, TracingErrorSink, Transport,
};
use crate::settings::QueueSettings;
use crate::relay::consumer::ConsumerContext;
use shutdown_handler::ShutdownHandler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Consumes messages from a set of queues and hands them to their handlers.
///
/// `QueueRelay` is the main entrypoint of the crate. It owns one [`QueueBinding`] per queue and
/// a [`Transport`] to talk to the broker.
///
/// # Lifecycle
///
/// Nothing is consumed until [`QueueRelay::start`] is called. [`QueueRelay::stop`] stops
/// receiving, waits for in-flight messages to be settled and releases broker resources.
/// A stopped relay can be started again.
///
/// # Delivery semantics
///
/// At-least-once: a message is completed only once its handler succeeded. Failures are reported
/// to the [`ErrorSink`] and the message is abandoned, so the broker delivers it again.
///
/// A queue receiver that fails while running is reported to the [`ErrorSink`] as well and
/// reopened. If it cannot be reopened the relay stops consuming from every queue,
/// [`QueueRelay::is_running`] turns `false` and [`QueueRelay::stop`] must still be called to
/// release broker resources.
///
/// ```no_run
/// use email_relay::amqp::configuration::BrokerSettings;
/// use email_relay::amqp::ConnectionFactory;
/// use email_relay::processor::{EmailComposer, TracingEmailLog};
/// use email_relay::relay::{AmqpTransport, QueueRelay};
/// use email_relay::settings::QueueSettings;
/// use std::sync::Arc;
///
/// # async fn run() -> anyhow::Result<()> {
/// let factory = ConnectionFactory::new_from_config(&BrokerSettings::default())?;
/// let relay = QueueRelay::for_email_processor(
///     AmqpTransport::new(factory),
///     &QueueSettings::default(),
///     Arc::new(EmailComposer::new(TracingEmailLog)),
/// )
/// .build();
///
/// relay.start().await?;
/// // [...]
/// relay.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct QueueRelay {
    transport: Arc<dyn Transport>,
    bindings: Vec<QueueBinding>,
    error_sink: Arc<dyn ErrorSink>,
    reopen_delay: Duration,
    state: Mutex<RelayState>,
}

const DEFAULT_REOPEN_DELAY: Duration = Duration::from_secs(1);

enum RelayState {
    Stopped,
    Running {
        shutdown: Arc<ShutdownHandler>,
        consumers: Vec<JoinHandle<Result<(), anyhow::Error>>>,
    },
}

impl QueueRelay {
    /// Start building a [`QueueRelay`] on top of `transport`.
    pub fn builder(transport: impl Transport) -> QueueRelayBuilder {
        QueueRelayBuilder {
            transport: Arc::new(transport),
            bindings: Vec::new(),
            error_sink: Arc::new(TracingErrorSink),
            reopen_delay: DEFAULT_REOPEN_DELAY,
        }
    }

    /// Bind the shopping cart queue and the registered user queue, as named in `queues`, to
    /// `processor`.
    ///
    /// More bindings or a custom error sink can still be added to the returned builder.
    pub fn for_email_processor(
        transport: impl Transport,
        queues: &QueueSettings,
        processor: Arc<dyn EmailProcessor>,
    ) -> QueueRelayBuilder {
        let handler: Arc<dyn Handler> = Arc::new(EmailDispatch::new(processor));
        Self::builder(transport)
            .binding(QueueBinding::with_dyn_handler(
                &queues.email_shopping_cart_queue,
                PayloadSchema::Cart,
                handler.clone(),
            ))
            .binding(QueueBinding::with_dyn_handler(
                &queues.registered_user_queue,
                PayloadSchema::UserRegistered,
                handler,
            ))
    }

    pub fn bindings(&self) -> &[QueueBinding] {
        &self.bindings
    }

    /// Whether the relay is currently consuming from all of its queues.
    ///
    /// `false` once a consumer gave up on its queue, even if [`QueueRelay::stop`] was not called.
    pub async fn is_running(&self) -> bool {
        match &*self.state.lock().await {
            RelayState::Stopped => false,
            RelayState::Running { consumers, .. } => {
                consumers.iter().all(|consumer| !consumer.is_finished())
            }
        }
    }

    /// Begin receiving messages on every binding.
    ///
    /// Returns once a receiver has been opened for each queue; messages are processed in the
    /// background until [`QueueRelay::stop`] is called.
    ///
    /// # Errors
    ///
    /// - [`RelayError::AlreadyStarted`] if the relay is running. Nothing new is opened.
    /// - [`RelayError::Connection`] if any receiver cannot be opened. Receivers opened so far are
    ///   cancelled, the transport is closed and the relay stays stopped.
    #[tracing::instrument(skip_all, name = "relay_start")]
    pub async fn start(&self) -> Result<(), RelayError> {
        let mut state = self.state.lock().await;
        if let RelayState::Running { .. } = *state {
            return Err(RelayError::AlreadyStarted);
        }

        let mut receivers = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            match self.transport.open_receiver(binding).await {
                Ok(receiver) => receivers.push(receiver),
                Err(e) => {
                    tracing::error!(
                        queue_name = %binding.queue_name(),
                        error = %e,
                        "Failed to open a queue receiver"
                    );
                    self.abort_start(receivers).await;
                    return Err(RelayError::Connection(e));
                }
            }
        }

        let shutdown = Arc::new(ShutdownHandler::new());
        let consumers = self
            .bindings
            .iter()
            .cloned()
            .zip(receivers)
            .map(|(binding, receiver)| {
                let context = ConsumerContext {
                    binding,
                    transport: self.transport.clone(),
                    error_sink: self.error_sink.clone(),
                    shutdown: shutdown.clone(),
                    reopen_delay: self.reopen_delay,
                };
                tokio::spawn(consumer::run_until_shutdown(context, receiver))
            })
            .collect();

        *state = RelayState::Running {
            shutdown,
            consumers,
        };
        tracing::info!(queues = self.bindings.len(), "Relay started");
        Ok(())
    }

    /// Stop receiving, wait for in-flight messages to be settled, then release broker resources.
    ///
    /// Also resets a relay whose consumers gave up on their queues, so it can be started again.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotStarted`] if the relay is not running.
    #[tracing::instrument(skip_all, name = "relay_stop")]
    pub async fn stop(&self) -> Result<(), RelayError> {
        let mut state = self.state.lock().await;
        let RelayState::Running {
            shutdown,
            consumers,
        } = std::mem::replace(&mut *state, RelayState::Stopped)
        else {
            return Err(RelayError::NotStarted);
        };

        shutdown.shutdown();
        for consumer in consumers {
            match consumer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Consumer stopped with an error"),
                Err(e) => tracing::error!(error = %e, "Consumer task panicked"),
            }
        }

        self.transport.close().await;
        tracing::info!("Relay stopped");
        Ok(())
    }

    /// Process `message` as received on `binding`, then settle it.
    ///
    /// This is what the relay runs for each received message. Failures never escape: they are
    /// reported through [`QueueRelay::on_error`].
    pub async fn on_message(&self, binding: &QueueBinding, message: InboundMessage) {
        consumer::dispatch(binding.clone(), message, self.error_sink.clone()).await
    }

    /// Forward a failure report to the error sink.
    pub fn on_error(&self, report: &ErrorReport) {
        self.error_sink.report(report)
    }

    async fn abort_start(&self, receivers: Vec<Box<dyn Receiver>>) {
        for mut receiver in receivers {
            if let Err(e) = receiver.cancel().await {
                tracing::warn!(error = %e, "Failed to cancel a queue receiver");
            }
        }
        self.transport.close().await;
    }
}

/// A builder for [`QueueRelay`]. Use [`QueueRelay::builder`] as entrypoint.
pub struct QueueRelayBuilder {
    transport: Arc<dyn Transport>,
    bindings: Vec<QueueBinding>,
    error_sink: Arc<dyn ErrorSink>,
    reopen_delay: Duration,
}

impl QueueRelayBuilder {
    /// Where per-message failures are reported. Defaults to [`TracingErrorSink`].
    #[must_use]
    pub fn error_sink<S: ErrorSink>(mut self, error_sink: S) -> Self {
        self.error_sink = Arc::new(error_sink);
        self
    }

    /// How long to wait before reopening a failed queue receiver. Defaults to one second.
    #[must_use]
    pub fn reopen_delay(mut self, reopen_delay: Duration) -> Self {
        self.reopen_delay = reopen_delay;
        self
    }

    /// Add a queue to consume from.
    #[must_use]
    pub fn binding(mut self, binding: QueueBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    pub fn build(self) -> QueueRelay {
        QueueRelay {
            transport: self.transport,
            bindings: self.bindings,
            error_sink: self.error_sink,
            reopen_delay: self.reopen_delay,
            state: Mutex::new(RelayState::Stopped),
        }
    }
}

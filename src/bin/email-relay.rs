//! Relay shopping cart and user registration events from RabbitMq to the email composer.
//!
//! Runs until SIGTERM or ctrl-c, then stops consuming and waits for in-flight messages to be
//! settled before exiting.
use anyhow::Context;
use email_relay::amqp::ConnectionFactory;
use email_relay::processor::{EmailComposer, TracingEmailLog};
use email_relay::relay::{hooks, AmqpTransport, QueueRelay};
use email_relay::settings::Settings;
use shutdown_handler::ShutdownHandler;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let base_path = std::env::current_dir().context("Failed to determine the current directory")?;
    let settings = Settings::load(&base_path, None).context("Failed to load the configuration")?;

    let factory = ConnectionFactory::new_from_config(&settings.broker)?;
    let mut transport =
        AmqpTransport::new(factory).with_prefetch_count(settings.consumer.prefetch_count);
    if let Some(hook) = hooks::from_settings(&settings.consumer) {
        transport = transport.with_dyn_pre_start_hook(hook);
    }

    let mut composer = EmailComposer::new(TracingEmailLog);
    if let Some(recipient) = settings.email.registration_recipient.clone() {
        composer = composer.with_registration_recipient(recipient);
    }

    let relay = QueueRelay::for_email_processor(transport, &settings.queues, Arc::new(composer))
        .build();
    relay.start().await?;
    tracing::info!(
        cart_queue = %settings.queues.email_shopping_cart_queue,
        registered_user_queue = %settings.queues.registered_user_queue,
        "Relaying messages, waiting for a shutdown signal"
    );

    let sigterm = ShutdownHandler::sigterm()?;
    tokio::select! {
        _ = sigterm.wait_for_signal() => tracing::info!("Received SIGTERM"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Received ctrl-c"),
    }

    relay.stop().await?;
    Ok(())
}

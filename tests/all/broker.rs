//! End-to-end tests against a local RabbitMq broker (e.g. `docker run -p 5672:5672 rabbitmq`).
use crate::helpers::{ProcessorCall, RecordingProcessor, RecordingSink};
use email_relay::amqp::configuration::BrokerSettings;
use email_relay::amqp::ConnectionFactory;
use email_relay::events::{CartEvent, CartHeader};
use email_relay::pool::{ChannelManager, ChannelPool, SharedConnection};
use email_relay::publishers::{EventPublisher, PublisherError};
use email_relay::relay::hooks::DeclareDurableQueue;
use email_relay::relay::{AmqpTransport, QueueRelay};
use email_relay::settings::QueueSettings;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn get_connection_factory() -> ConnectionFactory {
    ConnectionFactory::new_from_config(&BrokerSettings::default()).unwrap()
}

fn get_publisher() -> EventPublisher {
    publisher_on(Arc::new(SharedConnection::new(get_connection_factory())))
}

fn publisher_on(connection: Arc<SharedConnection>) -> EventPublisher {
    let channel_pool = ChannelPool::builder(ChannelManager::new(connection))
        .max_size(10)
        .build()
        .unwrap();

    EventPublisher::builder(channel_pool)
        .publish_timeout(Duration::from_secs(3))
        .build()
}

/// Fresh queue names, so that tests do not see each other's messages.
fn unique_queues() -> QueueSettings {
    QueueSettings {
        email_shopping_cart_queue: format!("emailshoppingcart-{}", Uuid::new_v4()),
        registered_user_queue: format!("registereduser-{}", Uuid::new_v4()),
    }
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn published_events_are_relayed_and_acknowledged() {
    // Arrange
    let queues = unique_queues();
    let processor = Arc::new(RecordingProcessor::default());
    let sink = RecordingSink::default();
    let transport = AmqpTransport::new(get_connection_factory())
        .with_prefetch_count(5)
        .with_pre_start_hook(DeclareDurableQueue);
    let relay = QueueRelay::for_email_processor(transport, &queues, processor.clone())
        .error_sink(sink.clone())
        .build();
    relay.start().await.unwrap();
    let publisher = get_publisher();
    let cart = CartEvent {
        cart_header: CartHeader {
            email: Some("a@b.com".into()),
            ..CartHeader::default()
        },
        cart_details: vec![],
    };

    // Act
    publisher
        .publish_cart_event(&queues.email_shopping_cart_queue, &cart)
        .await
        .unwrap();
    publisher
        .publish_user_registered(&queues.registered_user_queue, "c@d.com")
        .await
        .unwrap();
    publisher
        .publish(
            &queues.registered_user_queue,
            b"not json",
            Default::default(),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    relay.stop().await.unwrap();

    // Assert
    let calls = processor.calls();
    assert!(calls.contains(&ProcessorCall::Cart(cart)));
    assert!(calls.contains(&ProcessorCall::UserRegistered("c@d.com".into())));
    // The malformed message keeps being redelivered until the relay stops.
    assert!(sink
        .reports()
        .iter()
        .all(|(queue, kind)| queue == &queues.registered_user_queue && *kind == "deserialization"));
    assert!(!sink.reports().is_empty());
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn starting_fails_when_a_queue_does_not_exist() {
    // No pre-start hook: nothing declares the queues.
    let transport = AmqpTransport::new(get_connection_factory());
    let relay = QueueRelay::for_email_processor(
        transport,
        &unique_queues(),
        Arc::new(RecordingProcessor::default()),
    )
    .build();

    let outcome = relay.start().await;

    assert!(outcome.is_err());
    assert!(!relay.is_running().await);
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn publishing_to_a_missing_queue_is_unroutable() {
    let publisher = get_publisher();

    let outcome = publisher
        .publish_user_registered(&Uuid::new_v4().to_string(), "a@b.com")
        .await;

    assert!(matches!(outcome, Err(PublisherError::UnroutableMessage(_))));
}

#[tokio::test]
#[ignore = "requires a running RabbitMq broker"]
async fn a_connection_closed_on_stop_is_reopened_by_the_next_user() {
    // Arrange
    let queues = unique_queues();
    let processor = Arc::new(RecordingProcessor::default());
    let connection = Arc::new(SharedConnection::new(get_connection_factory()));
    let transport =
        AmqpTransport::with_connection(connection.clone()).with_pre_start_hook(DeclareDurableQueue);
    let relay = QueueRelay::for_email_processor(transport, &queues, processor.clone()).build();
    let publisher = publisher_on(connection.clone());
    relay.start().await.unwrap();
    publisher
        .publish_user_registered(&queues.registered_user_queue, "a@b.com")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    relay.stop().await.unwrap();
    assert!(!connection.is_open().await);

    // Act
    // The pooled channel died with the connection: publishing opens a new connection.
    publisher
        .publish_user_registered(&queues.registered_user_queue, "c@d.com")
        .await
        .unwrap();
    relay.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    relay.stop().await.unwrap();

    // Assert
    assert_eq!(
        processor.calls(),
        vec![
            ProcessorCall::UserRegistered("a@b.com".into()),
            ProcessorCall::UserRegistered("c@d.com".into()),
        ]
    );
}

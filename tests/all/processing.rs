use crate::helpers::{
    FakeTransport, ProcessorCall, RecordingProcessor, RecordingSink, Settlements,
};
use email_relay::events::PayloadSchema;
use email_relay::processor::{EmailComposer, InMemoryEmailLog};
use email_relay::relay::{EmailDispatch, QueueBinding, QueueRelay};
use email_relay::settings::QueueSettings;
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const CART_QUEUE: &str = "emailshoppingcart";
const USER_QUEUE: &str = "registereduser";

struct Harness {
    transport: FakeTransport,
    processor: Arc<RecordingProcessor>,
    sink: RecordingSink,
    relay: QueueRelay,
}

impl Harness {
    async fn start(processor: RecordingProcessor) -> Self {
        let transport = FakeTransport::default();
        let processor = Arc::new(processor);
        let sink = RecordingSink::default();
        let relay = QueueRelay::for_email_processor(
            transport.clone(),
            &QueueSettings::default(),
            processor.clone(),
        )
        .error_sink(sink.clone())
        .build();
        relay.start().await.unwrap();
        Self {
            transport,
            processor,
            sink,
            relay,
        }
    }

    /// Stopping drains every delivered message: all of them are settled once this returns.
    async fn stop(&self) {
        self.relay.stop().await.unwrap();
    }
}

#[tokio::test]
async fn a_valid_cart_message_is_processed_and_completed_once() {
    // Arrange
    let harness = Harness::start(RecordingProcessor::default()).await;
    let settlements = Settlements::default();
    let body = r#"{"cartHeader":{"email":"a@b.com","couponCode":"SAVE10"},"cartDetails":[]}"#;

    // Act
    harness
        .transport
        .state
        .deliver(CART_QUEUE, settlements.message(body));
    harness.stop().await;

    // Assert
    let calls = harness.processor.calls();
    assert_eq!(calls.len(), 1);
    let ProcessorCall::Cart(event) = &calls[0] else {
        panic!("Expected a cart event, got {:?}", calls[0]);
    };
    assert_eq!(event.cart_header.email.as_deref(), Some("a@b.com"));
    assert_eq!(event.cart_header.coupon_code.as_deref(), Some("SAVE10"));
    assert!(event.cart_details.is_empty());
    assert_eq!(settlements.completed(), 1);
    assert_eq!(settlements.abandoned(), 0);
    assert!(harness.sink.reports().is_empty());
}

#[tokio::test]
async fn a_registered_user_message_forwards_the_email_address() {
    // Arrange
    let harness = Harness::start(RecordingProcessor::default()).await;
    let settlements = Settlements::default();
    let email: String = SafeEmail().fake();

    // Act
    harness
        .transport
        .state
        .deliver(USER_QUEUE, settlements.message(format!("\"{email}\"")));
    harness.stop().await;

    // Assert
    assert_eq!(
        harness.processor.calls(),
        vec![ProcessorCall::UserRegistered(email)]
    );
    assert_eq!(settlements.completed(), 1);
}

#[tokio::test]
async fn a_message_that_is_not_utf8_is_abandoned_and_reported() {
    // Arrange
    let harness = Harness::start(RecordingProcessor::default()).await;
    let settlements = Settlements::default();

    // Act
    harness
        .transport
        .state
        .deliver(CART_QUEUE, settlements.message(vec![0xff, 0xfe, 0x7b]));
    harness.stop().await;

    // Assert
    assert!(harness.processor.calls().is_empty());
    assert_eq!(settlements.completed(), 0);
    assert_eq!(settlements.abandoned(), 1);
    assert_eq!(
        harness.sink.reports(),
        vec![(CART_QUEUE.to_owned(), "deserialization")]
    );
}

#[tokio::test]
async fn a_message_that_does_not_match_the_queue_schema_is_abandoned_and_reported() {
    // Arrange
    let harness = Harness::start(RecordingProcessor::default()).await;
    let settlements = Settlements::default();

    // Act
    // A cart payload on the registered user queue.
    harness.transport.state.deliver(
        USER_QUEUE,
        settlements.message(r#"{"cartHeader":{"email":"a@b.com"}}"#),
    );
    harness
        .transport
        .state
        .deliver(CART_QUEUE, settlements.message("{not json"));
    harness.stop().await;

    // Assert
    assert!(harness.processor.calls().is_empty());
    assert_eq!(settlements.completed(), 0);
    assert_eq!(settlements.abandoned(), 2);
    let mut reports = harness.sink.reports();
    reports.sort();
    assert_eq!(
        reports,
        vec![
            (CART_QUEUE.to_owned(), "deserialization"),
            (USER_QUEUE.to_owned(), "deserialization"),
        ]
    );
}

#[tokio::test]
async fn a_collaborator_failure_abandons_the_message_and_the_relay_keeps_going() {
    // Arrange
    let harness = Harness::start(RecordingProcessor::failing(1)).await;
    let failed = Settlements::default();
    let succeeded = Settlements::default();

    // Act
    harness
        .transport
        .state
        .deliver(USER_QUEUE, failed.message(r#""x@y.com""#));
    // Let the first message be processed before the second one arrives.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    harness
        .transport
        .state
        .deliver(USER_QUEUE, succeeded.message(r#""x@y.com""#));
    harness.stop().await;

    // Assert
    assert_eq!(harness.processor.calls().len(), 2);
    assert_eq!(failed.abandoned(), 1);
    assert_eq!(failed.completed(), 0);
    assert_eq!(succeeded.completed(), 1);
    assert_eq!(succeeded.abandoned(), 0);
    assert_eq!(
        harness.sink.reports(),
        vec![(USER_QUEUE.to_owned(), "processing")]
    );
}

#[tokio::test]
async fn a_failure_to_complete_is_reported() {
    // Arrange
    let harness = Harness::start(RecordingProcessor::default()).await;
    let settlements = Settlements::default();
    settlements.fail.store(true, Ordering::SeqCst);

    // Act
    harness
        .transport
        .state
        .deliver(USER_QUEUE, settlements.message(r#""a@b.com""#));
    harness.stop().await;

    // Assert
    assert_eq!(harness.processor.calls().len(), 1);
    assert_eq!(
        harness.sink.reports(),
        vec![(USER_QUEUE.to_owned(), "settlement")]
    );
}

#[tokio::test]
async fn a_failure_to_abandon_is_reported_after_the_original_error() {
    // Arrange
    let harness = Harness::start(RecordingProcessor::default()).await;
    let settlements = Settlements::default();
    settlements.fail.store(true, Ordering::SeqCst);

    // Act
    harness
        .transport
        .state
        .deliver(CART_QUEUE, settlements.message("[]"));
    harness.stop().await;

    // Assert
    assert_eq!(
        harness.sink.reports(),
        vec![
            (CART_QUEUE.to_owned(), "deserialization"),
            (CART_QUEUE.to_owned(), "settlement"),
        ]
    );
}

#[tokio::test]
async fn on_message_processes_a_single_message_inline() {
    // Arrange
    let processor = Arc::new(RecordingProcessor::default());
    let sink = RecordingSink::default();
    let relay = QueueRelay::builder(FakeTransport::default())
        .binding(QueueBinding::new(
            "carts",
            PayloadSchema::Cart,
            EmailDispatch::new(processor.clone()),
        ))
        .error_sink(sink.clone())
        .build();
    let settlements = Settlements::default();
    let binding = relay.bindings()[0].clone();

    // Act
    relay
        .on_message(&binding, settlements.message(r#"{"cartHeader":{}}"#))
        .await;
    relay
        .on_message(&binding, settlements.message("\"not a cart\""))
        .await;

    // Assert
    assert_eq!(processor.calls().len(), 1);
    assert_eq!(settlements.completed(), 1);
    assert_eq!(settlements.abandoned(), 1);
    assert_eq!(sink.reports(), vec![("carts".to_owned(), "deserialization")]);
}

#[tokio::test]
async fn composed_emails_are_logged_for_relayed_events() {
    // Arrange
    let transport = FakeTransport::default();
    let composer = Arc::new(EmailComposer::new(InMemoryEmailLog::default()));
    let sink = RecordingSink::default();
    let relay =
        QueueRelay::for_email_processor(transport.clone(), &QueueSettings::default(), composer.clone())
            .error_sink(sink.clone())
            .build();
    let settlements = Settlements::default();
    relay.start().await.unwrap();

    // Act
    transport.state.deliver(
        CART_QUEUE,
        settlements.message(
            r#"{"cartHeader":{"email":"a@b.com","cartTotal":12.5},
                "cartDetails":[{"count":2,"product":{"name":"Mug","price":6.25}}]}"#,
        ),
    );
    // No recipient: the composer refuses the cart.
    transport
        .state
        .deliver(CART_QUEUE, settlements.message(r#"{"cartHeader":{}}"#));
    relay.stop().await.unwrap();

    // Assert
    let entries = composer.log().entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].email, "a@b.com");
    assert!(entries[0].message.contains("Mug"));
    assert_eq!(settlements.completed(), 1);
    assert_eq!(settlements.abandoned(), 1);
    assert_eq!(sink.reports(), vec![(CART_QUEUE.to_owned(), "processing")]);
}

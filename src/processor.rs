//! The processing collaborator the relay forwards events to.
//!
//! The relay only knows about [`EmailProcessor`]. [`EmailComposer`] is the implementation shipped
//! with the service: it renders the email body for each event and appends it to an [`EmailLog`].
//!
//! Delivery is at-least-once: a processor can see the same event more than once (e.g. the
//! process crashed after processing but before the acknowledgment reached the broker).
use crate::events::CartEvent;
use anyhow::Context;
use std::fmt::Write;
use std::time::SystemTime;
use tokio::sync::Mutex;

/// Processes the events relayed from the queues.
///
/// Both calls are fallible: an error prevents the message from being acknowledged, so the broker
/// delivers it again later.
#[async_trait::async_trait]
pub trait EmailProcessor: Send + Sync + 'static {
    async fn process_cart_event(&self, event: CartEvent) -> Result<(), anyhow::Error>;

    async fn process_user_registered_event(&self, email: String) -> Result<(), anyhow::Error>;
}

/// An email ready to be sent, as recorded in the [`EmailLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct EmailLogEntry {
    pub email: String,
    pub message: String,
    pub logged_at: SystemTime,
}

/// Where composed emails are recorded.
#[async_trait::async_trait]
pub trait EmailLog: Send + Sync + 'static {
    async fn append(&self, entry: EmailLogEntry) -> Result<(), anyhow::Error>;
}

/// Keeps composed emails in memory.
#[derive(Default)]
pub struct InMemoryEmailLog {
    entries: Mutex<Vec<EmailLogEntry>>,
}

impl InMemoryEmailLog {
    pub async fn entries(&self) -> Vec<EmailLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl EmailLog for InMemoryEmailLog {
    async fn append(&self, entry: EmailLogEntry) -> Result<(), anyhow::Error> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

/// Records composed emails as structured log lines.
pub struct TracingEmailLog;

#[async_trait::async_trait]
impl EmailLog for TracingEmailLog {
    async fn append(&self, entry: EmailLogEntry) -> Result<(), anyhow::Error> {
        tracing::info!(email = %entry.email, message = %entry.message, "Email logged");
        Ok(())
    }
}

/// Renders emails for relayed events and records them in an [`EmailLog`].
pub struct EmailComposer<L> {
    log: L,
    /// Who gets notified about new registrations. The registered user when `None`.
    registration_recipient: Option<String>,
}

impl<L: EmailLog> EmailComposer<L> {
    pub fn new(log: L) -> Self {
        Self {
            log,
            registration_recipient: None,
        }
    }

    /// Send registration notifications to a fixed address (e.g. an operations mailbox).
    #[must_use]
    pub fn with_registration_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.registration_recipient = Some(recipient.into());
        self
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    async fn record(&self, email: String, message: String) -> Result<(), anyhow::Error> {
        self.log
            .append(EmailLogEntry {
                email,
                message,
                logged_at: SystemTime::now(),
            })
            .await
            .context("Failed to record the composed email")
    }
}

#[async_trait::async_trait]
impl<L: EmailLog> EmailProcessor for EmailComposer<L> {
    #[tracing::instrument(name = "compose_cart_email", skip_all)]
    async fn process_cart_event(&self, event: CartEvent) -> Result<(), anyhow::Error> {
        let email = event
            .cart_header
            .email
            .clone()
            .filter(|email| !email.trim().is_empty())
            .context("The cart does not carry a recipient email address")?;
        self.record(email, render_cart(&event)).await
    }

    #[tracing::instrument(name = "compose_registration_email", skip_all)]
    async fn process_user_registered_event(&self, email: String) -> Result<(), anyhow::Error> {
        if email.trim().is_empty() {
            anyhow::bail!("The registration event carries an empty email address");
        }
        let message = format!("User registration successful.<br/> Email: {email}");
        let recipient = self.registration_recipient.clone().unwrap_or(email);
        self.record(recipient, message).await
    }
}

fn render_cart(event: &CartEvent) -> String {
    let header = &event.cart_header;
    let mut message = String::from("<br/>Cart email requested\n");
    // Writing to a `String` cannot fail.
    let _ = writeln!(
        message,
        "<br/>Total {:.2}",
        header.cart_total.unwrap_or_default()
    );
    if let Some(coupon) = header.coupon_code.as_deref().filter(|c| !c.is_empty()) {
        let _ = writeln!(
            message,
            "<br/>Coupon {coupon} (-{:.2})",
            header.discount.unwrap_or_default()
        );
    }
    message.push_str("<br/><ul>");
    for line in &event.cart_details {
        let name = line
            .product
            .as_ref()
            .and_then(|p| p.name.as_deref())
            .unwrap_or("Unknown product");
        let _ = write!(message, "<li>{name} x {}</li>", line.count);
    }
    message.push_str("</ul>");
    message
}

//! The business payloads carried by the relay's queues and their wire schemas.
//!
//! Every queue carries UTF-8 encoded JSON. The cart queue carries a [`CartEvent`] object, the
//! registered-user queue carries a bare JSON string holding an email address
//! ([`UserRegisteredEvent`]). [`PayloadSchema`] tags a queue with the schema its messages must
//! follow and turns raw bytes into a [`TypedEvent`].
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user asked for their shopping cart to be emailed to them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartEvent {
    pub cart_header: CartHeader,
    #[serde(default)]
    pub cart_details: Vec<CartDetails>,
}

/// Who the cart belongs to and its totals.
///
/// Producers only fill the fields they know about, hence everything is optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CartHeader {
    pub cart_header_id: Option<i64>,
    pub user_id: Option<String>,
    pub coupon_code: Option<String>,
    pub discount: Option<f64>,
    pub cart_total: Option<f64>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A single cart line item.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CartDetails {
    pub cart_details_id: Option<i64>,
    pub cart_header_id: Option<i64>,
    pub product_id: Option<i64>,
    pub product: Option<Product>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub product_id: Option<i64>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub category_name: Option<String>,
    pub image_url: Option<String>,
}

/// A new user completed their registration. On the wire it is just their email address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRegisteredEvent(pub String);

impl UserRegisteredEvent {
    pub fn email(&self) -> &str {
        &self.0
    }

    pub fn into_email(self) -> String {
        self.0
    }
}

/// A fully deserialized message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedEvent {
    Cart(CartEvent),
    UserRegistered(UserRegisteredEvent),
}

impl TypedEvent {
    /// The schema this event was decoded with.
    pub fn schema(&self) -> PayloadSchema {
        match self {
            Self::Cart(_) => PayloadSchema::Cart,
            Self::UserRegistered(_) => PayloadSchema::UserRegistered,
        }
    }
}

/// The schema expected on a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSchema {
    Cart,
    UserRegistered,
}

impl PayloadSchema {
    /// Decode a message body as UTF-8 text, then parse it as JSON following this schema.
    ///
    /// Nothing is returned unless the whole payload is valid: a body that fails here is a
    /// terminal failure for the current delivery attempt.
    pub fn decode(self, body: &[u8]) -> Result<TypedEvent, DeserializationError> {
        let text = std::str::from_utf8(body)?;
        let event = match self {
            Self::Cart => serde_json::from_str(text).map(TypedEvent::Cart),
            Self::UserRegistered => serde_json::from_str(text).map(TypedEvent::UserRegistered),
        };
        event.map_err(|source| DeserializationError::InvalidJson {
            schema: self,
            source,
        })
    }
}

impl fmt::Display for PayloadSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cart => write!(f, "cart"),
            Self::UserRegistered => write!(f, "user_registered"),
        }
    }
}

/// A message body that does not match the schema of its queue.
#[derive(thiserror::Error, Debug)]
pub enum DeserializationError {
    #[error("The message body is not valid UTF-8.")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("The message body is not a valid `{schema}` payload.")]
    InvalidJson {
        schema: PayloadSchema,
        #[source]
        source: serde_json::Error,
    },
}

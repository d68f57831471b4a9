use lapin::{types::AMQPValue, BasicProperties};
use std::borrow::Borrow;

/// Header set by RabbitMq quorum queues, counting failed delivery attempts of a message.
pub const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

/// Convenience methods for [`lapin::BasicProperties`].
pub trait BasicPropertiesExt {
    /// Lookup header by key.
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized;

    /// Lookup a header holding a non-negative integer, whatever its AMQP width.
    ///
    /// Returns `None` if the header is missing, negative or not an integer.
    fn get_header_u64<Q>(&self, key: &Q) -> Option<u64>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        match self.get_header(key)? {
            AMQPValue::ShortShortUInt(v) => Some(u64::from(*v)),
            AMQPValue::ShortUInt(v) => Some(u64::from(*v)),
            AMQPValue::LongUInt(v) => Some(u64::from(*v)),
            AMQPValue::ShortShortInt(v) => u64::try_from(*v).ok(),
            AMQPValue::ShortInt(v) => u64::try_from(*v).ok(),
            AMQPValue::LongInt(v) => u64::try_from(*v).ok(),
            AMQPValue::LongLongInt(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// How many times the broker has already tried to deliver this message, if it tracks it.
    fn delivery_count(&self) -> Option<u64> {
        self.get_header_u64(DELIVERY_COUNT_HEADER)
    }
}

impl BasicPropertiesExt for BasicProperties {
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.headers().as_ref()?.inner().get(key)
    }
}

/// Set the value for a header inside a collection of AMQP properties.
///
/// `lapin` gives no mutable access to headers, so they are cloned. `properties` is consumed to
/// make sure the caller does not re-use it under the impression that it has been mutated.
pub fn set_header(
    properties: BasicProperties,
    header_name: &str,
    header_value: AMQPValue,
) -> BasicProperties {
    let mut headers = properties
        .headers()
        .as_ref()
        .map(|h| h.to_owned())
        .unwrap_or_default();
    headers.insert(header_name.into(), header_value);
    properties.with_headers(headers)
}

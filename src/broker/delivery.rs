//! Message shapes shared by every broker implementation.

/// Broker-assigned handle for one delivered, not yet settled message.
///
/// Deliberately neither `Clone` nor `Copy`: `ack` and `nack` take it by value,
/// so a delivery can be settled at most once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    pub fn new(tag: u64) -> Self {
        Self(tag)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Routing metadata carried alongside a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageProperties {
    /// Opaque requester token, echoed verbatim on the reply.
    pub correlation_id: Option<String>,
    /// Queue the requester listens on for the reply.
    pub reply_to: Option<String>,
}

impl MessageProperties {
    pub fn reply(correlation_id: Option<String>) -> Self {
        Self {
            correlation_id,
            reply_to: None,
        }
    }
}

/// One message handed to a consumer.
#[derive(Debug)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub payload: Vec<u8>,
    pub properties: MessageProperties,
}

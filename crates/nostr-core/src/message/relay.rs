// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay messages

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::{MachineReadablePrefix, MessageHandleError, SubscriptionId};
use crate::{Event, EventId, JsonUtil};

/// Messages sent by relays, received by clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Event
    Event {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Event
        event: Box<Event>,
    },
    /// Ok
    Ok {
        /// Event ID
        event_id: EventId,
        /// Status
        status: bool,
        /// Message
        message: String,
    },
    /// End of stored events
    EndOfStoredEvents(SubscriptionId),
    /// Notice
    Notice(String),
    /// Closed
    Closed {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Message
        message: String,
    },
    /// Count
    Count {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Events count
        count: usize,
    },
    /// Reconciliation message
    NegMsg {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Message (hex)
        message: String,
    },
    /// Reconciliation error
    NegErr {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Error message
        message: String,
    },
}

impl Serialize for RelayMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RelayMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

impl RelayMessage {
    /// Create `EVENT` message
    #[inline]
    pub fn event(subscription_id: SubscriptionId, event: Event) -> Self {
        Self::Event {
            subscription_id,
            event: Box::new(event),
        }
    }

    /// Create `NOTICE` message
    #[inline]
    pub fn notice<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self::Notice(message.into())
    }

    /// Create `EOSE` message
    #[inline]
    pub fn eose(subscription_id: SubscriptionId) -> Self {
        Self::EndOfStoredEvents(subscription_id)
    }

    /// Create `OK` message
    #[inline]
    pub fn ok<S>(event_id: EventId, status: bool, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::Ok {
            event_id,
            status,
            message: message.into(),
        }
    }

    /// Create a rejecting `OK` message with a machine-readable prefix
    #[inline]
    pub fn ok_rejected<S>(event_id: EventId, prefix: MachineReadablePrefix, message: S) -> Self
    where
        S: AsRef<str>,
    {
        Self::ok(event_id, false, prefix.with_message(message))
    }

    /// Create `CLOSED` message
    #[inline]
    pub fn closed<S>(subscription_id: SubscriptionId, message: S) -> Self
    where
        S: Into<String>,
    {
        Self::Closed {
            subscription_id,
            message: message.into(),
        }
    }

    /// Create `COUNT` message
    #[inline]
    pub fn count(subscription_id: SubscriptionId, count: usize) -> Self {
        Self::Count {
            subscription_id,
            count,
        }
    }

    /// Serialize as [`Value`]
    pub fn as_value(&self) -> Value {
        match self {
            Self::Event {
                subscription_id,
                event,
            } => json!(["EVENT", subscription_id, event]),
            Self::Ok {
                event_id,
                status,
                message,
            } => json!(["OK", event_id, status, message]),
            Self::EndOfStoredEvents(subscription_id) => json!(["EOSE", subscription_id]),
            Self::Notice(message) => json!(["NOTICE", message]),
            Self::Closed {
                subscription_id,
                message,
            } => json!(["CLOSED", subscription_id, message]),
            Self::Count {
                subscription_id,
                count,
            } => json!(["COUNT", subscription_id, { "count": count }]),
            Self::NegMsg {
                subscription_id,
                message,
            } => json!(["NEG-MSG", subscription_id, message]),
            Self::NegErr {
                subscription_id,
                message,
            } => json!(["NEG-ERR", subscription_id, message]),
        }
    }

    /// Deserialize from [`Value`]
    ///
    /// **This method doesn't verify the event signature!**
    pub fn from_value(msg: Value) -> Result<Self, MessageHandleError> {
        let v = msg
            .as_array()
            .ok_or(MessageHandleError::InvalidMessageFormat)?;

        if v.is_empty() {
            return Err(MessageHandleError::InvalidMessageFormat);
        }

        let v_len: usize = v.len();
        let v_type: &str = v[0]
            .as_str()
            .ok_or(MessageHandleError::InvalidMessageFormat)?;

        match (v_type, v_len) {
            // ["NOTICE", <message>]
            ("NOTICE", 2) => Ok(Self::Notice(serde_json::from_value(v[1].clone())?)),
            // ["EVENT", <subscription id>, <event JSON>]
            ("EVENT", 3) => Ok(Self::event(
                serde_json::from_value(v[1].clone())?,
                serde_json::from_value(v[2].clone())?,
            )),
            // ["EOSE", <subscription_id>]
            ("EOSE", 2) => Ok(Self::eose(serde_json::from_value(v[1].clone())?)),
            // ["OK", <event_id>, <true|false>, <message>]
            ("OK", 4) => Ok(Self::ok(
                serde_json::from_value::<EventId>(v[1].clone())?,
                serde_json::from_value::<bool>(v[2].clone())?,
                serde_json::from_value::<String>(v[3].clone())?,
            )),
            // ["CLOSED", <subscription_id>, <message>]
            ("CLOSED", 3) => Ok(Self::closed(
                serde_json::from_value::<SubscriptionId>(v[1].clone())?,
                serde_json::from_value::<String>(v[2].clone())?,
            )),
            // ["COUNT", <subscription_id>, {"count": <integer>}]
            ("COUNT", 3) => {
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                let count: usize = v[2]
                    .get("count")
                    .and_then(|c| c.as_u64())
                    .ok_or(MessageHandleError::InvalidMessageFormat)?
                    as usize;
                Ok(Self::count(subscription_id, count))
            }
            // ["NEG-MSG", <subscription ID>, <message, hex>]
            ("NEG-MSG", 3) => Ok(Self::NegMsg {
                subscription_id: serde_json::from_value(v[1].clone())?,
                message: serde_json::from_value(v[2].clone())?,
            }),
            // ["NEG-ERR", <subscription ID>, <reason>]
            ("NEG-ERR", 3) => Ok(Self::NegErr {
                subscription_id: serde_json::from_value(v[1].clone())?,
                message: serde_json::from_value(v[2].clone())?,
            }),
            _ => Err(MessageHandleError::InvalidMessageFormat),
        }
    }
}

impl JsonUtil for RelayMessage {
    type Err = MessageHandleError;

    /// Deserialize [`RelayMessage`] from JSON string
    ///
    /// **This method doesn't verify the event signature!**
    fn from_json<T>(json: T) -> Result<Self, Self::Err>
    where
        T: AsRef<[u8]>,
    {
        let msg: &[u8] = json.as_ref();

        if msg.is_empty() {
            return Err(MessageHandleError::EmptyMsg);
        }

        let value: Value = serde_json::from_slice(msg)?;
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_valid_notice() {
        let msg = RelayMessage::from_json(r#"["NOTICE","Invalid event format!"]"#).unwrap();
        assert_eq!(msg, RelayMessage::notice("Invalid event format!"));
    }

    #[test]
    fn test_handle_invalid_notice() {
        assert!(RelayMessage::from_json(r#"["NOTICE"]"#).is_err());
        assert!(RelayMessage::from_json(r#"["NOTICE",404]"#).is_err());
    }

    #[test]
    fn test_handle_valid_ok() {
        let json = r#"["OK","b1a649ebe8b435ec71d3784793f3bbf4b93e64e17568a741aecd4c7ddeafce30",false,"duplicate: already have this event"]"#;
        let msg = RelayMessage::from_json(json).unwrap();
        match &msg {
            RelayMessage::Ok {
                status, message, ..
            } => {
                assert!(!status);
                assert_eq!(
                    MachineReadablePrefix::parse(message),
                    Some(MachineReadablePrefix::Duplicate)
                );
            }
            m => panic!("unexpected message: {m:?}"),
        }
        assert_eq!(msg.as_json(), json);
    }

    #[test]
    fn test_handle_count_and_eose() {
        let msg = RelayMessage::from_json(r#"["COUNT","sub",{"count":42}]"#).unwrap();
        assert_eq!(msg, RelayMessage::count(SubscriptionId::new("sub"), 42));
        assert_eq!(msg.as_json(), r#"["COUNT","sub",{"count":42}]"#);

        let eose = RelayMessage::from_json(r#"["EOSE","sub"]"#).unwrap();
        assert_eq!(eose, RelayMessage::eose(SubscriptionId::new("sub")));
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Client messages

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use super::{MessageHandleError, SubscriptionId};
use crate::{Event, Filter, JsonUtil};

/// Messages sent by clients, received by relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Event
    Event(Box<Event>),
    /// Req
    Req {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Filters
        filters: Vec<Filter>,
    },
    /// Count
    ///
    /// <https://github.com/nostr-protocol/nips/blob/master/45.md>
    Count {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Filters
        filters: Vec<Filter>,
    },
    /// Close
    Close(SubscriptionId),
    /// Open a reconciliation session
    ///
    /// <https://github.com/nostr-protocol/nips/blob/master/77.md>
    NegOpen {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Filter
        filter: Box<Filter>,
        /// Initial message (hex)
        initial_message: String,
    },
    /// Reconciliation message
    NegMsg {
        /// Subscription ID
        subscription_id: SubscriptionId,
        /// Message (hex)
        message: String,
    },
    /// Close the reconciliation session
    NegClose {
        /// Subscription ID
        subscription_id: SubscriptionId,
    },
}

impl Serialize for ClientMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClientMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

impl ClientMessage {
    /// Create `EVENT` message
    #[inline]
    pub fn event(event: Event) -> Self {
        Self::Event(Box::new(event))
    }

    /// Create `REQ` message
    #[inline]
    pub fn req(subscription_id: SubscriptionId, filters: Vec<Filter>) -> Self {
        Self::Req {
            subscription_id,
            filters,
        }
    }

    /// Create `COUNT` message
    #[inline]
    pub fn count(subscription_id: SubscriptionId, filters: Vec<Filter>) -> Self {
        Self::Count {
            subscription_id,
            filters,
        }
    }

    /// Create `CLOSE` message
    #[inline]
    pub fn close(subscription_id: SubscriptionId) -> Self {
        Self::Close(subscription_id)
    }

    /// Check if is an `EVENT` message
    #[inline]
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Event(_))
    }

    /// Check if is an `REQ` message
    #[inline]
    pub fn is_req(&self) -> bool {
        matches!(self, Self::Req { .. })
    }

    /// Check if is an `CLOSE` message
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }

    /// Serialize as [`Value`]
    pub fn as_value(&self) -> Value {
        match self {
            Self::Event(event) => json!(["EVENT", event]),
            Self::Req {
                subscription_id,
                filters,
            } => with_filters("REQ", subscription_id, filters),
            Self::Count {
                subscription_id,
                filters,
            } => with_filters("COUNT", subscription_id, filters),
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
            Self::NegOpen {
                subscription_id,
                filter,
                initial_message,
            } => json!(["NEG-OPEN", subscription_id, filter, initial_message]),
            Self::NegMsg {
                subscription_id,
                message,
            } => json!(["NEG-MSG", subscription_id, message]),
            Self::NegClose { subscription_id } => json!(["NEG-CLOSE", subscription_id]),
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

        match v_type {
            // ["EVENT", <event JSON>]
            "EVENT" => {
                if v_len != 2 {
                    return Err(MessageHandleError::InvalidMessageFormat);
                }
                let event: Event = serde_json::from_value(v[1].clone())?;
                Ok(Self::event(event))
            }
            // ["REQ", <subscription_id>, <filter JSON>, <filter JSON>...]
            "REQ" | "COUNT" => {
                if v_len < 2 {
                    return Err(MessageHandleError::InvalidMessageFormat);
                }
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                let filters: Vec<Filter> = serde_json::from_value(Value::Array(v[2..].to_vec()))?;
                if v_type == "REQ" {
                    Ok(Self::req(subscription_id, filters))
                } else {
                    Ok(Self::count(subscription_id, filters))
                }
            }
            // ["CLOSE", <subscription_id>]
            "CLOSE" => {
                if v_len != 2 {
                    return Err(MessageHandleError::InvalidMessageFormat);
                }
                let subscription_id: SubscriptionId = serde_json::from_value(v[1].clone())?;
                Ok(Self::close(subscription_id))
            }
            // ["NEG-OPEN", <subscription ID>, <filter>, <initial message, hex>]
            "NEG-OPEN" => {
                if v_len != 4 {
                    return Err(MessageHandleError::InvalidMessageFormat);
                }
                Ok(Self::NegOpen {
                    subscription_id: serde_json::from_value(v[1].clone())?,
                    filter: Box::new(serde_json::from_value(v[2].clone())?),
                    initial_message: serde_json::from_value(v[3].clone())?,
                })
            }
            // ["NEG-MSG", <subscription ID>, <message, hex>]
            "NEG-MSG" => {
                if v_len != 3 {
                    return Err(MessageHandleError::InvalidMessageFormat);
                }
                Ok(Self::NegMsg {
                    subscription_id: serde_json::from_value(v[1].clone())?,
                    message: serde_json::from_value(v[2].clone())?,
                })
            }
            // ["NEG-CLOSE", <subscription ID>]
            "NEG-CLOSE" => {
                if v_len != 2 {
                    return Err(MessageHandleError::InvalidMessageFormat);
                }
                Ok(Self::NegClose {
                    subscription_id: serde_json::from_value(v[1].clone())?,
                })
            }
            _ => Err(MessageHandleError::InvalidMessageFormat),
        }
    }
}

impl JsonUtil for ClientMessage {
    type Err = MessageHandleError;

    /// Deserialize [`ClientMessage`] from JSON string
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

fn with_filters(kind: &str, subscription_id: &SubscriptionId, filters: &[Filter]) -> Value {
    let mut msg: Vec<Value> = Vec::with_capacity(2 + filters.len());
    msg.push(json!(kind));
    msg.push(json!(subscription_id));
    msg.extend(filters.iter().map(|f| json!(f)));
    Value::Array(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventBuilder, Keys, Kind};

    #[test]
    fn test_client_message_req() {
        let filters = vec![
            Filter::new().kind(Kind::Custom(22)),
            Filter::new().kind(Kind::Custom(23)).limit(5),
        ];
        let msg = ClientMessage::req(SubscriptionId::new("test"), filters.clone());
        assert_eq!(
            msg.as_json(),
            r#"["REQ","test",{"kinds":[22]},{"kinds":[23],"limit":5}]"#
        );
        assert_eq!(ClientMessage::from_json(msg.as_json()).unwrap(), msg);
    }

    #[test]
    fn test_client_message_event() {
        let keys = Keys::generate();
        let event = EventBuilder::text_note("hi").sign_with_keys(&keys).unwrap();
        let msg = ClientMessage::event(event.clone());
        match ClientMessage::from_json(msg.as_json()).unwrap() {
            ClientMessage::Event(e) => assert_eq!(*e, event),
            m => panic!("unexpected message: {m:?}"),
        }
    }

    #[test]
    fn test_client_message_neg() {
        let msg = ClientMessage::from_json(r#"["NEG-OPEN","sub",{"kinds":[1]},"6100"]"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::NegOpen {
                subscription_id: SubscriptionId::new("sub"),
                filter: Box::new(Filter::new().kind(Kind::TextNote)),
                initial_message: String::from("6100"),
            }
        );
    }

    #[test]
    fn test_invalid_client_messages() {
        assert!(matches!(
            ClientMessage::from_json(""),
            Err(MessageHandleError::EmptyMsg)
        ));
        assert!(ClientMessage::from_json("[]").is_err());
        assert!(ClientMessage::from_json(r#"["CLOSE"]"#).is_err());
        assert!(ClientMessage::from_json(r#"["HELLO","x"]"#).is_err());
        assert!(ClientMessage::from_json(r#"{"a":1}"#).is_err());
    }
}

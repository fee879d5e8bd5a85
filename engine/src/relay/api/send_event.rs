// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Duration;

use nostr_core::{ClientMessage, Event, EventId};

use crate::relay::constants::DEFAULT_SEND_EVENT_TIMEOUT;
use crate::relay::{Error, Relay};

/// Send event to relay
#[must_use = "Does nothing unless you await!"]
pub struct SendEvent<'relay, 'event> {
    relay: &'relay Relay,
    event: &'event Event,
    ok_timeout: Duration,
}

impl<'relay, 'event> SendEvent<'relay, 'event> {
    pub(crate) fn new(relay: &'relay Relay, event: &'event Event) -> Self {
        Self {
            relay,
            event,
            ok_timeout: DEFAULT_SEND_EVENT_TIMEOUT,
        }
    }

    /// Timeout for waiting for the `OK` message from relay (default: 10 sec)
    #[inline]
    pub fn ok_timeout(mut self, timeout: Duration) -> Self {
        self.ok_timeout = timeout;
        self
    }

    async fn exec(self) -> Result<EventId, Error> {
        // Subscribe before sending, the OK may arrive immediately
        let mut notifications = self.relay.notifications();

        self.relay
            .send_msg(ClientMessage::event(self.event.clone()))
            .await?;

        let (status, message) = self
            .relay
            .inner
            .wait_for_ok(&mut notifications, &self.event.id, self.ok_timeout)
            .await?;

        if status {
            Ok(self.event.id)
        } else {
            Err(Error::RelayMessage(message))
        }
    }
}

impl<'relay, 'event> IntoFuture for SendEvent<'relay, 'event>
where
    'event: 'relay,
{
    type Output = Result<EventId, Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'relay>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}

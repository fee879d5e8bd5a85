// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::time::Duration;

use nostr_core::policy::AdmitStatus;

use crate::relay::constants::DEFAULT_TRY_CONNECT_TIMEOUT;
use crate::relay::{Error, Relay, RelayStatus};

/// Single connection attempt, without retries on failure
#[must_use = "Does nothing unless you await!"]
pub struct TryConnect<'relay> {
    relay: &'relay Relay,
    timeout: Duration,
}

impl<'relay> TryConnect<'relay> {
    #[inline]
    pub(crate) fn new(relay: &'relay Relay) -> Self {
        Self {
            relay,
            timeout: DEFAULT_TRY_CONNECT_TIMEOUT,
        }
    }

    /// Handshake timeout (default: 60 sec)
    #[inline]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn exec(self) -> Result<(), Error> {
        match self.relay.status() {
            RelayStatus::Shutdown => return Err(Error::Shutdown),
            RelayStatus::Banned => return Err(Error::Banned),
            status if !status.can_connect() => return Ok(()),
            _ => {}
        }

        let relay = &self.relay.inner;

        if let AdmitStatus::Rejected { reason } = relay.state.admit_connection(&relay.url).await {
            relay.set_status(RelayStatus::Terminated, false);
            return Err(Error::ConnectionRejected { reason });
        }

        let stream = relay
            ._try_connect(self.timeout, RelayStatus::Terminated)
            .await?;
        relay.spawn_connection_task(Some(stream));

        Ok(())
    }
}

impl<'relay> IntoFuture for TryConnect<'relay> {
    type Output = Result<(), Error>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'relay>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Admission policies
//!
//! Shared by the client engine (events received on subscriptions) and the relay server
//! (events published directly by peers).

use std::fmt;

use crate::util::BoxedFuture;
use crate::{Event, RelayUrl, SubscriptionId};

/// Policy Error
#[derive(Debug)]
pub enum PolicyError {
    /// An error happened in the underlying backend.
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl std::error::Error for PolicyError {}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(e) => e.fmt(f),
        }
    }
}

impl PolicyError {
    /// Create a new backend error
    ///
    /// Shorthand for `Self::Backend(Box::new(error))`.
    #[inline]
    pub fn backend<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Backend(error.into())
    }
}

/// Admission status
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdmitStatus {
    /// Admission succeeds
    Success,
    /// Admission rejected
    Rejected {
        /// Optional reason
        reason: Option<String>,
    },
}

impl AdmitStatus {
    /// Success
    #[inline]
    pub fn success() -> Self {
        Self::Success
    }

    /// Rejection with reason
    #[inline]
    pub fn rejected<S>(reason: S) -> Self
    where
        S: Into<String>,
    {
        Self::Rejected {
            reason: Some(reason.into()),
        }
    }

    /// Check if admitted
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Collapse a policy result: an error counts as a rejection.
    pub fn from_result(res: Result<Self, PolicyError>) -> Self {
        match res {
            Ok(status) => status,
            Err(e) => Self::rejected(format!("policy error: {e}")),
        }
    }
}

/// Admission policy
pub trait AdmitPolicy: fmt::Debug + Send + Sync {
    /// Admit a connection
    ///
    /// On the client side `relay_url` is the relay being connected to; on the relay side it's
    /// the `ws://<addr>` of the connecting peer.
    ///
    /// Returns [`AdmitStatus::Success`] if the connection is allowed, otherwise [`AdmitStatus::Rejected`].
    fn admit_connection<'a>(
        &'a self,
        relay_url: &'a RelayUrl,
    ) -> BoxedFuture<'a, Result<AdmitStatus, PolicyError>> {
        let _ = relay_url;
        Box::pin(async move { Ok(AdmitStatus::Success) })
    }

    /// Admit [`Event`]
    ///
    /// `subscription_id` is `Some` for events received on a subscription and `None` for events
    /// published directly by a peer.
    ///
    /// Returns [`AdmitStatus::Success`] if the event is admitted, otherwise [`AdmitStatus::Rejected`].
    fn admit_event<'a>(
        &'a self,
        relay_url: &'a RelayUrl,
        subscription_id: Option<&'a SubscriptionId>,
        event: &'a Event,
    ) -> BoxedFuture<'a, Result<AdmitStatus, PolicyError>> {
        let _ = (relay_url, subscription_id, event);
        Box::pin(async move { Ok(AdmitStatus::Success) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventBuilder, Keys, PublicKey};

    #[derive(Debug)]
    struct AllowAll;

    impl AdmitPolicy for AllowAll {}

    #[derive(Debug)]
    struct BlockAuthor(PublicKey);

    impl AdmitPolicy for BlockAuthor {
        fn admit_event<'a>(
            &'a self,
            _relay_url: &'a RelayUrl,
            _subscription_id: Option<&'a SubscriptionId>,
            event: &'a Event,
        ) -> BoxedFuture<'a, Result<AdmitStatus, PolicyError>> {
            Box::pin(async move {
                if event.pubkey == self.0 {
                    return Ok(AdmitStatus::rejected("blocked author"));
                }
                Ok(AdmitStatus::success())
            })
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl AdmitPolicy for Broken {
        fn admit_connection<'a>(
            &'a self,
            _relay_url: &'a RelayUrl,
        ) -> BoxedFuture<'a, Result<AdmitStatus, PolicyError>> {
            Box::pin(async move { Err(PolicyError::backend("backend unavailable")) })
        }
    }

    #[tokio::test]
    async fn test_default_admits() {
        let url = RelayUrl::parse("ws://127.0.0.1:7777").unwrap();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("x").sign_with_keys(&keys).unwrap();

        let policy = AllowAll;
        assert!(policy.admit_connection(&url).await.unwrap().is_success());
        assert!(policy.admit_event(&url, None, &event).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_rejection() {
        let url = RelayUrl::parse("ws://127.0.0.1:7777").unwrap();
        let keys = Keys::generate();
        let event = EventBuilder::text_note("x").sign_with_keys(&keys).unwrap();
        let sub = SubscriptionId::new("s");

        let policy = BlockAuthor(keys.public_key());
        let status = policy.admit_event(&url, Some(&sub), &event).await.unwrap();
        assert_eq!(status, AdmitStatus::rejected("blocked author"));
    }

    #[tokio::test]
    async fn test_policy_error_is_rejection() {
        let url = RelayUrl::parse("ws://127.0.0.1:7777").unwrap();
        let status = AdmitStatus::from_result(Broken.admit_connection(&url).await);
        assert!(!status.is_success());
    }
}

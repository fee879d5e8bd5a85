// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Policies

use std::collections::HashSet;
use std::sync::Arc;

pub use nostr_core::policy::{AdmitPolicy, AdmitStatus, PolicyError};
use nostr_core::util::BoxedFuture;
use nostr_core::{Event, PublicKey, RelayUrl, SubscriptionId};
use tokio::sync::RwLock;

/// Reject every event authored by a muted public key
///
/// Cloning is cheap and clones share the same set, so a handle can be kept to mute/unmute keys
/// after the policy has been given to a client.
#[derive(Debug, Clone, Default)]
pub struct MutePolicy {
    muted: Arc<RwLock<HashSet<PublicKey>>>,
}

impl MutePolicy {
    /// New empty mute policy
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mute a public key
    ///
    /// Returns `true` if the key wasn't already muted.
    pub async fn mute(&self, public_key: PublicKey) -> bool {
        let mut muted = self.muted.write().await;
        muted.insert(public_key)
    }

    /// Unmute a public key
    ///
    /// Returns `true` if the key was muted.
    pub async fn unmute(&self, public_key: &PublicKey) -> bool {
        let mut muted = self.muted.write().await;
        muted.remove(public_key)
    }

    /// Check if a public key is muted
    pub async fn is_muted(&self, public_key: &PublicKey) -> bool {
        let muted = self.muted.read().await;
        muted.contains(public_key)
    }
}

impl AdmitPolicy for MutePolicy {
    fn admit_event<'a>(
        &'a self,
        _relay_url: &'a RelayUrl,
        _subscription_id: Option<&'a SubscriptionId>,
        event: &'a Event,
    ) -> BoxedFuture<'a, Result<AdmitStatus, PolicyError>> {
        Box::pin(async move {
            if self.is_muted(&event.pubkey).await {
                tracing::debug!(id = %event.id, author = %event.pubkey, "Event from muted author rejected.");
                return Ok(AdmitStatus::rejected("muted author"));
            }

            Ok(AdmitStatus::Success)
        })
    }
}

#[cfg(test)]
mod tests {
    use nostr_core::prelude::*;

    use super::*;

    #[tokio::test]
    async fn test_mute_unmute() {
        let policy = MutePolicy::new();
        let keys = Keys::generate();

        assert!(!policy.is_muted(&keys.public_key()).await);
        assert!(policy.mute(keys.public_key()).await);
        assert!(!policy.mute(keys.public_key()).await);
        assert!(policy.is_muted(&keys.public_key()).await);

        assert!(policy.unmute(&keys.public_key()).await);
        assert!(!policy.is_muted(&keys.public_key()).await);
    }

    #[tokio::test]
    async fn test_admission_ignores_url_and_subscription() {
        let policy = MutePolicy::new();
        let muted = Keys::generate();
        let other = Keys::generate();
        policy.mute(muted.public_key()).await;

        let muted_event = EventBuilder::text_note("muted").sign_with_keys(&muted).unwrap();
        let other_event = EventBuilder::text_note("other").sign_with_keys(&other).unwrap();

        let urls = [
            RelayUrl::parse("wss://relay.example.com").unwrap(),
            RelayUrl::parse("ws://127.0.0.1:7777").unwrap(),
        ];
        let ids = [
            None,
            Some(SubscriptionId::new("a")),
            Some(SubscriptionId::generate()),
        ];

        for url in urls.iter() {
            for id in ids.iter() {
                let status = policy
                    .admit_event(url, id.as_ref(), &muted_event)
                    .await
                    .unwrap();
                assert!(!status.is_success());

                let status = policy
                    .admit_event(url, id.as_ref(), &other_event)
                    .await
                    .unwrap();
                assert!(status.is_success());
            }
        }

        // The default connection policy stays permissive
        let status = policy.admit_connection(&urls[0]).await.unwrap();
        assert!(status.is_success());
    }

    #[tokio::test]
    async fn test_concurrent_mute_and_admit() {
        let policy = MutePolicy::new();
        let keys: Vec<Keys> = (0..20).map(|_| Keys::generate()).collect();
        let url = RelayUrl::parse("wss://relay.example.com").unwrap();

        let writer = {
            let policy = policy.clone();
            let keys = keys.clone();
            tokio::spawn(async move {
                for k in keys.iter() {
                    policy.mute(k.public_key()).await;
                }
            })
        };

        let event = EventBuilder::text_note("hello").sign_with_keys(&keys[0]).unwrap();
        for _ in 0..50 {
            policy.admit_event(&url, None, &event).await.unwrap();
        }

        writer.await.unwrap();

        let status = policy.admit_event(&url, None, &event).await.unwrap();
        assert_eq!(status, AdmitStatus::rejected("muted author"));
    }
}

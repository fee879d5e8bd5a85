// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! A mock relay for (unit) tests.

use std::ops::Deref;

use crate::builder::{LocalRelayBuilder, LocalRelayTestOptions};
use crate::error::Error;
use crate::local::LocalRelay;

/// A mock relay for (unit) tests.
///
/// In-memory storage, allow-all policy, random free port on localhost.
#[derive(Debug, Clone)]
pub struct MockRelay {
    local: LocalRelay,
}

impl Deref for MockRelay {
    type Target = LocalRelay;

    fn deref(&self) -> &Self::Target {
        &self.local
    }
}

impl MockRelay {
    /// Run mock relay
    #[inline]
    pub async fn run() -> Result<Self, Error> {
        Self::run_with_builder(LocalRelayBuilder::default()).await
    }

    /// Run mock relay with test options
    #[inline]
    pub async fn run_with_opts(opts: LocalRelayTestOptions) -> Result<Self, Error> {
        Self::run_with_builder(LocalRelayBuilder::default().test(opts)).await
    }

    /// Run mock relay from a custom builder
    pub async fn run_with_builder(builder: LocalRelayBuilder) -> Result<Self, Error> {
        let local: LocalRelay = builder.build();
        local.run().await?;
        Ok(Self { local })
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nostr_core::SubscriptionId;
use nostr_reconcile::Reconciler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RateLimiterResponse {
    Allowed,
    Limited,
}

/// Per-connection state owned by the receiver loop
pub(super) struct Session {
    /// Open reconciliations
    pub reconciliations: HashMap<SubscriptionId, Reconciler>,
    pub tokens: Tokens,
}

impl Session {
    pub fn new(notes_per_minute: u32) -> Self {
        Self {
            reconciliations: HashMap::new(),
            tokens: Tokens::new(notes_per_minute),
        }
    }

    pub fn check_rate_limit(&mut self, max_per_minute: u32) -> RateLimiterResponse {
        self.check_rate_limit_at(max_per_minute, Instant::now())
    }

    fn check_rate_limit_at(&mut self, max_per_minute: u32, now: Instant) -> RateLimiterResponse {
        match self.tokens.last {
            Some(last) => {
                // Refill at most a full minute worth of tokens
                let elapsed: Duration = now.saturating_duration_since(last).min(Tokens::WINDOW);
                if self.tokens.refill(max_per_minute, elapsed) {
                    self.tokens.last = Some(now);
                }
            }
            None => self.tokens.last = Some(now),
        }

        if self.tokens.count == 0 {
            return RateLimiterResponse::Limited;
        }

        self.tokens.count -= 1;

        RateLimiterResponse::Allowed
    }
}

/// Token bucket
pub(super) struct Tokens {
    pub count: u32,
    pub last: Option<Instant>,
}

impl Tokens {
    const WINDOW: Duration = Duration::from_secs(60);

    #[inline]
    pub fn new(tokens: u32) -> Self {
        Self {
            count: tokens,
            last: None,
        }
    }

    /// Returns `true` if at least one token was added
    fn refill(&mut self, max_per_minute: u32, elapsed: Duration) -> bool {
        let percent: f64 = elapsed.as_secs_f64() / Self::WINDOW.as_secs_f64();
        let new_tokens: u32 = (percent * f64::from(max_per_minute)).floor() as u32;
        self.count = self.count.saturating_add(new_tokens).min(max_per_minute);
        new_tokens > 0
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Range-based set reconciliation

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

mod error;
mod frame;
mod reconciler;
mod storage;

pub use self::error::Error;
pub use self::frame::{Bound, Fingerprint, Id, ID_SIZE, PROTOCOL_VERSION};
pub use self::reconciler::Reconciler;
pub use self::storage::Storage;

/// Ranges holding up to this number of items are listed instead of split
pub const LIST_THRESHOLD: usize = 16;

/// Number of sub-ranges produced by a split
pub const BRANCHING: usize = 16;

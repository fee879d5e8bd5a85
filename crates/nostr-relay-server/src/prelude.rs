// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Prelude

#![allow(unknown_lints)]
#![allow(ambiguous_glob_reexports)]
#![doc(hidden)]

pub use nostr_core::prelude::*;
pub use nostr_storage::prelude::*;
pub use nostr_storage_memory::prelude::*;

pub use crate::builder::*;
pub use crate::error::*;
pub use crate::local::*;
pub use crate::mock::*;
pub use crate::*;

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

use std::fmt;

/// Reconciliation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Storage already sealed
    AlreadySealed,
    /// Storage not sealed
    NotSealed,
    /// Initiator-only operation called on a responder, or vice versa
    UnexpectedRole {
        /// Whether the reconciler is the initiator
        initiator: bool,
    },
    /// Already initiated
    AlreadyInitiated,
    /// Unsupported protocol version
    UnsupportedVersion(u8),
    /// Message ended before the frame was complete
    UnexpectedEndOfInput,
    /// Unknown bound tag
    InvalidBound(u8),
    /// Unknown mode
    InvalidMode(u8),
    /// Varint doesn't fit in 64 bits
    VarintOverflow,
    /// Range is empty or reversed, or split doesn't cover it
    InvalidRange,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySealed => write!(f, "already sealed"),
            Self::NotSealed => write!(f, "not sealed"),
            Self::UnexpectedRole { initiator: true } => {
                write!(f, "operation not allowed for the initiator")
            }
            Self::UnexpectedRole { initiator: false } => {
                write!(f, "operation allowed only for the initiator")
            }
            Self::AlreadyInitiated => write!(f, "already initiated"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported protocol version: {v:#04x}"),
            Self::UnexpectedEndOfInput => write!(f, "unexpected end of input"),
            Self::InvalidBound(tag) => write!(f, "invalid bound: {tag}"),
            Self::InvalidMode(mode) => write!(f, "invalid mode: {mode}"),
            Self::VarintOverflow => write!(f, "varint overflow"),
            Self::InvalidRange => write!(f, "invalid range"),
        }
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Machine-readable prefixes of `OK` and `CLOSED` messages
//!
//! <https://github.com/nostr-protocol/nips/blob/master/01.md>

use std::fmt;

/// Machine-readable prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineReadablePrefix {
    /// `duplicate:`
    Duplicate,
    /// `pow:`
    Pow,
    /// `blocked:`
    Blocked,
    /// `rate-limited:`
    RateLimited,
    /// `invalid:`
    Invalid,
    /// `error:`
    Error,
    /// `unsupported:`
    Unsupported,
    /// `auth-required:`
    AuthRequired,
    /// `restricted:`
    Restricted,
}

impl fmt::Display for MachineReadablePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate:"),
            Self::Pow => write!(f, "pow:"),
            Self::Blocked => write!(f, "blocked:"),
            Self::RateLimited => write!(f, "rate-limited:"),
            Self::Invalid => write!(f, "invalid:"),
            Self::Error => write!(f, "error:"),
            Self::Unsupported => write!(f, "unsupported:"),
            Self::AuthRequired => write!(f, "auth-required:"),
            Self::Restricted => write!(f, "restricted:"),
        }
    }
}

impl MachineReadablePrefix {
    /// Parse the prefix of a message, if any
    pub fn parse(message: &str) -> Option<Self> {
        let (prefix, _) = message.split_once(':')?;
        match prefix {
            "duplicate" => Some(Self::Duplicate),
            "pow" => Some(Self::Pow),
            "blocked" => Some(Self::Blocked),
            "rate-limited" => Some(Self::RateLimited),
            "invalid" => Some(Self::Invalid),
            "error" => Some(Self::Error),
            "unsupported" => Some(Self::Unsupported),
            "auth-required" => Some(Self::AuthRequired),
            "restricted" => Some(Self::Restricted),
            _ => None,
        }
    }

    /// Compose `<prefix> <message>`
    #[inline]
    pub fn with_message<S>(self, message: S) -> String
    where
        S: AsRef<str>,
    {
        format!("{self} {}", message.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prefix() {
        assert_eq!(
            MachineReadablePrefix::parse("duplicate: already have this event"),
            Some(MachineReadablePrefix::Duplicate)
        );
        assert_eq!(
            MachineReadablePrefix::parse("rate-limited: slow down"),
            Some(MachineReadablePrefix::RateLimited)
        );
        assert_eq!(MachineReadablePrefix::parse("hello"), None);
        assert_eq!(MachineReadablePrefix::parse("unknown: x"), None);
    }

    #[test]
    fn test_with_message() {
        assert_eq!(
            MachineReadablePrefix::Blocked.with_message("muted author"),
            "blocked: muted author"
        );
    }
}

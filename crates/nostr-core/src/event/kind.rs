// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Kind

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// NIP-01 regular range
pub const REGULAR_RANGE: Range<u16> = 1_000..10_000;
/// NIP-01 replaceable range
pub const REPLACEABLE_RANGE: Range<u16> = 10_000..20_000;
/// NIP-01 ephemeral range
pub const EPHEMERAL_RANGE: Range<u16> = 20_000..30_000;
/// NIP-01 addressable range
pub const ADDRESSABLE_RANGE: Range<u16> = 30_000..40_000;

macro_rules! kind_variants {
    ($($name:ident => $value:literal, $doc:literal),* $(,)?) => {
        /// Event kind
        #[derive(Debug, Clone, Copy)]
        pub enum Kind {
            $(
                #[doc = $doc]
                $name,
            )*
            /// Custom
            Custom(u16),
        }

        impl From<u16> for Kind {
            fn from(kind: u16) -> Self {
                match kind {
                    $(
                        $value => Self::$name,
                    )*
                    x => Self::Custom(x),
                }
            }
        }

        impl From<Kind> for u16 {
            fn from(kind: Kind) -> Self {
                match kind {
                    $(
                        Kind::$name => $value,
                    )*
                    Kind::Custom(kind) => kind,
                }
            }
        }
    };
}

kind_variants! {
    Metadata => 0, "User metadata (NIP-01)",
    TextNote => 1, "Short text note (NIP-01)",
    ContactList => 3, "Contact list (NIP-02)",
    EventDeletion => 5, "Event deletion request (NIP-09)",
    Repost => 6, "Repost (NIP-18)",
    Reaction => 7, "Reaction (NIP-25)",
    RelayList => 10002, "Relay list metadata (NIP-65)",
    Authentication => 22242, "Client authentication (NIP-42)",
    LongFormTextNote => 30023, "Long-form text note (NIP-23)",
}

impl Kind {
    /// Get as `u16`
    #[inline]
    pub fn as_u16(&self) -> u16 {
        (*self).into()
    }

    /// Check if it's regular
    ///
    /// Regular events are stored by relays. Kinds `1`, `2` and `4..45` are regular for historical reasons.
    pub fn is_regular(&self) -> bool {
        let kind: u16 = self.as_u16();

        if kind == 1 || kind == 2 || (4..45).contains(&kind) {
            return true;
        }

        REGULAR_RANGE.contains(&kind)
    }

    /// Check if it's replaceable
    ///
    /// Only the latest event per `pubkey` and `kind` is kept. Kinds `0` and `3` are replaceable.
    pub fn is_replaceable(&self) -> bool {
        let kind: u16 = self.as_u16();

        if kind == 0 || kind == 3 {
            return true;
        }

        REPLACEABLE_RANGE.contains(&kind)
    }

    /// Check if it's ephemeral
    ///
    /// Ephemeral events are not expected to be stored by relays.
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        EPHEMERAL_RANGE.contains(&self.as_u16())
    }

    /// Check if it's addressable
    ///
    /// Only the latest event per `pubkey`, `kind` and `d` tag is kept.
    #[inline]
    pub fn is_addressable(&self) -> bool {
        ADDRESSABLE_RANGE.contains(&self.as_u16())
    }
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        self.as_u16() == other.as_u16()
    }
}

impl Eq for Kind {}

impl PartialOrd for Kind {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Kind {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_u16().cmp(&other.as_u16())
    }
}

impl Hash for Kind {
    fn hash<H>(&self, state: &mut H)
    where
        H: Hasher,
    {
        self.as_u16().hash(state);
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

impl Serialize for Kind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.as_u16())
    }
}

impl<'de> Deserialize<'de> for Kind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let kind: u16 = u16::deserialize(deserializer)?;
        Ok(Self::from(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_equals_known() {
        assert_eq!(Kind::Custom(1), Kind::TextNote);
        assert_eq!(Kind::from(0), Kind::Metadata);
        assert_eq!(Kind::from(30023), Kind::LongFormTextNote);
    }

    #[test]
    fn test_kind_ranges() {
        assert!(Kind::TextNote.is_regular());
        assert!(Kind::Metadata.is_replaceable());
        assert!(Kind::ContactList.is_replaceable());
        assert!(Kind::Custom(10_100).is_replaceable());
        assert!(Kind::Custom(22_222).is_ephemeral());
        assert!(Kind::LongFormTextNote.is_addressable());
        assert!(!Kind::Custom(22_222).is_regular());
    }
}

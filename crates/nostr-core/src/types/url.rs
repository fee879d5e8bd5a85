// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay URL

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::{ParseError, Url};

/// Relay URL error
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Url parse error
    Url(ParseError),
    /// Unsupported URL scheme
    UnsupportedScheme,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(e) => write!(f, "{e}"),
            Self::UnsupportedScheme => write!(f, "Unsupported scheme"),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Url(e)
    }
}

/// Relay URL
///
/// Only `ws://` and `wss://` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelayUrl {
    url: Url,
}

impl RelayUrl {
    /// Parse relay URL
    pub fn parse<S>(url: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let url: Url = Url::parse(url.as_ref())?;

        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            _ => Err(Error::UnsupportedScheme),
        }
    }

    /// Compose a `ws://` URL for a socket address
    #[inline]
    pub fn from_socket_addr(addr: &SocketAddr) -> Result<Self, Error> {
        Self::parse(format!("ws://{addr}"))
    }

    /// Get as `&str`
    #[inline]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Get the inner [`Url`]
    #[inline]
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// Check if the host is a loopback or private address
    pub fn is_local_network(&self) -> bool {
        match self.url.host() {
            Some(url::Host::Ipv4(ip)) => ip.is_loopback() || ip.is_private(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            Some(url::Host::Domain(domain)) => domain == "localhost",
            None => false,
        }
    }
}

impl FromStr for RelayUrl {
    type Err = Error;

    #[inline]
    fn from_str(url: &str) -> Result<Self, Self::Err> {
        Self::parse(url)
    }
}

impl fmt::Display for RelayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Strip the trailing slash added by the parser for host-only URLs
        let url: &str = self.url.as_str();
        f.write_str(url.strip_suffix('/').unwrap_or(url))
    }
}

/// Try into [`RelayUrl`]
pub trait TryIntoRelayUrl {
    /// Try into [`RelayUrl`]
    fn try_into_relay_url(self) -> Result<RelayUrl, Error>;
}

impl TryIntoRelayUrl for RelayUrl {
    #[inline]
    fn try_into_relay_url(self) -> Result<RelayUrl, Error> {
        Ok(self)
    }
}

impl TryIntoRelayUrl for &RelayUrl {
    #[inline]
    fn try_into_relay_url(self) -> Result<RelayUrl, Error> {
        Ok(self.clone())
    }
}

impl TryIntoRelayUrl for &str {
    #[inline]
    fn try_into_relay_url(self) -> Result<RelayUrl, Error> {
        RelayUrl::parse(self)
    }
}

impl TryIntoRelayUrl for String {
    #[inline]
    fn try_into_relay_url(self) -> Result<RelayUrl, Error> {
        RelayUrl::parse(self)
    }
}

impl Serialize for RelayUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RelayUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let url: String = String::deserialize(deserializer)?;
        Self::parse(url).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relay_url() {
        let url = RelayUrl::parse("wss://relay.example.com").unwrap();
        assert_eq!(url.to_string(), "wss://relay.example.com");
        assert!(!url.is_local_network());

        let url = RelayUrl::parse("ws://127.0.0.1:7777").unwrap();
        assert_eq!(url.to_string(), "ws://127.0.0.1:7777");
        assert!(url.is_local_network());
    }

    #[test]
    fn test_try_into_relay_url() {
        let url = "wss://relay.example.com".try_into_relay_url().unwrap();
        assert_eq!((&url).try_into_relay_url().unwrap(), url);
        assert_eq!(
            "https://relay.example.com".try_into_relay_url(),
            Err(Error::UnsupportedScheme)
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        assert_eq!(
            RelayUrl::parse("https://relay.example.com").unwrap_err(),
            Error::UnsupportedScheme
        );
        assert!(RelayUrl::parse("not a url").is_err());
    }
}

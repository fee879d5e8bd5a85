// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Event builder

use secp256k1::schnorr::Signature;
use secp256k1::Message;

use super::{Error, Event, EventId, Kind, Tag};
use crate::{Keys, PublicKey, Timestamp};

/// Event builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBuilder {
    kind: Kind,
    tags: Vec<Tag>,
    content: String,
    custom_created_at: Option<Timestamp>,
}

impl EventBuilder {
    /// New event builder
    pub fn new<S>(kind: Kind, content: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            kind,
            tags: Vec::new(),
            content: content.into(),
            custom_created_at: None,
        }
    }

    /// Text note
    ///
    /// <https://github.com/nostr-protocol/nips/blob/master/01.md>
    #[inline]
    pub fn text_note<S>(content: S) -> Self
    where
        S: Into<String>,
    {
        Self::new(Kind::TextNote, content)
    }

    /// Profile metadata (the content is a JSON object)
    #[inline]
    pub fn metadata(metadata: &serde_json::Value) -> Self {
        Self::new(Kind::Metadata, metadata.to_string())
    }

    /// Event deletion request
    ///
    /// <https://github.com/nostr-protocol/nips/blob/master/09.md>
    pub fn delete<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = EventId>,
    {
        Self::new(Kind::EventDeletion, "").tags(ids.into_iter().map(Tag::event))
    }

    /// Add tag
    #[inline]
    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    /// Add tags
    #[inline]
    pub fn tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = Tag>,
    {
        self.tags.extend(tags);
        self
    }

    /// Set a custom `created_at` [`Timestamp`]
    #[inline]
    pub fn custom_created_at(mut self, created_at: Timestamp) -> Self {
        self.custom_created_at = Some(created_at);
        self
    }

    /// Build, compute the ID and sign with [`Keys`]
    pub fn sign_with_keys(self, keys: &Keys) -> Result<Event, Error> {
        let pubkey: PublicKey = keys.public_key();
        let created_at: Timestamp = self.custom_created_at.unwrap_or_else(Timestamp::now);
        let id: EventId = EventId::new(&pubkey, &created_at, &self.kind, &self.tags, &self.content);
        let message: Message = Message::from_digest(id.to_bytes());
        let sig: Signature = keys.sign_schnorr(&message);

        let event = Event {
            id,
            pubkey,
            created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        };

        // Catch a broken signer before the event leaves this crate
        event.verify()?;

        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_builder() {
        let keys = Keys::generate();
        let note = EventBuilder::text_note("to delete")
            .sign_with_keys(&keys)
            .unwrap();
        let deletion = EventBuilder::delete([note.id])
            .sign_with_keys(&keys)
            .unwrap();
        assert_eq!(deletion.kind, Kind::EventDeletion);
        assert_eq!(deletion.event_ids().collect::<Vec<_>>(), vec![note.id]);
    }

    #[test]
    fn test_custom_created_at() {
        let keys = Keys::generate();
        let ts = Timestamp::from_secs(1_600_000_000);
        let event = EventBuilder::text_note("past")
            .custom_created_at(ts)
            .sign_with_keys(&keys)
            .unwrap();
        assert_eq!(event.created_at, ts);
    }
}

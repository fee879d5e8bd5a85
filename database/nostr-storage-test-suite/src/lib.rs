// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Shared test cases for [`NostrDatabase`](nostr_storage::NostrDatabase) implementations

pub extern crate tokio;

/// Generate the common storage tests for `$store_type`.
///
/// `$store_type` must deref to a `NostrDatabase`; `$setup_fn` is an async constructor returning
/// an empty store.
#[macro_export]
macro_rules! database_unit_tests {
    ($store_type:ty, $setup_fn:expr) => {
        use std::ops::Deref;
        use std::time::Duration;

        use nostr_storage::prelude::*;

        use $crate::tokio;

        const BASE_TIME: u64 = 1_700_000_000;

        fn signed(keys: &Keys, builder: EventBuilder) -> Event {
            builder.sign_with_keys(keys).unwrap()
        }

        fn note(keys: &Keys, content: &str, secs: u64) -> Event {
            signed(
                keys,
                EventBuilder::text_note(content).custom_created_at(Timestamp::from_secs(secs)),
            )
        }

        fn addressable(keys: &Keys, identifier: &str, content: &str, secs: u64) -> Event {
            signed(
                keys,
                EventBuilder::new(Kind::Custom(33_333), content)
                    .tag(Tag::identifier(identifier))
                    .custom_created_at(Timestamp::from_secs(secs)),
            )
        }

        fn deletion(keys: &Keys, tags: Vec<Tag>, secs: u64) -> Event {
            signed(
                keys,
                EventBuilder::new(Kind::EventDeletion, "")
                    .tags(tags)
                    .custom_created_at(Timestamp::from_secs(secs)),
            )
        }

        async fn stored(store: &$store_type, event: &Event) -> SaveEventStatus {
            store.save_event(event).await.unwrap()
        }

        async fn total(store: &$store_type) -> usize {
            store.count(Filter::new()).await.unwrap()
        }

        #[tokio::test]
        async fn test_save_and_lookup() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();
            let event = note(&keys, "hello", BASE_TIME);

            assert_eq!(
                store.check_id(&event.id).await.unwrap(),
                DatabaseEventStatus::NotExistent
            );
            assert_eq!(stored(&store, &event).await, SaveEventStatus::Success);
            assert_eq!(
                store.check_id(&event.id).await.unwrap(),
                DatabaseEventStatus::Saved
            );
            assert_eq!(store.event_by_id(&event.id).await.unwrap(), Some(event.clone()));

            // Same event again
            assert_eq!(
                stored(&store, &event).await,
                SaveEventStatus::Rejected(RejectedReason::Duplicate)
            );
            assert_eq!(total(&store).await, 1);
        }

        #[tokio::test]
        async fn test_invalid_events_rejected() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();
            let genuine = note(&keys, "genuine", BASE_TIME);

            // Content changed after signing: the id no longer matches
            let mut tampered = genuine.clone();
            tampered.content = String::from("tampered");
            assert_eq!(
                stored(&store, &tampered).await,
                SaveEventStatus::Rejected(RejectedReason::Invalid)
            );

            // Signature taken from another event
            let other = note(&keys, "other", BASE_TIME + 1);
            let mut wrong_sig = genuine.clone();
            wrong_sig.sig = other.sig;
            assert_eq!(
                stored(&store, &wrong_sig).await,
                SaveEventStatus::Rejected(RejectedReason::Invalid)
            );

            assert_eq!(total(&store).await, 0);
            assert_eq!(
                store.check_id(&genuine.id).await.unwrap(),
                DatabaseEventStatus::NotExistent
            );

            // The rejected copies don't shadow the genuine event
            assert_eq!(stored(&store, &genuine).await, SaveEventStatus::Success);
            assert_eq!(
                store.event_by_id(&genuine.id).await.unwrap().map(|e| e.content),
                Some(String::from("genuine"))
            );
        }

        #[tokio::test]
        async fn test_query_order_limit_and_count() {
            let store: $store_type = $setup_fn().await;
            let alice = Keys::generate();
            let bob = Keys::generate();

            for i in 0..6 {
                stored(&store, &note(&alice, &format!("alice {i}"), BASE_TIME + i)).await;
            }
            stored(&store, &note(&bob, "bob", BASE_TIME + 100)).await;

            let all = store.query(Filter::new()).await.unwrap().to_vec();
            let times: Vec<u64> = all.iter().map(|e| e.created_at.as_secs()).collect();
            assert_eq!(
                times,
                vec![BASE_TIME + 100, BASE_TIME + 5, BASE_TIME + 4, BASE_TIME + 3, BASE_TIME + 2, BASE_TIME + 1, BASE_TIME]
            );

            let by_alice = Filter::new().author(alice.public_key());
            assert_eq!(store.count(by_alice.clone()).await.unwrap(), 6);

            let newest = store.query(by_alice.limit(2)).await.unwrap().to_vec();
            let contents: Vec<&str> = newest.iter().map(|e| e.content.as_str()).collect();
            assert_eq!(contents, vec!["alice 5", "alice 4"]);

            let window = Filter::new()
                .since(Timestamp::from_secs(BASE_TIME + 2))
                .until(Timestamp::from_secs(BASE_TIME + 4));
            assert_eq!(store.query(window.clone()).await.unwrap().len(), 3);
            assert_eq!(store.count(window).await.unwrap(), 3);
        }

        #[tokio::test]
        async fn test_query_by_tag() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();

            let tagged = signed(&keys, EventBuilder::text_note("rust").tag(Tag::hashtag("rust")));
            let untagged = signed(&keys, EventBuilder::text_note("plain"));
            let reply = signed(&keys, EventBuilder::text_note("reply").tag(Tag::event(tagged.id)));
            for event in [&tagged, &untagged, &reply] {
                assert!(stored(&store, event).await.is_success());
            }

            let events = store.query(Filter::new().hashtag("rust")).await.unwrap();
            assert_eq!(events.to_vec(), vec![tagged.clone()]);

            let events = store.query(Filter::new().event(tagged.id)).await.unwrap();
            assert_eq!(events.to_vec(), vec![reply]);

            let ids = Filter::new().ids([tagged.id, untagged.id]);
            assert_eq!(store.count(ids).await.unwrap(), 2);
        }

        #[tokio::test]
        async fn test_replaceable_keeps_newest() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();
            let profile = |name: &str, secs: u64| {
                signed(
                    &keys,
                    EventBuilder::new(Kind::Metadata, format!(r#"{{"name":"{name}"}}"#))
                        .custom_created_at(Timestamp::from_secs(secs)),
                )
            };

            let first = profile("first", BASE_TIME);
            let second = profile("second", BASE_TIME + 10);
            let stale = profile("stale", BASE_TIME + 5);

            assert_eq!(stored(&store, &first).await, SaveEventStatus::Success);
            assert_eq!(stored(&store, &second).await, SaveEventStatus::Success);
            assert_eq!(
                stored(&store, &stale).await,
                SaveEventStatus::Rejected(RejectedReason::Replaced)
            );

            let filter = Filter::new().author(keys.public_key()).kind(Kind::Metadata);
            assert_eq!(store.query(filter).await.unwrap().to_vec(), vec![second]);
            assert_eq!(store.event_by_id(&first.id).await.unwrap(), None);
            assert_eq!(total(&store).await, 1);
        }

        #[tokio::test]
        async fn test_replaceable_tie_prefers_lowest_id() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();
            let at = Timestamp::from_secs(BASE_TIME);
            let a = signed(&keys, EventBuilder::new(Kind::Metadata, "{}").custom_created_at(at));
            let b = signed(&keys, EventBuilder::new(Kind::Metadata, "{ }").custom_created_at(at));
            let (low, high) = if a.id < b.id { (a, b) } else { (b, a) };
            let filter = Filter::new().author(keys.public_key()).kind(Kind::Metadata);

            assert_eq!(stored(&store, &low).await, SaveEventStatus::Success);
            assert_eq!(
                stored(&store, &high).await,
                SaveEventStatus::Rejected(RejectedReason::Replaced)
            );
            assert_eq!(store.query(filter.clone()).await.unwrap().to_vec(), vec![low.clone()]);

            store.wipe().await.unwrap();

            assert_eq!(stored(&store, &high).await, SaveEventStatus::Success);
            assert_eq!(stored(&store, &low).await, SaveEventStatus::Success);
            assert_eq!(store.query(filter).await.unwrap().to_vec(), vec![low]);
        }

        #[tokio::test]
        async fn test_addressable_by_identifier() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();

            let list_a = addressable(&keys, "a", "v1", BASE_TIME);
            let list_b = addressable(&keys, "b", "v1", BASE_TIME);
            let list_a2 = addressable(&keys, "a", "v2", BASE_TIME + 60);
            let list_a_old = addressable(&keys, "a", "v0", BASE_TIME - 60);

            assert!(stored(&store, &list_a).await.is_success());
            assert!(stored(&store, &list_b).await.is_success());
            assert!(stored(&store, &list_a2).await.is_success());
            assert_eq!(
                stored(&store, &list_a_old).await,
                SaveEventStatus::Rejected(RejectedReason::Replaced)
            );

            let by_a = Filter::new()
                .author(keys.public_key())
                .kind(Kind::Custom(33_333))
                .identifier("a");
            assert_eq!(store.query(by_a).await.unwrap().to_vec(), vec![list_a2]);
            assert_eq!(total(&store).await, 2);

            // Missing `d` tag
            let anonymous = signed(&keys, EventBuilder::new(Kind::Custom(33_333), "no d"));
            assert_eq!(
                stored(&store, &anonymous).await,
                SaveEventStatus::Rejected(RejectedReason::Invalid)
            );
        }

        #[tokio::test]
        async fn test_deletion_by_id() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();
            let target = note(&keys, "to be deleted", BASE_TIME);
            let kept = note(&keys, "kept", BASE_TIME + 1);
            stored(&store, &target).await;
            stored(&store, &kept).await;

            let request = deletion(&keys, vec![Tag::event(target.id)], BASE_TIME + 10);
            assert_eq!(stored(&store, &request).await, SaveEventStatus::Success);

            assert_eq!(
                store.check_id(&target.id).await.unwrap(),
                DatabaseEventStatus::Deleted
            );
            assert_eq!(store.event_by_id(&target.id).await.unwrap(), None);
            assert_eq!(
                stored(&store, &target).await,
                SaveEventStatus::Rejected(RejectedReason::Deleted)
            );

            let notes = Filter::new().author(keys.public_key()).kind(Kind::TextNote);
            assert_eq!(store.query(notes).await.unwrap().to_vec(), vec![kept]);

            // The request itself stays queryable
            let requests = store.query(Filter::new().kind(Kind::EventDeletion)).await.unwrap();
            assert_eq!(requests.to_vec(), vec![request]);
        }

        #[tokio::test]
        async fn test_deletion_of_foreign_event() {
            let store: $store_type = $setup_fn().await;
            let owner = Keys::generate();
            let stranger = Keys::generate();
            let target = note(&owner, "mine", BASE_TIME);
            stored(&store, &target).await;

            let request = deletion(&stranger, vec![Tag::event(target.id)], BASE_TIME + 10);
            assert_eq!(
                stored(&store, &request).await,
                SaveEventStatus::Rejected(RejectedReason::InvalidDelete)
            );
            assert_eq!(
                store.check_id(&target.id).await.unwrap(),
                DatabaseEventStatus::Saved
            );
            assert_eq!(total(&store).await, 1);
        }

        #[tokio::test]
        async fn test_deletion_by_coordinate() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();
            let list = addressable(&keys, "feeds", "v1", BASE_TIME);
            stored(&store, &list).await;

            let coordinate = format!("{}:{}:feeds", Kind::Custom(33_333).as_u16(), keys.public_key());
            let request = deletion(&keys, vec![Tag::custom("a", [coordinate])], BASE_TIME + 100);
            assert_eq!(stored(&store, &request).await, SaveEventStatus::Success);
            assert_eq!(store.event_by_id(&list.id).await.unwrap(), None);

            // Versions up to the request timestamp stay deleted
            let stale = addressable(&keys, "feeds", "v2", BASE_TIME + 50);
            assert_eq!(
                stored(&store, &stale).await,
                SaveEventStatus::Rejected(RejectedReason::Deleted)
            );

            let fresh = addressable(&keys, "feeds", "v3", BASE_TIME + 200);
            assert_eq!(stored(&store, &fresh).await, SaveEventStatus::Success);
        }

        #[tokio::test]
        async fn test_expired_event_rejected() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();
            let expired = signed(
                &keys,
                EventBuilder::text_note("gone")
                    .tag(Tag::expiration(Timestamp::now() - Duration::from_secs(60))),
            );
            assert_eq!(
                stored(&store, &expired).await,
                SaveEventStatus::Rejected(RejectedReason::Expired)
            );
            assert_eq!(total(&store).await, 0);
        }

        #[tokio::test]
        async fn test_delete_by_filter_and_wipe() {
            let store: $store_type = $setup_fn().await;
            let alice = Keys::generate();
            let bob = Keys::generate();
            for i in 0..3 {
                stored(&store, &note(&alice, "a", BASE_TIME + i)).await;
                stored(&store, &note(&bob, "b", BASE_TIME + i)).await;
            }

            store.delete(Filter::new().author(alice.public_key())).await.unwrap();
            assert_eq!(store.count(Filter::new().author(alice.public_key())).await.unwrap(), 0);
            assert_eq!(total(&store).await, 3);

            store.wipe().await.unwrap();
            assert_eq!(total(&store).await, 0);
        }

        #[tokio::test]
        async fn test_sync_items_match_query() {
            let store: $store_type = $setup_fn().await;
            let keys = Keys::generate();
            let mut expected = Vec::new();
            for i in 0..4 {
                let event = note(&keys, "sync", BASE_TIME + i);
                stored(&store, &event).await;
                expected.push(event.id);
            }
            stored(&store, &note(&Keys::generate(), "noise", BASE_TIME)).await;

            let mut items = store
                .sync_items(Filter::new().author(keys.public_key()))
                .await
                .unwrap();
            items.sort();
            expected.sort();
            assert_eq!(items, expected);
        }

        #[tokio::test]
        async fn test_full_text_search() {
            let store: $store_type = $setup_fn().await;

            if !store.features().full_text_search {
                return;
            }

            let keys = Keys::generate();
            stored(&store, &note(&keys, "Rust is COOL", BASE_TIME)).await;
            stored(&store, &note(&keys, "another note", BASE_TIME + 1)).await;

            assert_eq!(store.query(Filter::new().search("rust is cool")).await.unwrap().len(), 1);
            assert_eq!(store.query(Filter::new().search("note")).await.unwrap().len(), 1);
            assert!(store.query(Filter::new().search("hola")).await.unwrap().is_empty());
        }
    };
}

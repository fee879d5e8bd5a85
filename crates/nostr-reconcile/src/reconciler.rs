// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2025 Rust Nostr Developers
// Distributed under the MIT software license

//! Reconciler

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::ops::Range;

use crate::error::Error;
use crate::frame::{self, Bound, Entry, Fingerprint, Id, Mode, SubRange};
use crate::storage::Storage;
use crate::{BRANCHING, LIST_THRESHOLD};

/// Set reconciliation state machine
///
/// The initiator calls [`Reconciler::initiate`] and feeds every reply to
/// [`Reconciler::reconcile_with_ids`] until it returns `None`. The responder answers each
/// message with [`Reconciler::reconcile`].
#[derive(Debug)]
pub struct Reconciler {
    storage: Storage,
    initiator: bool,
    /// Ranges fully listed in the last outgoing message
    listed: HashSet<(Bound, Bound)>,
}

impl Reconciler {
    /// Construct new reconciler
    ///
    /// The storage must be sealed.
    pub fn new(storage: Storage) -> Result<Self, Error> {
        if !storage.is_sealed() {
            return Err(Error::NotSealed);
        }

        Ok(Self {
            storage,
            initiator: false,
            listed: HashSet::new(),
        })
    }

    /// Check if this is the initiator
    #[inline]
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    /// Build the initial message: the fingerprint of the whole set
    pub fn initiate(&mut self) -> Result<Vec<u8>, Error> {
        if self.initiator {
            return Err(Error::AlreadyInitiated);
        }

        self.initiator = true;

        let range: Range<usize> = self.storage.range(&Bound::Min, &Bound::Max);
        let entry = Entry {
            lower: Bound::Min,
            upper: Bound::Max,
            mode: Mode::Fingerprint(self.storage.fingerprint(range)),
        };

        Ok(frame::encode(&[entry]))
    }

    /// Answer a message (responder only)
    pub fn reconcile(&mut self, query: &[u8]) -> Result<Vec<u8>, Error> {
        if self.initiator {
            return Err(Error::UnexpectedRole { initiator: true });
        }

        let mut have: BTreeSet<Id> = BTreeSet::new();
        let mut need: BTreeSet<Id> = BTreeSet::new();
        let output: Vec<Entry> = self.process(query, &mut have, &mut need)?;
        Ok(frame::encode(&output))
    }

    /// Process a reply (initiator only)
    ///
    /// IDs only the local side holds are added to `have`, IDs only the remote side holds to
    /// `need`. Returns the next message, or `None` once reconciliation is complete.
    pub fn reconcile_with_ids(
        &mut self,
        query: &[u8],
        have: &mut Vec<Id>,
        need: &mut Vec<Id>,
    ) -> Result<Option<Vec<u8>>, Error> {
        if !self.initiator {
            return Err(Error::UnexpectedRole { initiator: false });
        }

        let mut have_set: BTreeSet<Id> = BTreeSet::new();
        let mut need_set: BTreeSet<Id> = BTreeSet::new();
        let output: Vec<Entry> = self.process(query, &mut have_set, &mut need_set)?;

        have.extend(have_set);
        need.extend(need_set);

        if output.is_empty() {
            return Ok(None);
        }

        Ok(Some(frame::encode(&output)))
    }

    fn process(
        &mut self,
        query: &[u8],
        have: &mut BTreeSet<Id>,
        need: &mut BTreeSet<Id>,
    ) -> Result<Vec<Entry>, Error> {
        let mut worklist: VecDeque<Entry> = frame::decode(query)?.into();
        let mut output: Vec<Entry> = Vec::new();

        // Listings answered by this message
        let listed: HashSet<(Bound, Bound)> = std::mem::take(&mut self.listed);

        while let Some(Entry { lower, upper, mode }) = worklist.pop_front() {
            let range: Range<usize> = self.storage.range(&lower, &upper);

            match mode {
                Mode::Fingerprint(fp) => {
                    if self.storage.fingerprint(range.clone()) != fp {
                        output.push(self.describe(lower, upper, range));
                    }
                }
                Mode::Split(subs) => {
                    let mut sub_lower: Bound = lower;
                    for SubRange { upper, fingerprint } in subs.into_iter() {
                        worklist.push_back(Entry {
                            lower: sub_lower,
                            upper,
                            mode: Mode::Fingerprint(fingerprint),
                        });
                        sub_lower = upper;
                    }
                }
                Mode::HaveIds(ids) => {
                    if self.initiator && listed.contains(&(lower, upper)) {
                        // Delta: what the remote holds and we don't
                        need.extend(ids);
                    } else {
                        let local: &[Id] = self.storage.items(range);
                        let remote: HashSet<Id> = ids.into_iter().collect();
                        let local_set: HashSet<&Id> = local.iter().collect();

                        let theirs: Vec<Id> = remote
                            .iter()
                            .filter(|id| !local_set.contains(id))
                            .copied()
                            .collect();
                        let ours: Vec<Id> = local
                            .iter()
                            .filter(|id| !remote.contains(*id))
                            .copied()
                            .collect();

                        if self.initiator {
                            need.extend(theirs);
                            have.extend(ours);
                        } else {
                            if !ours.is_empty() {
                                output.push(Entry {
                                    lower,
                                    upper,
                                    mode: Mode::HaveIds(ours),
                                });
                            }

                            if !theirs.is_empty() {
                                let mut theirs = theirs;
                                theirs.sort_unstable();
                                output.push(Entry {
                                    lower,
                                    upper,
                                    mode: Mode::NeedIds(theirs),
                                });
                            }
                        }
                    }
                }
                Mode::NeedIds(ids) => {
                    if self.initiator {
                        have.extend(ids);
                    }
                }
            }
        }

        if self.initiator {
            self.listed = output
                .iter()
                .filter(|entry| matches!(entry.mode, Mode::HaveIds(..)))
                .map(|entry| (entry.lower, entry.upper))
                .collect();
        }

        Ok(output)
    }

    /// Describe a mismatching range: list it when small, split it otherwise
    fn describe(&self, lower: Bound, upper: Bound, range: Range<usize>) -> Entry {
        let items: &[Id] = self.storage.items(range.clone());

        if items.len() <= LIST_THRESHOLD {
            return Entry {
                lower,
                upper,
                mode: Mode::HaveIds(items.to_vec()),
            };
        }

        let bucket_size: usize = items.len() / BRANCHING;
        let mut extra: usize = items.len() % BRANCHING;
        let mut subs: Vec<SubRange> = Vec::with_capacity(BRANCHING);
        let mut start: usize = range.start;

        for i in 0..BRANCHING {
            let mut end: usize = start + bucket_size;
            if extra > 0 {
                end += 1;
                extra -= 1;
            }

            let sub_upper: Bound = if i == BRANCHING - 1 {
                upper
            } else {
                Bound::Id(self.storage.items(end..end + 1)[0])
            };

            subs.push(SubRange {
                upper: sub_upper,
                fingerprint: self.storage.fingerprint(start..end),
            });

            start = end;
        }

        Entry {
            lower,
            upper,
            mode: Mode::Split(subs),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, RngCore};

    use super::*;

    fn random_id<R: RngCore>(rng: &mut R) -> Id {
        let mut id = [0u8; 32];
        rng.fill_bytes(&mut id);
        id
    }

    fn storage(ids: &BTreeSet<Id>) -> Storage {
        let mut storage = Storage::with_capacity(ids.len());
        for id in ids.iter() {
            storage.insert(*id).unwrap();
        }
        storage.seal().unwrap();
        storage
    }

    struct Outcome {
        have: BTreeSet<Id>,
        need: BTreeSet<Id>,
        rounds: usize,
        transferred_ids: usize,
    }

    fn run(client: &BTreeSet<Id>, relay: &BTreeSet<Id>) -> Outcome {
        let mut initiator = Reconciler::new(storage(client)).unwrap();
        let mut responder = Reconciler::new(storage(relay)).unwrap();

        let mut have: Vec<Id> = Vec::new();
        let mut need: Vec<Id> = Vec::new();
        let mut rounds: usize = 0;
        let mut transferred_ids: usize = 0;

        let mut msg: Vec<u8> = initiator.initiate().unwrap();
        loop {
            rounds += 1;
            assert!(rounds < 100, "reconciliation doesn't terminate");

            let reply: Vec<u8> = responder.reconcile(&msg).unwrap();
            transferred_ids += count_ids(&msg) + count_ids(&reply);

            match initiator
                .reconcile_with_ids(&reply, &mut have, &mut need)
                .unwrap()
            {
                Some(next) => msg = next,
                None => break,
            }
        }

        Outcome {
            have: have.into_iter().collect(),
            need: need.into_iter().collect(),
            rounds,
            transferred_ids,
        }
    }

    fn count_ids(msg: &[u8]) -> usize {
        frame::decode(msg)
            .unwrap()
            .into_iter()
            .map(|entry| match entry.mode {
                Mode::HaveIds(ids) | Mode::NeedIds(ids) => ids.len(),
                _ => 0,
            })
            .sum()
    }

    fn random_sets(
        shared: usize,
        client_only: usize,
        relay_only: usize,
    ) -> (BTreeSet<Id>, BTreeSet<Id>) {
        let mut rng = rand::rng();
        let mut client = BTreeSet::new();
        let mut relay = BTreeSet::new();

        for _ in 0..shared {
            let id = random_id(&mut rng);
            client.insert(id);
            relay.insert(id);
        }
        for _ in 0..client_only {
            client.insert(random_id(&mut rng));
        }
        for _ in 0..relay_only {
            relay.insert(random_id(&mut rng));
        }

        (client, relay)
    }

    fn expected(client: &BTreeSet<Id>, relay: &BTreeSet<Id>) -> (BTreeSet<Id>, BTreeSet<Id>) {
        let have = client.difference(relay).copied().collect();
        let need = relay.difference(client).copied().collect();
        (have, need)
    }

    fn log_rounds(n: usize) -> usize {
        let mut rounds = 0;
        let mut size = 1;
        while size < n {
            size *= BRANCHING;
            rounds += 1;
        }
        rounds
    }

    #[test]
    fn test_empty_sets() {
        let outcome = run(&BTreeSet::new(), &BTreeSet::new());
        assert!(outcome.have.is_empty());
        assert!(outcome.need.is_empty());
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.transferred_ids, 0);
    }

    #[test]
    fn test_identical_sets() {
        let (client, relay) = random_sets(5_000, 0, 0);
        let outcome = run(&client, &relay);
        assert!(outcome.have.is_empty());
        assert!(outcome.need.is_empty());
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.transferred_ids, 0);
    }

    #[test]
    fn test_one_side_empty() {
        let (client, relay) = random_sets(0, 0, 40);
        let outcome = run(&client, &relay);
        let (have, need) = expected(&client, &relay);
        assert_eq!(outcome.have, have);
        assert_eq!(outcome.need, need);

        let (client, relay) = random_sets(0, 1_000, 0);
        let outcome = run(&client, &relay);
        let (have, need) = expected(&client, &relay);
        assert_eq!(outcome.have, have);
        assert_eq!(outcome.need, need);
    }

    #[test]
    fn test_small_sets_are_listed() {
        let (client, relay) = random_sets(5, 3, 4);
        let outcome = run(&client, &relay);
        let (have, need) = expected(&client, &relay);
        assert_eq!(outcome.have, have);
        assert_eq!(outcome.need, need);
        assert_eq!(outcome.rounds, 1);
    }

    #[test]
    fn test_converges() {
        let mut rng = rand::rng();
        for _ in 0..10 {
            let shared = rng.random_range(0..3_000);
            let client_only = rng.random_range(0..200);
            let relay_only = rng.random_range(0..200);

            let (client, relay) = random_sets(shared, client_only, relay_only);
            let outcome = run(&client, &relay);
            let (have, need) = expected(&client, &relay);
            assert_eq!(outcome.have, have);
            assert_eq!(outcome.need, need);
        }
    }

    #[test]
    fn test_logarithmic_rounds() {
        let (client, relay) = random_sets(20_000, 10, 10);
        let outcome = run(&client, &relay);
        let (have, need) = expected(&client, &relay);
        assert_eq!(outcome.have, have);
        assert_eq!(outcome.need, need);

        let max = client.len().max(relay.len());
        assert!(
            outcome.rounds <= log_rounds(max) + 1,
            "{} rounds for {} items",
            outcome.rounds,
            max
        );

        // Only the ranges around the differences are listed
        assert!(outcome.transferred_ids < 20 * 2 * LIST_THRESHOLD);
    }

    #[test]
    fn test_role_checks() {
        let mut storage = Storage::new();
        assert_eq!(
            Reconciler::new(storage.clone()).unwrap_err(),
            Error::NotSealed
        );
        storage.seal().unwrap();

        let mut responder = Reconciler::new(storage.clone()).unwrap();
        let mut have = Vec::new();
        let mut need = Vec::new();
        assert_eq!(
            responder.reconcile_with_ids(&[crate::PROTOCOL_VERSION], &mut have, &mut need),
            Err(Error::UnexpectedRole { initiator: false })
        );

        let mut initiator = Reconciler::new(storage).unwrap();
        let msg = initiator.initiate().unwrap();
        assert_eq!(initiator.initiate(), Err(Error::AlreadyInitiated));
        assert_eq!(
            initiator.reconcile(&msg),
            Err(Error::UnexpectedRole { initiator: true })
        );
    }
}

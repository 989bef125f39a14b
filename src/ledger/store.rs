//! The append-only store of touches.

use std::time::Duration;

use log::debug;
use rand::Rng;
use url::Url;

use crate::commons::StratusResult;
use crate::commons::error::Error;
use crate::commons::storage::{
    Key, KeyValueError, KeyValueStore, Namespace, Scope, Segment,
};
use crate::constants::LEDGER_NS;
use crate::ledger::{TargetId, Touch, TouchKind, TouchPayload};

//------------ TouchLedger ---------------------------------------------------

/// The single source of truth for state, specification, ownership and
/// credit history.
///
/// Touches are never updated or deleted. Sequence numbers are assigned
/// from one counter so that they form a total order across all targets;
/// wall-clock time is stamped on each touch but is advisory only.
#[derive(Debug)]
pub struct TouchLedger {
    store: KeyValueStore,
}

impl TouchLedger {
    /// How often an append retries after losing a sequence race.
    const MAX_APPEND_ATTEMPTS: usize = 10;

    /// Base for the backoff between append attempts.
    const RETRY_BASE_MS: u64 = 5;

    pub fn create(storage_uri: &Url) -> StratusResult<Self> {
        let store =
            KeyValueStore::create(storage_uri, &Namespace::make(LEDGER_NS))?;
        Ok(TouchLedger { store })
    }

    fn counter_key() -> Key {
        Key::new_global(Segment::make("sequence"))
    }

    fn touch_key(target: TargetId, kind: TouchKind, sequence: u64) -> Key {
        Key::new_scoped(
            target.scope(),
            Segment::make(&format!("{kind}-{sequence:012}")),
        )
    }

    /// The sequence number encoded in a touch key name.
    fn sequence_of(key: &Key) -> Option<u64> {
        key.name().as_str().rsplit('-').next()?.parse().ok()
    }

    /// The keys for a target, highest sequence first.
    ///
    /// If `kind` is given only touches of that kind are returned.
    fn keys_descending(
        &self,
        target: TargetId,
        kind: Option<TouchKind>,
    ) -> StratusResult<Vec<Key>> {
        let prefix = kind.map(|kind| format!("{kind}-"));
        let mut keys: Vec<(u64, Key)> = self
            .store
            .list_keys(&target.scope())?
            .into_iter()
            .filter(|key| match &prefix {
                Some(prefix) => key.name().as_str().starts_with(prefix),
                None => true,
            })
            .filter_map(|key| Self::sequence_of(&key).map(|seq| (seq, key)))
            .collect();

        keys.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(keys.into_iter().map(|(_, key)| key).collect())
    }
}

// # Appending
impl TouchLedger {
    /// Atomically assigns the next sequence number and durably persists
    /// the touch.
    ///
    /// Safe under concurrent callers appending to different targets and
    /// to the same target: the counter is advanced under the store's
    /// scope lock, and the touch itself is written create-only. Losing
    /// a sequence race is transient, so it is retried with bounded
    /// backoff before surfacing as [`Error::Concurrency`]. A failed
    /// append leaves no partial touch visible to readers.
    pub fn append(
        &self,
        target: TargetId,
        payload: TouchPayload,
    ) -> StratusResult<Touch> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_append(target, &payload) {
                Ok(touch) => {
                    debug!("recorded touch {touch}");
                    return Ok(touch);
                }
                Err(Error::Storage(KeyValueError::DuplicateKey(key))) => {
                    if attempts >= Self::MAX_APPEND_ATTEMPTS {
                        return Err(Error::Concurrency(format!(
                            "sequence contention on '{key}' \
                             after {attempts} attempts"
                        )));
                    }
                    let jitter = rand::rng().random_range(0..25);
                    let wait = Self::RETRY_BASE_MS * attempts as u64 + jitter;
                    debug!(
                        "touch key '{key}' taken by a concurrent writer, \
                         retrying in {wait}ms"
                    );
                    std::thread::sleep(Duration::from_millis(wait));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_append(
        &self,
        target: TargetId,
        payload: &TouchPayload,
    ) -> StratusResult<Touch> {
        let counter = Self::counter_key();

        self.store
            .execute(&Scope::global(), |kv| {
                let last: u64 = kv
                    .get(&counter)?
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or(0);
                let sequence = last + 1;

                let touch = Touch::new(sequence, target, payload.clone());
                let key = Self::touch_key(target, touch.kind(), sequence);

                // The counter is advanced before the touch is written.
                // A failure in between burns a sequence number, which
                // keeps the order strictly increasing without ever
                // exposing a touch that lost its counter update.
                kv.store(&counter, &sequence)?;
                kv.store_new(&key, &touch)?;

                Ok(touch)
            })
            .map_err(Error::from)
    }
}

// # Derived reads
//
// All reads are computed fresh from storage; nothing is cached across
// calls.
impl TouchLedger {
    /// Returns the highest-sequence touch of the kind for the target.
    pub fn latest(
        &self,
        target: TargetId,
        kind: TouchKind,
    ) -> StratusResult<Option<Touch>> {
        match self.keys_descending(target, Some(kind))?.first() {
            Some(key) => self.load(key).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the touch `n` positions before the latest of its kind.
    ///
    /// `n = 0` is the latest. Returns `Ok(None)` when the target has no
    /// touches of the kind at all; fails with
    /// [`Error::InsufficientHistory`] when some exist but fewer than
    /// `n + 1`. The two conditions are caller-visible and distinct.
    pub fn nth_back(
        &self,
        target: TargetId,
        kind: TouchKind,
        n: usize,
    ) -> StratusResult<Option<Touch>> {
        let keys = self.keys_descending(target, Some(kind))?;
        if keys.is_empty() {
            return Ok(None);
        }
        match keys.get(n) {
            Some(key) => self.load(key).map(Some),
            None => Err(Error::InsufficientHistory {
                kind,
                requested: n,
                available: keys.len(),
            }),
        }
    }

    /// All touches of one kind for a target, descending by sequence.
    ///
    /// The returned iterator is finite and loads touches on demand; a
    /// fresh call re-reads current ledger state, it is not a live
    /// stream.
    pub fn history(
        &self,
        target: TargetId,
        kind: TouchKind,
    ) -> StratusResult<TouchHistory<'_>> {
        Ok(TouchHistory {
            store: &self.store,
            keys: self.keys_descending(target, Some(kind))?.into_iter(),
        })
    }

    /// The full activity log of a target across all kinds, descending.
    pub fn full_history(
        &self,
        target: TargetId,
    ) -> StratusResult<TouchHistory<'_>> {
        Ok(TouchHistory {
            store: &self.store,
            keys: self.keys_descending(target, None)?.into_iter(),
        })
    }

    fn load(&self, key: &Key) -> StratusResult<Touch> {
        self.store
            .get::<Touch>(key)?
            .ok_or_else(|| KeyValueError::UnknownKey(key.clone()).into())
    }
}


//------------ TouchHistory --------------------------------------------------

/// Lazily loads the touches behind a snapshot of key listings.
pub struct TouchHistory<'a> {
    store: &'a KeyValueStore,
    keys: std::vec::IntoIter<Key>,
}

impl Iterator for TouchHistory<'_> {
    type Item = StratusResult<Touch>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        Some(match self.store.get::<Touch>(&key) {
            Ok(Some(touch)) => Ok(touch),
            Ok(None) => Err(KeyValueError::UnknownKey(key).into()),
            Err(e) => Err(e.into()),
        })
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AccountId, ApplianceId, StateId};
    use crate::test;

    fn ledger() -> TouchLedger {
        TouchLedger::create(&test::mem_storage()).unwrap()
    }

    fn state(n: u64) -> TouchPayload {
        TouchPayload::StateChange { state: StateId::new(n) }
    }

    #[test]
    fn sequences_are_global_and_strictly_increasing() {
        let ledger = ledger();
        let vm = TargetId::from(ApplianceId::new(1));
        let owner = TargetId::from(AccountId::new(1));

        let first = ledger.append(vm, state(1)).unwrap();
        let second = ledger
            .append(owner, TouchPayload::CreditAdjustment { delta: 10 })
            .unwrap();
        let third = ledger.append(vm, state(2)).unwrap();

        assert_eq!(first.sequence(), 1);
        assert_eq!(second.sequence(), 2);
        assert_eq!(third.sequence(), 3);
    }

    #[test]
    fn latest_returns_highest_sequence_of_kind() {
        let ledger = ledger();
        let vm = TargetId::from(ApplianceId::new(7));

        assert!(ledger.latest(vm, TouchKind::State).unwrap().is_none());

        ledger.append(vm, state(1)).unwrap();
        ledger
            .append(vm, TouchPayload::SpecificationChange { cores: 2, ram: 4 })
            .unwrap();
        ledger.append(vm, state(3)).unwrap();

        let latest = ledger.latest(vm, TouchKind::State).unwrap().unwrap();
        assert_eq!(
            latest.payload(),
            &TouchPayload::StateChange { state: StateId::new(3) }
        );
    }

    #[test]
    fn nth_back_distinguishes_empty_from_insufficient() {
        let ledger = ledger();
        let vm = TargetId::from(ApplianceId::new(2));

        // No touches at all: not an error.
        assert!(ledger.nth_back(vm, TouchKind::State, 2).unwrap().is_none());

        ledger.append(vm, state(1)).unwrap();
        ledger.append(vm, state(2)).unwrap();

        let back = ledger.nth_back(vm, TouchKind::State, 1).unwrap().unwrap();
        assert_eq!(
            back.payload(),
            &TouchPayload::StateChange { state: StateId::new(1) }
        );

        match ledger.nth_back(vm, TouchKind::State, 2) {
            Err(Error::InsufficientHistory {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 2);
                assert_eq!(available, 2);
            }
            other => panic!("expected InsufficientHistory, got {other:?}"),
        }
    }

    #[test]
    fn history_is_descending_and_restartable() {
        let ledger = ledger();
        let vm = TargetId::from(ApplianceId::new(3));

        for n in 1..=3 {
            ledger.append(vm, state(n)).unwrap();
        }

        let sequences: Vec<u64> = ledger
            .history(vm, TouchKind::State)
            .unwrap()
            .map(|touch| touch.unwrap().sequence())
            .collect();
        assert_eq!(sequences, vec![3, 2, 1]);

        // A fresh query observes appends made in the meantime.
        ledger.append(vm, state(4)).unwrap();
        let count = ledger.history(vm, TouchKind::State).unwrap().count();
        assert_eq!(count, 4);
    }

    #[test]
    fn full_history_interleaves_kinds() {
        let ledger = ledger();
        let vm = TargetId::from(ApplianceId::new(4));

        ledger.append(vm, state(1)).unwrap();
        ledger
            .append(vm, TouchPayload::SpecificationChange { cores: 2, ram: 4 })
            .unwrap();

        let kinds: Vec<TouchKind> = ledger
            .full_history(vm)
            .unwrap()
            .map(|touch| touch.unwrap().kind())
            .collect();
        assert_eq!(kinds, vec![TouchKind::Specification, TouchKind::State]);
    }

    #[test]
    fn concurrent_appends_never_share_a_sequence() {
        let ledger = ledger();
        const THREADS: u64 = 4;
        const PER_THREAD: u64 = 25;

        std::thread::scope(|s| {
            for t in 0..THREADS {
                let ledger = &ledger;
                s.spawn(move || {
                    let target = TargetId::from(ApplianceId::new(t));
                    for n in 0..PER_THREAD {
                        ledger.append(target, state(n + 1)).unwrap();
                    }
                });
            }
        });

        let mut sequences = Vec::new();
        for t in 0..THREADS {
            let target = TargetId::from(ApplianceId::new(t));
            for touch in ledger.history(target, TouchKind::State).unwrap() {
                sequences.push(touch.unwrap().sequence());
            }
        }

        sequences.sort_unstable();
        let expected: Vec<u64> = (1..=THREADS * PER_THREAD).collect();
        assert_eq!(sequences, expected);
    }

    #[test]
    fn ledger_survives_reopen_on_disk() {
        test::test_under_tmp(|storage_uri| {
            let vm = TargetId::from(ApplianceId::new(1));

            let ledger = TouchLedger::create(&storage_uri).unwrap();
            ledger.append(vm, state(1)).unwrap();
            drop(ledger);

            let ledger = TouchLedger::create(&storage_uri).unwrap();
            let latest =
                ledger.latest(vm, TouchKind::State).unwrap().unwrap();
            assert_eq!(latest.sequence(), 1);

            // The counter picks up where it left off.
            let next = ledger.append(vm, state(2)).unwrap();
            assert_eq!(next.sequence(), 2);
        });
    }
}

//! Creating and finding appliances.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::{AccountId, ApplianceDetails, ApplianceId};
use crate::commons::StratusResult;
use crate::commons::error::Error;
use crate::commons::storage::{
    Key, KeyValueError, KeyValueStore, Namespace, Scope, Segment,
};
use crate::constants::{APPLIANCES_NS, STATE_UNINITIALISED};
use crate::ledger::{TouchKind, TouchLedger};
use crate::registry::StateRegistry;

//------------ ApplianceRecord -----------------------------------------------

/// The stored identity of one appliance.
///
/// Ownership and state are deliberately absent: both are ledger
/// history, so their current values are derived queries.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ApplianceRecord {
    pub id: ApplianceId,
    pub name: String,
    pub uuid: Option<String>,
}


//------------ ApplianceDirectory --------------------------------------------

/// Creates appliances and answers the derived, ledger-backed views on
/// them.
///
/// Appliances are never physically deleted; the delete and update
/// operations exist only to report themselves as not implemented.
#[derive(Debug)]
pub struct ApplianceDirectory {
    store: KeyValueStore,
    ledger: Arc<TouchLedger>,
    registry: Arc<StateRegistry>,
}

impl ApplianceDirectory {
    pub fn create(
        storage_uri: &Url,
        ledger: Arc<TouchLedger>,
        registry: Arc<StateRegistry>,
    ) -> StratusResult<Self> {
        let store = KeyValueStore::create(
            storage_uri,
            &Namespace::make(APPLIANCES_NS),
        )?;
        Ok(ApplianceDirectory {
            store,
            ledger,
            registry,
        })
    }

    fn counter_key() -> Key {
        Key::new_global(Segment::make("next"))
    }

    fn record_key(id: ApplianceId) -> Key {
        Key::new_scoped(
            Scope::from_segment(Segment::make("records")),
            Segment::make(&format!("{:012}", id.value())),
        )
    }

    fn name_key(name: &str) -> StratusResult<Key> {
        let segment = Segment::parse(name)
            .map_err(|_| Error::InvalidName(name.to_string()))?;
        Ok(Key::new_scoped(
            Scope::from_segment(Segment::make("names")),
            segment,
        ))
    }
}

// # Creation and lookup
impl ApplianceDirectory {
    /// Creates an appliance, assigning a fresh surrogate id.
    ///
    /// Does not append any touch; a created appliance starts with zero
    /// history. The uniqueness check and the id assignment run in one
    /// transaction, so a rejected name leaves the directory unchanged.
    pub fn create_appliance(
        &self,
        name: &str,
        uuid: Option<String>,
    ) -> StratusResult<ApplianceId> {
        let name_key = Self::name_key(name)?;
        let counter = Self::counter_key();

        self.store
            .execute(&Scope::global(), |kv| {
                if kv.has(&name_key)? {
                    return Err(KeyValueError::DuplicateKey(name_key.clone()));
                }

                let last: u64 = kv
                    .get(&counter)?
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or(0);
                let id = ApplianceId::new(last + 1);

                let record = ApplianceRecord {
                    id,
                    name: name.to_string(),
                    uuid: uuid.clone(),
                };

                kv.store(&counter, &id)?;
                kv.store(&Self::record_key(id), &record)?;
                kv.store(&name_key, &id)?;

                Ok(id)
            })
            .map_err(|e| match e {
                KeyValueError::DuplicateKey(_) => {
                    Error::DuplicateApplianceName(name.to_string())
                }
                e => Error::Storage(e),
            })
    }

    /// Resolves an appliance name to its id, if the name is known.
    pub fn id_for_name(
        &self,
        name: &str,
    ) -> StratusResult<Option<ApplianceId>> {
        match Self::name_key(name) {
            Ok(key) => Ok(self.store.get(&key)?),
            // A name that cannot be a lookup key is simply not found.
            Err(_) => Ok(None),
        }
    }

    /// The stored record for an appliance.
    pub fn record(&self, id: ApplianceId) -> StratusResult<ApplianceRecord> {
        self.store
            .get(&Self::record_key(id))?
            .ok_or(Error::UnknownAppliance(id))
    }

    /// The adapter-facing record of one appliance.
    pub fn details(&self, id: ApplianceId) -> StratusResult<ApplianceDetails> {
        let record = self.record(id)?;
        let state = self.current_state(id)?;
        Ok(ApplianceDetails {
            id: record.id,
            uuid: record.uuid.unwrap_or_else(|| record.name.clone()),
            name: record.name,
            state,
        })
    }

    /// Every appliance id in the directory, ascending.
    pub fn list_all(&self) -> StratusResult<Vec<ApplianceId>> {
        let scope = Scope::from_segment(Segment::make("records"));
        let mut ids: Vec<ApplianceId> = self
            .store
            .list_keys(&scope)?
            .into_iter()
            .filter_map(|key| key.name().as_str().parse::<u64>().ok())
            .map(ApplianceId::new)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

// # Derived views
//
// Current state and current owner reflect only the latest touch; they
// are computed fresh from the ledger on every call.
impl ApplianceDirectory {
    /// The current state name of an appliance.
    ///
    /// Returns the `"Not yet initialised"` sentinel if no state touch
    /// exists yet. That is a defined value, not an error.
    pub fn current_state(&self, id: ApplianceId) -> StratusResult<String> {
        self.record(id)?;
        match self
            .ledger
            .latest(id.into(), TouchKind::State)?
            .and_then(|touch| touch.payload().state())
        {
            Some(state) => self.registry.name_of(state),
            None => Ok(STATE_UNINITIALISED.to_string()),
        }
    }

    /// The account referenced by the latest ownership touch, if any.
    pub fn current_owner(
        &self,
        id: ApplianceId,
    ) -> StratusResult<Option<AccountId>> {
        self.record(id)?;
        Ok(self
            .ledger
            .latest(id.into(), TouchKind::Ownership)?
            .and_then(|touch| touch.payload().owner()))
    }

    /// All appliances whose latest ownership touch references the
    /// account.
    pub fn list_by_owner(
        &self,
        account: AccountId,
    ) -> StratusResult<BTreeSet<ApplianceId>> {
        let mut owned = BTreeSet::new();
        for id in self.list_all()? {
            if self.current_owner(id)? == Some(account) {
                owned.insert(id);
            }
        }
        Ok(owned)
    }

    /// All appliances currently in the named state.
    ///
    /// Fails with [`Error::UnknownState`] for unregistered names.
    /// Appliances without any state touch are never included.
    pub fn list_by_state(
        &self,
        state_name: &str,
    ) -> StratusResult<BTreeSet<ApplianceId>> {
        let wanted = self.registry.resolve(state_name)?;

        let mut matching = BTreeSet::new();
        for id in self.list_all()? {
            let current = self
                .ledger
                .latest(id.into(), TouchKind::State)?
                .and_then(|touch| touch.payload().state());
            if current == Some(wanted) {
                matching.insert(id);
            }
        }
        Ok(matching)
    }
}

// # Intentionally unimplemented
impl ApplianceDirectory {
    /// Updating an appliance record is a non-goal.
    pub fn update(&self, _id: ApplianceId) -> StratusResult<()> {
        Err(Error::NotImplemented("appliance update"))
    }

    /// Appliances are never physically deleted.
    pub fn delete(&self, _id: ApplianceId) -> StratusResult<()> {
        Err(Error::NotImplemented("appliance delete"))
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StateId;
    use crate::ledger::TouchPayload;
    use crate::test;

    struct Setup {
        ledger: Arc<TouchLedger>,
        registry: Arc<StateRegistry>,
        directory: ApplianceDirectory,
    }

    fn setup() -> Setup {
        let storage_uri = test::mem_storage();
        let ledger = Arc::new(TouchLedger::create(&storage_uri).unwrap());
        let registry = Arc::new(StateRegistry::create(&storage_uri).unwrap());
        registry.register(&test::STATE_LIST).unwrap();
        let directory = ApplianceDirectory::create(
            &storage_uri,
            ledger.clone(),
            registry.clone(),
        )
        .unwrap();
        Setup {
            ledger,
            registry,
            directory,
        }
    }

    fn touch_to_state(setup: &Setup, id: ApplianceId, name: &str) {
        let state = setup.registry.resolve(name).unwrap();
        setup
            .ledger
            .append(id.into(), TouchPayload::StateChange { state })
            .unwrap();
    }

    #[test]
    fn create_and_resolve_name() {
        let setup = setup();
        let id = setup.directory.create_appliance("getname", None).unwrap();
        assert_eq!(setup.directory.id_for_name("getname").unwrap(), Some(id));
        assert_eq!(setup.directory.id_for_name("other").unwrap(), None);
    }

    #[test]
    fn duplicate_name_leaves_directory_unchanged() {
        let setup = setup();
        let id = setup.directory.create_appliance("vm1", None).unwrap();
        assert!(matches!(
            setup.directory.create_appliance("vm1", None),
            Err(Error::DuplicateApplianceName(_))
        ));

        // No id was consumed by the failed create.
        let next = setup.directory.create_appliance("vm2", None).unwrap();
        assert_eq!(next.value(), id.value() + 1);
    }

    #[test]
    fn fresh_appliance_reports_sentinel_state() {
        let setup = setup();
        let id = setup
            .directory
            .create_appliance("returndetails", None)
            .unwrap();

        let details = setup.directory.details(id).unwrap();
        assert_eq!(details.id, id);
        assert_eq!(details.state, STATE_UNINITIALISED);
        // The uuid defaults to the name when none was supplied.
        assert_eq!(details.uuid, "returndetails");
    }

    #[test]
    fn current_state_follows_latest_touch() {
        let setup = setup();
        let id = setup
            .directory
            .create_appliance("teststarted", None)
            .unwrap();

        touch_to_state(&setup, id, "Started");
        assert_eq!(setup.directory.current_state(id).unwrap(), "Started");

        // Any registered state may follow any other, including itself.
        touch_to_state(&setup, id, "Boosting");
        touch_to_state(&setup, id, "Boosting");
        assert_eq!(setup.directory.current_state(id).unwrap(), "Boosting");
    }

    #[test]
    fn list_by_state_reflects_latest_only() {
        let setup = setup();
        let started = setup.directory.create_appliance("vm1", None).unwrap();
        let stopped = setup.directory.create_appliance("vm2", None).unwrap();
        let fresh = setup.directory.create_appliance("vm3", None).unwrap();

        touch_to_state(&setup, started, "Stopped");
        touch_to_state(&setup, started, "Started");
        touch_to_state(&setup, stopped, "Stopped");

        let listed = setup.directory.list_by_state("Started").unwrap();
        assert!(listed.contains(&started));
        assert!(!listed.contains(&stopped));
        assert!(!listed.contains(&fresh));

        assert!(matches!(
            setup.directory.list_by_state("Restart"),
            Err(Error::UnknownState(_))
        ));
    }

    #[test]
    fn list_by_owner_follows_transfers() {
        let setup = setup();
        let vm = setup.directory.create_appliance("vm1", None).unwrap();
        let alice = AccountId::new(1);
        let bob = AccountId::new(2);

        setup
            .ledger
            .append(vm.into(), TouchPayload::OwnershipChange { account: alice })
            .unwrap();
        assert!(setup.directory.list_by_owner(alice).unwrap().contains(&vm));

        setup
            .ledger
            .append(vm.into(), TouchPayload::OwnershipChange { account: bob })
            .unwrap();
        assert!(!setup.directory.list_by_owner(alice).unwrap().contains(&vm));
        assert!(setup.directory.list_by_owner(bob).unwrap().contains(&vm));
        assert_eq!(setup.directory.current_owner(vm).unwrap(), Some(bob));
    }

    #[test]
    fn unknown_appliance_fails() {
        let setup = setup();
        let unknown = ApplianceId::new(99);
        assert!(matches!(
            setup.directory.details(unknown),
            Err(Error::UnknownAppliance(_))
        ));
        assert!(matches!(
            setup.directory.current_state(unknown),
            Err(Error::UnknownAppliance(_))
        ));
    }

    #[test]
    fn update_and_delete_are_unimplemented() {
        let setup = setup();
        let id = setup.directory.create_appliance("vm1", None).unwrap();
        assert!(matches!(
            setup.directory.update(id),
            Err(Error::NotImplemented(_))
        ));
        assert!(matches!(
            setup.directory.delete(id),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn reapplied_state_reads_back_unchanged() {
        let setup = setup();
        let id = setup.directory.create_appliance("idem", None).unwrap();
        let state = setup.registry.resolve("Stopped").unwrap();
        assert_eq!(state, StateId::new(4));

        for _ in 0..3 {
            setup
                .ledger
                .append(id.into(), TouchPayload::StateChange { state })
                .unwrap();
            assert_eq!(setup.directory.current_state(id).unwrap(), "Stopped");
        }
    }
}

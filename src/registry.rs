//! Stable identifiers for the configured set of lifecycle states.

use std::collections::HashSet;

use url::Url;

use crate::api::StateId;
use crate::commons::StratusResult;
use crate::commons::error::Error;
use crate::commons::storage::{
    Key, KeyValueError, KeyValueStore, Namespace, Scope, Segment,
};
use crate::constants::REGISTRY_NS;

//------------ StateRegistry -------------------------------------------------

/// Assigns and resolves identifiers for an ordered set of state names.
///
/// The list is registered once at system setup. Ids are 1-based
/// positions in the list and are never renumbered; states are never
/// deleted. The registry does not judge transitions between states,
/// only whether a name is registered at all.
#[derive(Debug)]
pub struct StateRegistry {
    store: KeyValueStore,
}

impl StateRegistry {
    pub fn create(storage_uri: &Url) -> StratusResult<Self> {
        let store =
            KeyValueStore::create(storage_uri, &Namespace::make(REGISTRY_NS))?;
        Ok(StateRegistry { store })
    }

    fn states_key() -> Key {
        Key::new_global(Segment::make("states"))
    }

    /// Registers the ordered state list, assigning ids 1..N.
    ///
    /// Fails with [`Error::DuplicateState`] if a name repeats within
    /// the input and with [`Error::StatesAlreadyRegistered`] if a list
    /// was registered before. There is no reset; tests rebuild storage
    /// between runs.
    pub fn register<S: AsRef<str>>(&self, names: &[S]) -> StratusResult<()> {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name.as_ref()) {
                return Err(Error::DuplicateState(name.as_ref().to_string()));
            }
        }

        let names: Vec<String> =
            names.iter().map(|name| name.as_ref().to_string()).collect();

        self.store
            .execute(&Scope::global(), |kv| {
                kv.store_new(&Self::states_key(), &names)
            })
            .map_err(|e| match e {
                KeyValueError::DuplicateKey(_) => {
                    Error::StatesAlreadyRegistered
                }
                e => Error::Storage(e),
            })
    }

    /// Whether a state list was registered for this storage.
    pub fn is_registered(&self) -> StratusResult<bool> {
        Ok(self.store.has(&Self::states_key())?)
    }

    /// Resolves a state name to its id.
    pub fn resolve(&self, name: &str) -> StratusResult<StateId> {
        self.names()?
            .iter()
            .position(|registered| registered == name)
            .map(|position| StateId::new(position as u64 + 1))
            .ok_or_else(|| Error::UnknownState(name.to_string()))
    }

    /// The inverse lookup of [`StateRegistry::resolve`].
    pub fn name_of(&self, id: StateId) -> StratusResult<String> {
        let names = self.names()?;
        let position = usize::try_from(id.value())
            .ok()
            .and_then(|value| value.checked_sub(1))
            .ok_or(Error::UnknownStateId(id))?;
        names
            .get(position)
            .cloned()
            .ok_or(Error::UnknownStateId(id))
    }

    /// The registered names in registration order.
    ///
    /// Empty if no list was registered yet.
    pub fn names(&self) -> StratusResult<Vec<String>> {
        Ok(self.store.get(&Self::states_key())?.unwrap_or_default())
    }
}


//------------ Tests ---------------------------------------------------------

//! Creating and finding account holders.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::AccountId;
use crate::commons::StratusResult;
use crate::commons::error::Error;
use crate::commons::storage::{
    Key, KeyValueError, KeyValueStore, Namespace, Scope, Segment,
};
use crate::constants::ACCOUNTS_NS;
use crate::ledger::{TouchKind, TouchLedger, TouchPayload};

//------------ AccountRecord -------------------------------------------------

/// The stored identity of one account holder.
///
/// The credit balance is never part of the record; it is derived from
/// the ledger on demand.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccountRecord {
    pub id: AccountId,

    #[serde(rename = "type")]
    pub kind: String,

    pub handle: String,
    pub name: String,
    pub username: String,
}


//------------ AccountDirectory ----------------------------------------------

/// Creates accounts and stores their credential touches.
#[derive(Debug)]
pub struct AccountDirectory {
    store: KeyValueStore,
    ledger: Arc<TouchLedger>,
}

impl AccountDirectory {
    pub fn create(
        storage_uri: &Url,
        ledger: Arc<TouchLedger>,
    ) -> StratusResult<Self> {
        let store =
            KeyValueStore::create(storage_uri, &Namespace::make(ACCOUNTS_NS))?;
        Ok(AccountDirectory { store, ledger })
    }

    fn counter_key() -> Key {
        Key::new_global(Segment::make("next"))
    }

    fn record_key(id: AccountId) -> Key {
        Key::new_scoped(
            Scope::from_segment(Segment::make("records")),
            Segment::make(&format!("{:012}", id.value())),
        )
    }

    fn username_key(username: &str) -> StratusResult<Key> {
        let segment = Segment::parse(username)
            .map_err(|_| Error::InvalidName(username.to_string()))?;
        Ok(Key::new_scoped(
            Scope::from_segment(Segment::make("usernames")),
            segment,
        ))
    }
}

// # Creation and lookup
impl AccountDirectory {
    /// Creates an account, assigning a fresh surrogate id.
    ///
    /// The username is the human-facing unique handle; a taken username
    /// is rejected in the same transaction that would assign the id, so
    /// a failed create leaves the directory unchanged.
    pub fn create_account(
        &self,
        kind: &str,
        handle: &str,
        name: &str,
        username: &str,
    ) -> StratusResult<AccountId> {
        let username_key = Self::username_key(username)?;
        let counter = Self::counter_key();

        self.store
            .execute(&Scope::global(), |kv| {
                if kv.has(&username_key)? {
                    return Err(KeyValueError::DuplicateKey(
                        username_key.clone(),
                    ));
                }

                let last: u64 = kv
                    .get(&counter)?
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or(0);
                let id = AccountId::new(last + 1);

                let record = AccountRecord {
                    id,
                    kind: kind.to_string(),
                    handle: handle.to_string(),
                    name: name.to_string(),
                    username: username.to_string(),
                };

                kv.store(&counter, &id)?;
                kv.store(&Self::record_key(id), &record)?;
                kv.store(&username_key, &id)?;

                Ok(id)
            })
            .map_err(|e| match e {
                KeyValueError::DuplicateKey(_) => {
                    Error::DuplicateUsername(username.to_string())
                }
                e => Error::Storage(e),
            })
    }

    /// Whether an account with this id exists.
    pub fn exists(&self, id: AccountId) -> StratusResult<bool> {
        Ok(self.store.has(&Self::record_key(id))?)
    }

    /// The stored record for an account.
    pub fn record(&self, id: AccountId) -> StratusResult<AccountRecord> {
        self.store
            .get(&Self::record_key(id))?
            .ok_or(Error::UnknownAccount(id))
    }
}

// # Credentials
//
// The core only stores and returns hashes; producing and verifying them
// is the adapter's job.
impl AccountDirectory {
    /// Records a new credential hash for the account.
    pub fn set_password_hash(
        &self,
        id: AccountId,
        hash: &str,
    ) -> StratusResult<u64> {
        self.record(id)?;
        let touch = self.ledger.append(
            id.into(),
            TouchPayload::PasswordChange {
                hash: hash.to_string(),
            },
        )?;
        Ok(touch.sequence())
    }

    /// The latest credential hash, if any was ever set.
    pub fn password_hash(
        &self,
        id: AccountId,
    ) -> StratusResult<Option<String>> {
        self.record(id)?;
        Ok(self
            .ledger
            .latest(id.into(), TouchKind::Password)?
            .and_then(|touch| {
                touch.payload().password_hash().map(str::to_string)
            }))
    }
}

// # Intentionally unimplemented
impl AccountDirectory {
    /// Updating an account record is a non-goal.
    pub fn update(&self, _id: AccountId) -> StratusResult<()> {
        Err(Error::NotImplemented("account update"))
    }

    /// Accounts are never physically deleted.
    pub fn delete(&self, _id: AccountId) -> StratusResult<()> {
        Err(Error::NotImplemented("account delete"))
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    fn directory() -> AccountDirectory {
        let storage_uri = test::mem_storage();
        let ledger = Arc::new(TouchLedger::create(&storage_uri).unwrap());
        AccountDirectory::create(&storage_uri, ledger).unwrap()
    }

    #[test]
    fn create_and_fetch_record() {
        let directory = directory();
        let id = directory
            .create_account("user", "jb", "Joe Bloggs", "joe")
            .unwrap();

        assert!(directory.exists(id).unwrap());
        let record = directory.record(id).unwrap();
        assert_eq!(record.kind, "user");
        assert_eq!(record.username, "joe");

        assert!(!directory.exists(AccountId::new(99)).unwrap());
        assert!(matches!(
            directory.record(AccountId::new(99)),
            Err(Error::UnknownAccount(_))
        ));
    }

    #[test]
    fn duplicate_username_fails() {
        let directory = directory();
        directory
            .create_account("user", "jb", "Joe Bloggs", "joe")
            .unwrap();
        assert!(matches!(
            directory.create_account("user", "js", "Joe Smith", "joe"),
            Err(Error::DuplicateUsername(_))
        ));
    }

    #[test]
    fn latest_password_hash_wins() {
        let directory = directory();
        let id = directory
            .create_account("user", "jb", "Joe Bloggs", "joe")
            .unwrap();

        assert_eq!(directory.password_hash(id).unwrap(), None);

        directory.set_password_hash(id, "scrypt$old").unwrap();
        directory.set_password_hash(id, "scrypt$new").unwrap();
        assert_eq!(
            directory.password_hash(id).unwrap().as_deref(),
            Some("scrypt$new")
        );
    }

    #[test]
    fn update_and_delete_are_unimplemented() {
        let directory = directory();
        let id = directory
            .create_account("user", "jb", "Joe Bloggs", "joe")
            .unwrap();
        assert!(matches!(
            directory.update(id),
            Err(Error::NotImplemented(_))
        ));
        assert!(matches!(
            directory.delete(id),
            Err(Error::NotImplemented(_))
        ));
    }
}

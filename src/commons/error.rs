//! Defines all Stratus library errors.

use std::fmt;

use crate::api::{AccountId, ApplianceId, StateId};
use crate::commons::storage::KeyValueError;
use crate::ledger::TouchKind;

//------------ Error ---------------------------------------------------------

/// Everything that can go wrong in the Stratus core.
///
/// The adapter layer maps each error to a transport response via
/// [`Error::kind`]. No error is fatal to the process and no error
/// leaves a partial touch visible to readers.
#[derive(Debug)]
pub enum Error {
    //-----------------------------------------------------------------
    // Unknown names and ids
    //-----------------------------------------------------------------
    /// The state name was never registered.
    UnknownState(String),

    /// The state id was never assigned.
    UnknownStateId(StateId),

    /// No appliance with this id exists.
    UnknownAppliance(ApplianceId),

    /// No account with this id exists.
    UnknownAccount(AccountId),

    /// The appliance has no specification touch yet.
    NoSpecification(ApplianceId),

    //-----------------------------------------------------------------
    // Conflicts
    //-----------------------------------------------------------------
    /// The state list was already registered for this storage.
    StatesAlreadyRegistered,

    /// A state name occurs more than once in the registration input.
    DuplicateState(String),

    /// An appliance with this name already exists.
    DuplicateApplianceName(String),

    /// An account with this username already exists.
    DuplicateUsername(String),

    //-----------------------------------------------------------------
    // Domain validation
    //-----------------------------------------------------------------
    /// The name cannot be used as a lookup key.
    InvalidName(String),

    /// Specifications need positive cores and RAM.
    InvalidSpecification { cores: u32, ram: u32 },

    //-----------------------------------------------------------------
    // History depth
    //-----------------------------------------------------------------
    /// More historical depth was requested than exists.
    ///
    /// Distinct from the not-found conditions above: the target has
    /// touches of this kind, just fewer than the request reaches back.
    InsufficientHistory {
        kind: TouchKind,
        requested: usize,
        available: usize,
    },

    //-----------------------------------------------------------------
    // Transient and internal issues
    //-----------------------------------------------------------------
    /// Sequence assignment kept colliding with concurrent writers.
    ///
    /// Only surfaced after the ledger's internal bounded retries are
    /// exhausted.
    Concurrency(String),

    /// The operation is intentionally not implemented.
    NotImplemented(&'static str),

    /// The storage layer failed.
    Storage(KeyValueError),

    /// A value could not be serialized or deserialized.
    Json(serde_json::Error),
}

impl Error {
    /// The classification the adapter maps to a transport response.
    pub fn kind(&self) -> Kind {
        match self {
            Error::UnknownState(_)
            | Error::UnknownStateId(_)
            | Error::UnknownAppliance(_)
            | Error::UnknownAccount(_)
            | Error::NoSpecification(_) => Kind::NotFound,

            Error::StatesAlreadyRegistered
            | Error::DuplicateState(_)
            | Error::DuplicateApplianceName(_)
            | Error::DuplicateUsername(_) => Kind::Conflict,

            Error::InvalidName(_) | Error::InvalidSpecification { .. } => {
                Kind::Validation
            }

            Error::InsufficientHistory { .. } => Kind::InsufficientHistory,

            Error::Concurrency(_) => Kind::Contention,

            Error::NotImplemented(_) => Kind::NotImplemented,

            Error::Storage(_) | Error::Json(_) => Kind::Internal,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownState(name) => {
                write!(f, "state '{name}' is not registered")
            }
            Error::UnknownStateId(id) => {
                write!(f, "state id '{id}' was never assigned")
            }
            Error::UnknownAppliance(id) => {
                write!(f, "appliance '{id}' is unknown")
            }
            Error::UnknownAccount(id) => {
                write!(f, "account '{id}' is unknown")
            }
            Error::NoSpecification(id) => {
                write!(f, "appliance '{id}' has no specification")
            }
            Error::StatesAlreadyRegistered => {
                write!(f, "the state list was already registered")
            }
            Error::DuplicateState(name) => {
                write!(f, "duplicate state name '{name}'")
            }
            Error::DuplicateApplianceName(name) => {
                write!(f, "appliance name '{name}' is already in use")
            }
            Error::DuplicateUsername(username) => {
                write!(f, "username '{username}' is already in use")
            }
            Error::InvalidName(name) => {
                write!(f, "'{name}' cannot be used as a name")
            }
            Error::InvalidSpecification { cores, ram } => {
                write!(
                    f,
                    "specifications need positive cores and RAM, \
                     got cores={cores} ram={ram}"
                )
            }
            Error::InsufficientHistory {
                kind,
                requested,
                available,
            } => {
                write!(
                    f,
                    "only {available} {kind} touch(es) recorded, \
                     cannot go {requested} back"
                )
            }
            Error::Concurrency(msg) => {
                write!(f, "concurrent ledger contention: {msg}")
            }
            Error::NotImplemented(op) => {
                write!(f, "operation '{op}' is not implemented")
            }
            Error::Storage(e) => e.fmt(f),
            Error::Json(e) => write!(f, "invalid JSON: {e}"),
        }
    }
}

impl From<KeyValueError> for Error {
    fn from(e: KeyValueError) -> Self {
        Error::Storage(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl std::error::Error for Error {}


//------------ Kind ----------------------------------------------------------

/// Transport-agnostic error classification.
///
/// The adapter maps these to response classes: `NotFound` to a
/// 403/404-class response, `Conflict` and `Validation` to 4xx,
/// `NotImplemented` to 501, the rest to 5xx.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    NotFound,
    Conflict,
    Validation,
    InsufficientHistory,
    Contention,
    NotImplemented,
    Internal,
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            Error::UnknownState("Paused".into()).kind(),
            Kind::NotFound
        );
        assert_eq!(
            Error::DuplicateApplianceName("vm1".into()).kind(),
            Kind::Conflict
        );
        assert_eq!(
            Error::InvalidSpecification { cores: 0, ram: 4 }.kind(),
            Kind::Validation
        );
        assert_eq!(
            Error::NotImplemented("appliance delete").kind(),
            Kind::NotImplemented
        );
    }
}

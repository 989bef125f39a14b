//! Data types exchanged with the adapter layer.
//!
//! The adapter resolves request parameters to these identifiers before
//! calling into the core, and serializes the record types returned by
//! the core as JSON. Nothing in here has behavior beyond identity and
//! formatting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

//------------ Identifiers ---------------------------------------------------

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq,
            PartialOrd, Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub fn new(value: u64) -> Self {
                $name(value)
            }

            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(s.parse()?))
            }
        }
    };
}

id_type!(
    /// The surrogate key of an appliance, assigned on creation.
    ApplianceId
);

id_type!(
    /// The surrogate key of an account, assigned on creation.
    AccountId
);

id_type!(
    /// The stable identifier of a registered state.
    ///
    /// Assigned sequentially, 1-based, in registration order. Never
    /// renumbered.
    StateId
);


//------------ ApplianceDetails ----------------------------------------------

/// A plain record of one appliance, for the adapter to serialize.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ApplianceDetails {
    pub id: ApplianceId,
    pub name: String,

    /// The caller-supplied opaque identifier; defaults to the name.
    pub uuid: String,

    /// The current state name, derived from the latest state touch.
    pub state: String,
}


//------------ AccountDetails ------------------------------------------------

/// A plain record of one account, including its derived credit balance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccountDetails {
    pub id: AccountId,

    #[serde(rename = "type")]
    pub kind: String,

    pub handle: String,
    pub name: String,
    pub username: String,

    /// Derived balance, never stored.
    pub credits: i64,
}


//------------ Specification -------------------------------------------------

/// One versioned cores/RAM record.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Specification {
    pub cores: u32,
    pub ram: u32,
}


//------------ CreditReceipt -------------------------------------------------

/// The outcome of one credit adjustment.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreditReceipt {
    pub account_id: AccountId,
    pub credit_change: i64,
    pub credit_balance: i64,
}


//------------ JobStatus -----------------------------------------------------

/// The pollable progress of a start or stop operation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct JobStatus {
    pub appliance_id: ApplianceId,

    /// The name of the most recent state touch in the chain.
    pub phase: String,

    /// Whether the phase is a chain's terminal phase.
    pub complete: bool,
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_details_json_uses_type() {
        let details = AccountDetails {
            id: AccountId::new(3),
            kind: "user".to_string(),
            handle: "jb".to_string(),
            name: "J. Bloggs".to_string(),
            username: "joe".to_string(),
            credits: -20,
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "user");
        assert_eq!(json["credits"], -20);
    }

    #[test]
    fn ids_parse_and_display() {
        let id: ApplianceId = "42".parse().unwrap();
        assert_eq!(id, ApplianceId::new(42));
        assert_eq!(id.to_string(), "42");
    }
}

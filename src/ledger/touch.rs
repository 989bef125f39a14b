//! The atomic unit of history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{AccountId, ApplianceId, StateId};
use crate::commons::storage::{Scope, Segment};

//------------ TargetId ------------------------------------------------------

/// The appliance or account a touch is recorded against.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
pub enum TargetId {
    Appliance(ApplianceId),
    Account(AccountId),
}

impl TargetId {
    /// The storage scope holding all touches for this target.
    pub fn scope(&self) -> Scope {
        let (kind, id) = match self {
            TargetId::Appliance(id) => ("appliance", id.value()),
            TargetId::Account(id) => ("account", id.value()),
        };
        Scope::new(vec![
            Segment::make(kind),
            Segment::make(&format!("{id:012}")),
        ])
    }
}

impl From<ApplianceId> for TargetId {
    fn from(id: ApplianceId) -> Self {
        TargetId::Appliance(id)
    }
}

impl From<AccountId> for TargetId {
    fn from(id: AccountId) -> Self {
        TargetId::Account(id)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Appliance(id) => write!(f, "appliance {id}"),
            TargetId::Account(id) => write!(f, "account {id}"),
        }
    }
}


//------------ TouchKind -----------------------------------------------------

/// The closed set of event kinds the ledger records.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TouchKind {
    State,
    Specification,
    Ownership,
    Credit,
    Password,
}

impl TouchKind {
    /// The stable string used in storage key names.
    pub fn as_str(self) -> &'static str {
        match self {
            TouchKind::State => "state",
            TouchKind::Specification => "specification",
            TouchKind::Ownership => "ownership",
            TouchKind::Credit => "credit",
            TouchKind::Password => "password",
        }
    }
}

impl fmt::Display for TouchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ TouchPayload --------------------------------------------------

/// The kind-specific content of a touch.
///
/// This is a closed set; consumers match exhaustively so that adding a
/// kind forces every derived view to decide how to handle it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TouchPayload {
    /// The appliance entered a registered state.
    StateChange { state: StateId },

    /// The appliance got a new resource specification.
    SpecificationChange { cores: u32, ram: u32 },

    /// The appliance changed hands.
    OwnershipChange { account: AccountId },

    /// The account balance was adjusted, negative or positive.
    CreditAdjustment { delta: i64 },

    /// The account credential was replaced.
    ///
    /// The hash is produced by the adapter; the core never sees a
    /// plaintext password.
    PasswordChange { hash: String },
}

impl TouchPayload {
    /// The state id if this is a state change.
    pub fn state(&self) -> Option<StateId> {
        match self {
            TouchPayload::StateChange { state } => Some(*state),
            _ => None,
        }
    }

    /// The cores/RAM pair if this is a specification change.
    pub fn specification(&self) -> Option<(u32, u32)> {
        match self {
            TouchPayload::SpecificationChange { cores, ram } => {
                Some((*cores, *ram))
            }
            _ => None,
        }
    }

    /// The new owner if this is an ownership change.
    pub fn owner(&self) -> Option<AccountId> {
        match self {
            TouchPayload::OwnershipChange { account } => Some(*account),
            _ => None,
        }
    }

    /// The signed adjustment if this is a credit adjustment.
    pub fn delta(&self) -> Option<i64> {
        match self {
            TouchPayload::CreditAdjustment { delta } => Some(*delta),
            _ => None,
        }
    }

    /// The credential hash if this is a password change.
    pub fn password_hash(&self) -> Option<&str> {
        match self {
            TouchPayload::PasswordChange { hash } => Some(hash),
            _ => None,
        }
    }

    pub fn kind(&self) -> TouchKind {
        match self {
            TouchPayload::StateChange { .. } => TouchKind::State,
            TouchPayload::SpecificationChange { .. } => {
                TouchKind::Specification
            }
            TouchPayload::OwnershipChange { .. } => TouchKind::Ownership,
            TouchPayload::CreditAdjustment { .. } => TouchKind::Credit,
            TouchPayload::PasswordChange { .. } => TouchKind::Password,
        }
    }
}


//------------ Touch ---------------------------------------------------------

/// One immutable, sequenced event recorded against one target.
///
/// The sequence is assigned by the ledger and forms a total order
/// across the whole ledger, not per target. The timestamp is advisory
/// only; several touches may share one.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Touch {
    sequence: u64,
    target: TargetId,
    time: DateTime<Utc>,
    payload: TouchPayload,
}

impl Touch {
    pub(super) fn new(
        sequence: u64,
        target: TargetId,
        payload: TouchPayload,
    ) -> Self {
        Touch {
            sequence,
            target,
            time: Utc::now(),
            payload,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn kind(&self) -> TouchKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &TouchPayload {
        &self.payload
    }

    pub fn into_payload(self) -> TouchPayload {
        self.payload
    }
}

impl fmt::Display for Touch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sequence: {} target: {} kind: {}",
            self.sequence,
            self.target,
            self.kind()
        )
    }
}


//------------ Tests ---------------------------------------------------------

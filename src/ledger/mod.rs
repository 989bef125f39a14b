//! The append-only touch ledger.
//!
//! Every state change, specification change, ownership grant and credit
//! adjustment is recorded as an immutable, ordered event ("touch")
//! against an appliance or account. Current values are derived by
//! querying the ledger, never stored as separately mutated fields.

mod store;
pub use self::store::{TouchHistory, TouchLedger};

mod touch;
pub use self::touch::{TargetId, Touch, TouchKind, TouchPayload};

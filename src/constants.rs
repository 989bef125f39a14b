//! Various Stratus-wide constants.

//------------ Storage Namespaces -------------------------------------------

/// The namespace holding the touch ledger.
pub const LEDGER_NS: &str = "ledger";

/// The namespace holding the registered state list.
pub const REGISTRY_NS: &str = "registry";

/// The namespace holding appliance records.
pub const APPLIANCES_NS: &str = "appliances";

/// The namespace holding account records.
pub const ACCOUNTS_NS: &str = "accounts";


//------------ Well-known Values --------------------------------------------

/// The state reported for an appliance that has no state touch yet.
///
/// This is a defined sentinel, not an error. Adapters serialize it
/// like any other state name.
pub const STATE_UNINITIALISED: &str = "Not yet initialised";

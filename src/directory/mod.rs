//! Directories of appliances and accounts.
//!
//! Directories store identity records and hand out surrogate ids. All
//! "current" values (state, owner) are derived from the ledger at read
//! time; the records themselves never change after creation.

mod accounts;
pub use self::accounts::{AccountDirectory, AccountRecord};

mod appliances;
pub use self::appliances::{ApplianceDirectory, ApplianceRecord};

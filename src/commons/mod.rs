//! Common types used by the various Stratus components.

pub mod error;
pub mod storage;

//------------ Response Aliases ----------------------------------------------

pub type StratusResult<T> = std::result::Result<T, self::error::Error>;

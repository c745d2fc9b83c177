//! Cambio Common Types
//!
//! Shared types for the cambio exchange-rate service: currencies, money,
//! resolved rate records and clocks.

pub mod monetary;
pub mod rate;
pub mod time;

pub use monetary::*;
pub use rate::*;
pub use time::*;

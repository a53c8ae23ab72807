//! RateCache Common Types
//!
//! This crate contains the value types shared across the exchange rate
//! workspace: validated currency codes and pairs, monetary amounts, the
//! table of well-known currencies, and time helpers.

pub mod currencies;
pub mod monetary;
pub mod error;
pub mod time;

pub use currencies::*;
pub use monetary::*;
pub use error::*;
pub use time::*;

//! Services backing the price core.

pub mod price;

//! Shared data models for the price service and its HTTP surface.

pub mod quote;

pub use quote::{PriceTrend, Quote, ServiceStatus, SourceStatus};

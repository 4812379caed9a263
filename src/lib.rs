//! Live Bitcoin price distribution service.
//!
//! A single poller fetches quotes from one or more upstream sources, backs off on
//! failure, keeps a 24h rolling history, and fans each quote out to subscribers.

pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

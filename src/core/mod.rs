//! Core application primitives (poller, HTTP surface)

pub mod http;
pub mod scheduler;

pub use http::*;
pub use scheduler::*;

//! Request handling: per-document locking and the service facade

mod locks;
mod service;

pub use locks::DocLocks;
pub use service::{DocQa, HealthStatus};

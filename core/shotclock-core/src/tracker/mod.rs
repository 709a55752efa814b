//! Hierarchical time ledger: days, projects, sessions.

pub mod store;
pub mod types;

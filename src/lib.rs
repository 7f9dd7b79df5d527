//! Simulation job queue and state-transition ledger.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod ledger;
pub mod queue;
pub mod runner;
pub mod spec;
pub mod store;
pub mod transition;

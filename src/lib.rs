//! Proposal governance and voting engine for Bands.
//!
//! Members draft proposals, optionally pass them through review, vote on them
//! within a bounded window, and close them against a per-type tally rule.
//! Founders additionally vote unanimously on promoting members to founder.
//! The engine in [`governance`] owns every rule; [`http`] and [`rpc`] are
//! the service edges.

pub mod config;
mod entities;
pub mod error;
pub mod governance;
pub mod http;
pub mod models;
pub mod ports;
pub mod rpc;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{ErrorKind, GovernanceError, GovernanceResult};
pub use governance::GovernanceEngine;

//! Timetable consistency engine.
//!
//! Models a rail network and the jobs (train runs) scheduled over it, and
//! answers: "is this timetable physically possible?" Job paths are checked
//! against the network topology and travel times, rollingstock is tracked
//! through its couplings, and track occupancy conflicts between jobs are
//! reported.

pub mod background;
pub mod config;
pub mod conflict;
pub mod domain;
pub mod job;
pub mod ledger;
pub mod network;
pub mod session;

#[cfg(test)]
mod testutil;

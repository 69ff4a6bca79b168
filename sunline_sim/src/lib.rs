// sunline_sim/src/lib.rs

//! Closed-loop harness for the sunline filters: a spinning spacecraft truth
//! model, a coarse sun sensor array and in-memory bus topics standing in for
//! the flight software collaborators.

pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod sensors;
pub mod truth;

pub use error::SimError;

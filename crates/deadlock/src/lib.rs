//! Deadlock avoidance simulation.
//!
//! [`bankers`] implements the Banker's algorithm: a safety check over the
//! current allocation state and a request procedure that only grants
//! requests leading to a safe state.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub mod bankers;

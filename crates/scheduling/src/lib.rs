//! CPU and disk scheduling simulations.
//!
//! - [`round_robin`]: preemptive round-robin CPU scheduling with a Gantt
//!   chart and per-process timing report.
//! - [`disk`]: FCFS, SSTF, SCAN, C-SCAN, LOOK and C-LOOK head scheduling.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub mod disk;
pub mod round_robin;

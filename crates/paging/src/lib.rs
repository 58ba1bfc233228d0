//! Page replacement and demand paging simulations.
//!
//! - [`clock`]: the Clock (second-chance) replacement policy over a fixed set
//!   of frames, generic over the page identifier.
//! - [`vm`]: processes with page tables sharing one frame pool through the
//!   Clock replacer, plus a thrashing detector.
//!
//! Every operation runs to completion and returns the steps it took, so a
//! front end can replay them at any pace.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub mod clock;
pub mod vm;

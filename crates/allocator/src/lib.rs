//! Memory allocator simulations.
//!
//! This crate models two kernel memory allocators over simulated memory. No
//! real memory is handed out; every operation updates an owned model and
//! records the steps it took so a front end can replay them.
//!
//! # Available Allocators
//!
//! ## [`BuddyAllocator`](buddy::BuddyAllocator)
//!
//! Manages one power-of-two region as a binary tree of blocks. Best suited
//! for:
//!
//! - Page-granular allocations of varying sizes
//! - Observing internal fragmentation (rounding to powers of two)
//! - Observing external fragmentation (free bytes scattered over small blocks)
//!
//! **Performance**: O(log n) per split or merge step, O(n) worst-case search
//! where n is the number of tree nodes.
//!
//! ## [`SlabAllocator`](slab::SlabAllocator)
//!
//! Manages named caches of fixed-size object slots. Best suited for:
//!
//! - Frequently allocated kernel objects of one type
//! - Reusing freed slots before growing
//!
//! **Performance**: O(s) allocation where s is the number of slots in the
//! cache, O(1) deallocation once the slab is found.
//!
//! # Usage Example
//!
//! ```rust
//! use allocator::buddy::{BuddyAllocator, BuddyConfig, BuddyError};
//!
//! let mut buddy = BuddyAllocator::new(BuddyConfig::default()).unwrap();
//! let a = buddy.allocate(200).unwrap();
//! let b = buddy.allocate(500).unwrap();
//!
//! // 256 + 512 bytes are in use, 256 remain.
//! assert_eq!(buddy.free_bytes(), 256);
//! assert!(matches!(
//!     buddy.allocate(300),
//!     Err(BuddyError::InsufficientMemory { .. })
//! ));
//!
//! buddy.free(a).unwrap();
//! buddy.free(b).unwrap();
//! assert_eq!(buddy.blocks().len(), 1);
//! ```
//!
//! # Thread Safety
//!
//! The allocators are plain owned values. Mutation goes through `&mut self`,
//! so two operations can never interleave on one instance.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub mod buddy;
pub mod slab;

//! Buddy allocator implementation.
//!
//! This module manages a single power-of-two memory region as a binary tree
//! of blocks. Every allocation is rounded up to a power of two no smaller than
//! the configured minimum block, carved out of the tree by halving free blocks
//! ("splitting"), and returned to the tree by recombining a freed block with
//! its sibling ("buddy") whenever both halves are free ("merging").
//!
//! # Algorithm
//!
//! - **Allocation**: depth-first search from the root, left child before right
//!   child. A free leaf of exactly the rounded size is taken in place; a larger
//!   free leaf is split and the search continues in its left half.
//! - **Deallocation**: the leaf owning the allocation becomes free, then the
//!   allocator walks back up the tree collapsing every parent whose two
//!   children are both free leaves.
//!
//! Each operation records the steps it performed as [`BuddyEvent`]s, which
//! can be inspected through [`BuddyAllocator::events`] after the call.
//!
//! # Usage Example
//!
//! ```
//! use allocator::buddy::{BuddyAllocator, BuddyConfig, BuddyEvent};
//!
//! let mut buddy = BuddyAllocator::new(BuddyConfig::default()).unwrap();
//!
//! let id = buddy.allocate(100).unwrap();
//! assert_eq!(buddy.allocation(id).unwrap().size, 128);
//! assert_eq!(buddy.events().len(), 4); // three splits and the allocation
//!
//! buddy.free(id).unwrap();
//! assert!(buddy.events().last().unwrap().is_merge());
//! assert_eq!(buddy.free_bytes(), 1024);
//! ```

use alloc::{boxed::Box, collections::btree_map::BTreeMap, vec::Vec};
use core::fmt;

use snafu::{OptionExt as _, Snafu, ensure};
use snafu_utils::{Located, Location};

/// Identifier of a live allocation, displayed as `A1`, `A2`, ...
///
/// Identifiers are assigned monotonically starting at 1 and are never reused
/// by the same allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("A{_0}")]
pub struct AllocId(u32);

impl AllocId {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

/// Geometry of the managed region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuddyConfig {
    /// Size of the whole region. Must be a power of two.
    pub total_size: usize,
    /// Smallest block the tree may be split into. Must be a power of two no
    /// larger than `total_size`.
    pub min_block: usize,
}

impl Default for BuddyConfig {
    fn default() -> Self {
        Self {
            total_size: 1024,
            min_block: 16,
        }
    }
}

/// Errors reported by [`BuddyAllocator`].
///
/// No operation leaves the tree partially modified when it fails.
#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum BuddyError {
    #[snafu(display(
        "invalid block sizes: total {total_size} and minimum {min_block} must be powers of two \
         with minimum <= total"
    ))]
    InvalidBlockSize {
        total_size: usize,
        min_block: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("cannot allocate zero bytes"))]
    ZeroSizedRequest {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "cannot allocate {requested} bytes ({rounded} after rounding): only {free} bytes free"
    ))]
    InsufficientMemory {
        requested: usize,
        rounded: usize,
        free: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "cannot allocate {requested} bytes ({rounded} after rounding): {free} bytes free but no \
         single block is large enough"
    ))]
    AllocationDenied {
        requested: usize,
        rounded: usize,
        free: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no active allocation {id}"))]
    UnknownAllocation {
        id: AllocId,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for BuddyError {
    fn location(&self) -> Location {
        match self {
            Self::InvalidBlockSize { location, .. }
            | Self::ZeroSizedRequest { location }
            | Self::InsufficientMemory { location, .. }
            | Self::AllocationDenied { location, .. }
            | Self::UnknownAllocation { location, .. } => *location,
        }
    }
}

/// One step performed by an allocate or free call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum BuddyEvent {
    /// The free block at `offset` of `size` bytes was split into two halves.
    Split { offset: usize, size: usize },
    /// The block at `offset` was handed out as `id`.
    Alloc { id: AllocId, offset: usize, size: usize },
    /// The block at `offset` owned by `id` was released.
    Free { id: AllocId, offset: usize, size: usize },
    /// Two free halves were merged back into the block at `offset` of `size`
    /// bytes.
    Merge { offset: usize, size: usize },
}

impl fmt::Display for BuddyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Split { offset, size } => write!(
                f,
                "split block {size}@{offset} into two {} byte blocks",
                size / 2
            ),
            Self::Alloc { id, offset, size } => {
                write!(f, "allocated {size} bytes at {offset} as {id}")
            }
            Self::Free { id, offset, size } => {
                write!(f, "freed {id} ({size} bytes at {offset})")
            }
            Self::Merge { offset, size } => write!(
                f,
                "merged two {} byte blocks into {size}@{offset}",
                size / 2
            ),
        }
    }
}

/// Record of a live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub id: AllocId,
    /// Size passed to [`BuddyAllocator::allocate`].
    pub requested: usize,
    /// Size of the block actually reserved.
    pub size: usize,
    /// Start of the block inside the managed region.
    pub offset: usize,
}

/// State of a block in a [`Block`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum BlockState {
    /// Unsplit and available.
    Free,
    /// Unsplit and owned by an allocation.
    Allocated(AllocId),
    /// Split into two children which follow it in the snapshot.
    Split,
}

/// Read-only view of one tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: usize,
    pub size: usize,
    /// Distance from the root; the root has depth 0.
    pub depth: usize,
    pub state: BlockState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Free,
    Allocated(AllocId),
    Split(Box<[Self; 2]>),
}

impl Node {
    fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    fn children_mut(&mut self) -> Option<&mut [Self; 2]> {
        match self {
            Self::Split(children) => Some(children),
            Self::Free | Self::Allocated(_) => None,
        }
    }
}

/// A buddy allocator over a simulated power-of-two region.
///
/// The allocator owns its tree; callers observe it only through snapshots
/// ([`blocks`](Self::blocks)) and accessors, so the split/merge invariants
/// cannot be broken from outside.
///
/// # Invariants
///
/// - Every node is either a leaf or has exactly two children of half its size.
/// - Only leaves are allocated, and a split node is never free.
/// - The sizes of all leaves add up to the total size.
#[derive(Debug, Clone)]
pub struct BuddyAllocator {
    config: BuddyConfig,
    root: Node,
    allocations: BTreeMap<AllocId, Allocation>,
    next_id: u32,
    free_bytes: usize,
    events: Vec<BuddyEvent>,
}

impl BuddyAllocator {
    /// Creates an allocator whose whole region is one free block.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::InvalidBlockSize`] unless both sizes are powers of
    /// two and `min_block <= total_size`.
    ///
    /// # Examples
    ///
    /// ```
    /// use allocator::buddy::{BuddyAllocator, BuddyConfig};
    ///
    /// let config = BuddyConfig { total_size: 256, min_block: 32 };
    /// let buddy = BuddyAllocator::new(config).unwrap();
    /// assert_eq!(buddy.blocks().len(), 1);
    ///
    /// let bad = BuddyConfig { total_size: 1000, min_block: 16 };
    /// BuddyAllocator::new(bad).unwrap_err();
    /// ```
    pub fn new(config: BuddyConfig) -> Result<Self, BuddyError> {
        let BuddyConfig {
            total_size,
            min_block,
        } = config;
        ensure!(
            total_size.is_power_of_two()
                && min_block.is_power_of_two()
                && min_block <= total_size,
            buddy_error::InvalidBlockSizeSnafu {
                total_size,
                min_block
            }
        );
        Ok(Self {
            config,
            root: Node::Free,
            allocations: BTreeMap::new(),
            next_id: 1,
            free_bytes: total_size,
            events: Vec::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> BuddyConfig {
        self.config
    }

    /// Returns the block size a request of `requested` bytes is rounded to.
    ///
    /// The result saturates at `usize::MAX` when the next power of two does not
    /// fit in `usize`; such requests can never be satisfied.
    #[must_use]
    pub fn rounded_size(&self, requested: usize) -> usize {
        requested
            .max(self.config.min_block)
            .checked_next_power_of_two()
            .unwrap_or(usize::MAX)
    }

    /// Allocates a block large enough for `requested` bytes.
    ///
    /// On success the events of this call are the splits performed, in tree
    /// order from the root downwards, followed by a single
    /// [`BuddyEvent::Alloc`].
    ///
    /// # Errors
    ///
    /// - [`BuddyError::ZeroSizedRequest`] if `requested` is zero.
    /// - [`BuddyError::InsufficientMemory`] if the rounded size exceeds the
    ///   number of free bytes.
    /// - [`BuddyError::AllocationDenied`] if enough bytes are free but no free
    ///   block can hold the rounded size.
    pub fn allocate(&mut self, requested: usize) -> Result<AllocId, BuddyError> {
        self.events.clear();
        ensure!(requested > 0, buddy_error::ZeroSizedRequestSnafu);

        let rounded = self.rounded_size(requested);
        let free = self.free_bytes;
        ensure!(
            rounded <= free,
            buddy_error::InsufficientMemorySnafu {
                requested,
                rounded,
                free
            }
        );

        let id = AllocId(self.next_id);
        let mut search = Search {
            want: rounded,
            min_block: self.config.min_block,
            id,
            events: &mut self.events,
        };
        let offset = search
            .allocate_in(&mut self.root, 0, self.config.total_size)
            .context(buddy_error::AllocationDeniedSnafu {
                requested,
                rounded,
                free,
            })?;

        self.next_id += 1;
        self.free_bytes -= rounded;
        self.allocations.insert(
            id,
            Allocation {
                id,
                requested,
                size: rounded,
                offset,
            },
        );
        Ok(id)
    }

    /// Releases the block owned by `id` and merges it with free buddies.
    ///
    /// The events of this call are one [`BuddyEvent::Free`] followed by one
    /// [`BuddyEvent::Merge`] per coalescing step, smallest block first.
    ///
    /// # Errors
    ///
    /// Returns [`BuddyError::UnknownAllocation`] if `id` is not live. The tree
    /// is left untouched in that case.
    pub fn free(&mut self, id: AllocId) -> Result<(), BuddyError> {
        self.events.clear();
        let allocation = *self
            .allocations
            .get(&id)
            .context(buddy_error::UnknownAllocationSnafu { id })?;

        let found = free_in(
            &mut self.root,
            0,
            self.config.total_size,
            &allocation,
            &mut self.events,
        );
        ensure!(found, buddy_error::UnknownAllocationSnafu { id });

        self.allocations.remove(&id);
        self.free_bytes += allocation.size;
        Ok(())
    }

    /// Releases every allocation, returning the tree to a single free root.
    pub fn reset(&mut self) {
        self.root = Node::Free;
        self.allocations.clear();
        self.free_bytes = self.config.total_size;
        self.events.clear();
    }

    /// Events recorded by the most recent allocate or free call.
    #[must_use]
    pub fn events(&self) -> &[BuddyEvent] {
        &self.events
    }

    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.free_bytes
    }

    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.config.total_size - self.free_bytes
    }

    #[must_use]
    pub fn allocation(&self, id: AllocId) -> Option<&Allocation> {
        self.allocations.get(&id)
    }

    /// Live allocations in id order.
    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> + '_ {
        self.allocations.values()
    }

    /// Size of the largest free block, or 0 if nothing is free.
    ///
    /// The gap between this and [`free_bytes`](Self::free_bytes) is the
    /// external fragmentation of the region.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        self.blocks()
            .iter()
            .filter(|b| b.state.is_free())
            .map(|b| b.size)
            .max()
            .unwrap_or(0)
    }

    /// Snapshot of every node in preorder (parent, left subtree, right
    /// subtree).
    #[must_use]
    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut stack = alloc::vec![(&self.root, 0, self.config.total_size, 0)];
        while let Some((node, offset, size, depth)) = stack.pop() {
            let state = match node {
                Node::Free => BlockState::Free,
                Node::Allocated(id) => BlockState::Allocated(*id),
                Node::Split(children) => {
                    let half = size / 2;
                    stack.push((&children[1], offset + half, half, depth + 1));
                    stack.push((&children[0], offset, half, depth + 1));
                    BlockState::Split
                }
            };
            blocks.push(Block {
                offset,
                size,
                depth,
                state,
            });
        }
        blocks
    }
}

/// Depth-first search state of one allocate call.
struct Search<'a> {
    want: usize,
    min_block: usize,
    id: AllocId,
    events: &'a mut Vec<BuddyEvent>,
}

impl Search<'_> {
    /// Returns the offset of the allocated block, or `None` if the subtree has
    /// no room.
    ///
    /// A split only happens on a free leaf strictly larger than `want`, whose
    /// left half is then guaranteed to satisfy the request, so a failed search
    /// never modifies the tree.
    fn allocate_in(&mut self, node: &mut Node, offset: usize, size: usize) -> Option<usize> {
        if size < self.want {
            return None;
        }
        match node {
            Node::Allocated(_) => return None,
            Node::Free if size == self.want => {
                *node = Node::Allocated(self.id);
                self.events.push(BuddyEvent::Alloc {
                    id: self.id,
                    offset,
                    size,
                });
                return Some(offset);
            }
            Node::Free => {
                if size / 2 < self.min_block {
                    return None;
                }
                *node = Node::Split(Box::new([Node::Free, Node::Free]));
                self.events.push(BuddyEvent::Split { offset, size });
            }
            Node::Split(_) => {}
        }

        let half = size / 2;
        let [left, right] = node.children_mut()?;
        self.allocate_in(left, offset, half)
            .or_else(|| self.allocate_in(right, offset + half, half))
    }
}

/// Frees `allocation` inside the subtree rooted at `node`, merging on the way
/// back up. Returns `false` if the allocation is not in this subtree.
fn free_in(
    node: &mut Node,
    offset: usize,
    size: usize,
    allocation: &Allocation,
    events: &mut Vec<BuddyEvent>,
) -> bool {
    let mergeable = match node {
        Node::Allocated(owner) if *owner == allocation.id => {
            *node = Node::Free;
            events.push(BuddyEvent::Free {
                id: allocation.id,
                offset,
                size,
            });
            return true;
        }
        Node::Split(children) => {
            let half = size / 2;
            let found = if allocation.offset < offset + half {
                free_in(&mut children[0], offset, half, allocation, events)
            } else {
                free_in(&mut children[1], offset + half, half, allocation, events)
            };
            if !found {
                return false;
            }
            children.iter().all(Node::is_free)
        }
        Node::Free | Node::Allocated(_) => return false,
    };

    if mergeable {
        *node = Node::Free;
        events.push(BuddyEvent::Merge { offset, size });
    }
    true
}

#[cfg(test)]
mod tests {
    use alloc::{vec, vec::Vec};

    use rand::{Rng as _, SeedableRng as _, rngs::StdRng};

    use super::*;

    fn buddy(total_size: usize, min_block: usize) -> BuddyAllocator {
        BuddyAllocator::new(BuddyConfig {
            total_size,
            min_block,
        })
        .unwrap()
    }

    fn leaves(buddy: &BuddyAllocator) -> Vec<(usize, BlockState)> {
        buddy
            .blocks()
            .into_iter()
            .filter(|b| !b.state.is_split())
            .map(|b| (b.size, b.state))
            .collect()
    }

    fn assert_conserved(buddy: &BuddyAllocator) {
        let leaves = leaves(buddy);
        let free: usize = leaves
            .iter()
            .filter(|(_, s)| s.is_free())
            .map(|(size, _)| size)
            .sum();
        let used: usize = leaves
            .iter()
            .filter(|(_, s)| s.is_allocated())
            .map(|(size, _)| size)
            .sum();
        assert_eq!(free + used, buddy.config().total_size);
        assert_eq!(free, buddy.free_bytes());
        let recorded: usize = buddy.allocations().map(|a| a.size).sum();
        assert_eq!(used, recorded);
    }

    #[test]
    fn test_invalid_config() {
        for (total, min) in [(1000, 16), (1024, 24), (1024, 0), (0, 16), (16, 32)] {
            let err = BuddyAllocator::new(BuddyConfig {
                total_size: total,
                min_block: min,
            })
            .unwrap_err();
            assert!(matches!(err, BuddyError::InvalidBlockSize { .. }));
        }
        BuddyAllocator::new(BuddyConfig {
            total_size: 16,
            min_block: 16,
        })
        .unwrap();
    }

    #[test]
    fn test_allocate_splits_down_to_size() {
        let mut buddy = buddy(1024, 16);
        let id = buddy.allocate(100).unwrap();
        assert_eq!(id, AllocId::from_raw(1));
        assert_eq!(
            buddy.events(),
            &[
                BuddyEvent::Split {
                    offset: 0,
                    size: 1024
                },
                BuddyEvent::Split {
                    offset: 0,
                    size: 512
                },
                BuddyEvent::Split {
                    offset: 0,
                    size: 256
                },
                BuddyEvent::Alloc {
                    id,
                    offset: 0,
                    size: 128
                },
            ]
        );
        assert_eq!(
            leaves(&buddy),
            vec![
                (128, BlockState::Allocated(id)),
                (128, BlockState::Free),
                (256, BlockState::Free),
                (512, BlockState::Free),
            ]
        );
        assert_conserved(&buddy);
    }

    #[test]
    fn test_small_request_rounds_to_floor() {
        let mut buddy = buddy(1024, 16);
        let id = buddy.allocate(5).unwrap();
        let allocation = buddy.allocation(id).unwrap();
        assert_eq!(allocation.size, 16);
        assert_eq!(allocation.requested, 5);
        assert_eq!(buddy.rounded_size(1), 16);
        assert_eq!(buddy.rounded_size(17), 32);
        assert_eq!(buddy.rounded_size(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_zero_sized_request() {
        let mut buddy = buddy(1024, 16);
        let err = buddy.allocate(0).unwrap_err();
        assert!(matches!(err, BuddyError::ZeroSizedRequest { .. }));
        assert_eq!(buddy.blocks().len(), 1);
    }

    #[test]
    fn test_oversized_request_does_not_split() {
        let mut buddy = buddy(1024, 16);
        let err = buddy.allocate(1025).unwrap_err();
        assert!(matches!(
            err,
            BuddyError::InsufficientMemory {
                requested: 1025,
                rounded: 2048,
                free: 1024,
                ..
            }
        ));
        assert_eq!(buddy.blocks().len(), 1);
        assert!(buddy.events().is_empty());

        let err = buddy.allocate(usize::MAX).unwrap_err();
        assert!(matches!(err, BuddyError::InsufficientMemory { .. }));
    }

    #[test]
    fn test_whole_region_allocation() {
        let mut buddy = buddy(1024, 16);
        let id = buddy.allocate(1024).unwrap();
        assert_eq!(
            buddy.events(),
            &[BuddyEvent::Alloc {
                id,
                offset: 0,
                size: 1024
            }]
        );
        let err = buddy.allocate(16).unwrap_err();
        assert!(matches!(err, BuddyError::InsufficientMemory { free: 0, .. }));
    }

    #[test]
    fn test_insufficient_after_partial_use() {
        let mut buddy = buddy(1024, 16);
        buddy.allocate(512).unwrap();
        buddy.allocate(256).unwrap();
        let err = buddy.allocate(512).unwrap_err();
        assert!(matches!(
            err,
            BuddyError::InsufficientMemory {
                rounded: 512,
                free: 256,
                ..
            }
        ));
    }

    #[test]
    fn test_fragmentation_is_reported_separately() {
        let mut buddy = buddy(256, 64);
        let a = buddy.allocate(64).unwrap();
        let _b = buddy.allocate(64).unwrap();
        let c = buddy.allocate(64).unwrap();
        let _d = buddy.allocate(64).unwrap();
        buddy.free(a).unwrap();
        buddy.free(c).unwrap();
        assert_eq!(buddy.free_bytes(), 128);
        assert_eq!(buddy.largest_free_block(), 64);

        let before = buddy.blocks();
        let err = buddy.allocate(128).unwrap_err();
        assert!(matches!(
            err,
            BuddyError::AllocationDenied {
                requested: 128,
                rounded: 128,
                free: 128,
                ..
            }
        ));
        assert_eq!(buddy.blocks(), before);
        assert!(buddy.events().is_empty());
    }

    #[test]
    fn test_second_allocation_reuses_split_tree() {
        let mut buddy = buddy(1024, 16);
        let a = buddy.allocate(64).unwrap();
        let b = buddy.allocate(64).unwrap();
        assert_eq!(buddy.allocation(a).unwrap().offset, 0);
        assert_eq!(buddy.allocation(b).unwrap().offset, 64);
        assert_eq!(
            buddy.events(),
            &[BuddyEvent::Alloc {
                id: b,
                offset: 64,
                size: 64
            }]
        );
    }

    #[test]
    fn test_left_subtree_is_preferred() {
        let mut buddy = buddy(1024, 16);
        let a = buddy.allocate(256).unwrap();
        let b = buddy.allocate(256).unwrap();
        let c = buddy.allocate(256).unwrap();
        buddy.free(a).unwrap();
        let d = buddy.allocate(128).unwrap();
        assert_eq!(buddy.allocation(d).unwrap().offset, 0);
        assert_eq!(buddy.allocation(b).unwrap().offset, 256);
        assert_eq!(buddy.allocation(c).unwrap().offset, 512);
    }

    #[test]
    fn test_free_merges_back_to_root() {
        let mut buddy = buddy(1024, 16);
        let a = buddy.allocate(64).unwrap();
        let b = buddy.allocate(64).unwrap();

        buddy.free(a).unwrap();
        assert_eq!(
            buddy.events(),
            &[BuddyEvent::Free {
                id: a,
                offset: 0,
                size: 64
            }]
        );
        assert_conserved(&buddy);

        buddy.free(b).unwrap();
        assert_eq!(
            buddy.events(),
            &[
                BuddyEvent::Free {
                    id: b,
                    offset: 64,
                    size: 64
                },
                BuddyEvent::Merge {
                    offset: 0,
                    size: 128
                },
                BuddyEvent::Merge {
                    offset: 0,
                    size: 256
                },
                BuddyEvent::Merge {
                    offset: 0,
                    size: 512
                },
                BuddyEvent::Merge {
                    offset: 0,
                    size: 1024
                },
            ]
        );
        assert_eq!(leaves(&buddy), vec![(1024, BlockState::Free)]);
        assert_eq!(buddy.allocations().count(), 0);
    }

    #[test]
    fn test_merge_stops_at_busy_buddy() {
        let mut buddy = buddy(1024, 16);
        let a = buddy.allocate(128).unwrap();
        let _b = buddy.allocate(256).unwrap();
        buddy.free(a).unwrap();
        assert_eq!(
            buddy.events(),
            &[
                BuddyEvent::Free {
                    id: a,
                    offset: 0,
                    size: 128
                },
                BuddyEvent::Merge {
                    offset: 0,
                    size: 256
                },
            ]
        );
        assert_eq!(
            leaves(&buddy)
                .iter()
                .map(|(size, _)| *size)
                .collect::<Vec<_>>(),
            vec![256, 256, 512]
        );
    }

    #[test]
    fn test_free_unknown_id() {
        let mut buddy = buddy(1024, 16);
        let a = buddy.allocate(32).unwrap();
        let before = buddy.blocks();

        let err = buddy.free(AllocId::from_raw(42)).unwrap_err();
        assert!(matches!(err, BuddyError::UnknownAllocation { .. }));
        assert_eq!(buddy.blocks(), before);

        buddy.free(a).unwrap();
        let err = buddy.free(a).unwrap_err();
        assert!(matches!(err, BuddyError::UnknownAllocation { id, .. } if id == a));
        assert_eq!(buddy.blocks().len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut buddy = buddy(1024, 16);
        let a = buddy.allocate(16).unwrap();
        buddy.free(a).unwrap();
        let b = buddy.allocate(16).unwrap();
        assert_ne!(a, b);
        assert_eq!(b.to_string(), "A2");
    }

    #[test]
    fn test_reset() {
        let mut buddy = buddy(1024, 16);
        buddy.allocate(100).unwrap();
        buddy.allocate(300).unwrap();
        buddy.reset();
        assert_eq!(buddy.blocks().len(), 1);
        assert_eq!(buddy.free_bytes(), 1024);
        assert!(buddy.events().is_empty());
    }

    #[test]
    fn test_blocks_preorder() {
        let mut buddy = buddy(64, 16);
        let a = buddy.allocate(16).unwrap();
        let blocks = buddy.blocks();
        let summary: Vec<_> = blocks
            .iter()
            .map(|b| (b.offset, b.size, b.depth, b.state))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, 64, 0, BlockState::Split),
                (0, 32, 1, BlockState::Split),
                (0, 16, 2, BlockState::Allocated(a)),
                (16, 16, 2, BlockState::Free),
                (32, 32, 1, BlockState::Free),
            ]
        );
    }

    #[test]
    fn test_event_display() {
        let id = AllocId::from_raw(3);
        assert_eq!(
            BuddyEvent::Split {
                offset: 0,
                size: 256
            }
            .to_string(),
            "split block 256@0 into two 128 byte blocks"
        );
        assert_eq!(
            BuddyEvent::Alloc {
                id,
                offset: 128,
                size: 128
            }
            .to_string(),
            "allocated 128 bytes at 128 as A3"
        );
        assert_eq!(
            BuddyEvent::Merge {
                offset: 0,
                size: 256
            }
            .to_string(),
            "merged two 128 byte blocks into 256@0"
        );
    }

    #[test]
    fn test_random_sequences_conserve_memory() {
        let mut rng = StdRng::seed_from_u64(0x9E37_79B9_7F4A_7C15);
        for _ in 0..20 {
            let mut buddy = buddy(1024, 16);
            let mut live = Vec::new();
            for _ in 0..200 {
                if live.is_empty() || rng.gen_range(0..3) != 0 {
                    let size = rng.gen_range(1..=300);
                    match buddy.allocate(size) {
                        Ok(id) => live.push(id),
                        Err(
                            BuddyError::InsufficientMemory { .. }
                            | BuddyError::AllocationDenied { .. },
                        ) => {}
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                } else {
                    let id = live.swap_remove(rng.gen_range(0..live.len()));
                    buddy.free(id).unwrap();
                }
                assert_conserved(&buddy);
            }

            while !live.is_empty() {
                let id = live.swap_remove(rng.gen_range(0..live.len()));
                buddy.free(id).unwrap();
                assert_conserved(&buddy);
            }
            assert_eq!(leaves(&buddy), vec![(1024, BlockState::Free)]);
        }
    }
}

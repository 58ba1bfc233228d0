//! Slab allocator implementation.
//!
//! A slab allocator groups objects of one kind into caches. Each cache owns a
//! list of slabs, and each slab is a fixed number of equally sized object
//! slots. Allocation takes the first free slot of the oldest slab that has one
//! and only grows the cache by a fresh slab when every slab is full, which
//! keeps objects of one kind packed together.
//!
//! # Usage Example
//!
//! ```
//! use allocator::slab::{SlabAllocator, SlabConfig, SlabEvent};
//!
//! let mut slabs = SlabAllocator::new(SlabConfig::default()).unwrap();
//!
//! let obj = slabs.allocate("task_struct").unwrap();
//! assert!(slabs.events()[0].is_new_slab());
//!
//! slabs.free(&obj).unwrap();
//! assert_eq!(slabs.shrink("task_struct").unwrap(), 1);
//! ```

use alloc::{
    borrow::ToOwned as _,
    string::{String, ToString},
    vec,
    vec::Vec,
};
use core::fmt;

use snafu::{OptionExt as _, Snafu, ensure};
use snafu_utils::{Located, Location};

/// Caches created by [`SlabConfig::default`].
pub const DEFAULT_CACHES: [&str; 2] = ["task_struct", "inode_cache"];

/// Identifier of a slab inside its cache, unique for the cache's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("S{_0}")]
pub struct SlabId(u32);

impl SlabId {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlabConfig {
    /// Number of object slots in every slab.
    pub objects_per_slab: usize,
    /// Names of the caches to create.
    pub caches: Vec<String>,
}

impl Default for SlabConfig {
    fn default() -> Self {
        Self {
            objects_per_slab: 4,
            caches: DEFAULT_CACHES.iter().map(|&name| name.to_owned()).collect(),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum SlabError {
    #[snafu(display("slabs must hold at least one object"))]
    InvalidSlabSize {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("cache {name:?} is defined twice"))]
    DuplicateCache {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no cache named {name:?}"))]
    UnknownCache {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("cache {cache:?} has no slab {slab}"))]
    UnknownSlab {
        cache: String,
        slab: SlabId,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("slot {slot} is out of range for slab {slab} of {capacity} objects"))]
    SlotOutOfRange {
        slab: SlabId,
        slot: usize,
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("object {slab}/{slot} in cache {cache:?} is already free"))]
    DoubleFree {
        cache: String,
        slab: SlabId,
        slot: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for SlabError {
    fn location(&self) -> Location {
        match self {
            Self::InvalidSlabSize { location }
            | Self::DuplicateCache { location, .. }
            | Self::UnknownCache { location, .. }
            | Self::UnknownSlab { location, .. }
            | Self::SlotOutOfRange { location, .. }
            | Self::DoubleFree { location, .. } => *location,
        }
    }
}

/// Handle to an allocated object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub cache: String,
    pub slab: SlabId,
    pub slot: usize,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cache, self.slab, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::IsVariant)]
pub enum SlabEvent {
    /// A slot of an existing slab was handed out.
    Alloc(ObjectRef),
    /// The cache grew by a slab whose first slot was handed out.
    NewSlab(ObjectRef),
    Free(ObjectRef),
    /// An empty slab was released by [`SlabAllocator::shrink`].
    Release { cache: String, slab: SlabId },
}

impl fmt::Display for SlabEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc(obj) => write!(f, "allocated object {obj}"),
            Self::NewSlab(obj) => write!(
                f,
                "created slab {} in {} and allocated object {obj}",
                obj.slab, obj.cache
            ),
            Self::Free(obj) => write!(f, "freed object {obj}"),
            Self::Release { cache, slab } => write!(f, "released empty slab {slab} from {cache}"),
        }
    }
}

/// Read-only view of a slab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slab {
    id: SlabId,
    used: Vec<bool>,
}

impl Slab {
    fn new(id: SlabId, capacity: usize) -> Self {
        Self {
            id,
            used: vec![false; capacity],
        }
    }

    #[must_use]
    pub fn id(&self) -> SlabId {
        self.id
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.used.len()
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.used.iter().filter(|&&used| used).count()
    }

    /// Occupancy of each slot, `true` meaning allocated.
    #[must_use]
    pub fn slots(&self) -> &[bool] {
        &self.used
    }

    fn first_free(&self) -> Option<usize> {
        self.used.iter().position(|&used| !used)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    name: String,
    slabs: Vec<Slab>,
    next_slab: u32,
}

impl Cache {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slabs in creation order.
    #[must_use]
    pub fn slabs(&self) -> &[Slab] {
        &self.slabs
    }

    #[must_use]
    pub fn objects_in_use(&self) -> usize {
        self.slabs.iter().map(Slab::in_use).sum()
    }
}

#[derive(Debug, Clone)]
pub struct SlabAllocator {
    objects_per_slab: usize,
    caches: Vec<Cache>,
    events: Vec<SlabEvent>,
}

impl SlabAllocator {
    /// Creates an allocator with one empty cache per configured name.
    ///
    /// # Errors
    ///
    /// Returns [`SlabError::InvalidSlabSize`] if `objects_per_slab` is zero and
    /// [`SlabError::DuplicateCache`] if a cache name repeats.
    pub fn new(config: SlabConfig) -> Result<Self, SlabError> {
        ensure!(
            config.objects_per_slab > 0,
            slab_error::InvalidSlabSizeSnafu
        );
        let mut caches: Vec<Cache> = Vec::with_capacity(config.caches.len());
        for name in config.caches {
            ensure!(
                caches.iter().all(|c| c.name != name),
                slab_error::DuplicateCacheSnafu { name }
            );
            caches.push(Cache {
                name,
                slabs: Vec::new(),
                next_slab: 1,
            });
        }
        Ok(Self {
            objects_per_slab: config.objects_per_slab,
            caches,
            events: Vec::new(),
        })
    }

    #[must_use]
    pub fn caches(&self) -> &[Cache] {
        &self.caches
    }

    #[must_use]
    pub fn cache(&self, name: &str) -> Option<&Cache> {
        self.caches.iter().find(|c| c.name == name)
    }

    /// Events recorded by the most recent operation.
    #[must_use]
    pub fn events(&self) -> &[SlabEvent] {
        &self.events
    }

    fn cache_mut(&mut self, name: &str) -> Result<&mut Cache, SlabError> {
        self.caches
            .iter_mut()
            .find(|c| c.name == name)
            .context(slab_error::UnknownCacheSnafu { name })
    }

    /// Allocates one object from the cache called `cache`.
    ///
    /// # Errors
    ///
    /// Returns [`SlabError::UnknownCache`] if there is no such cache.
    pub fn allocate(&mut self, cache: &str) -> Result<ObjectRef, SlabError> {
        self.events.clear();
        let objects_per_slab = self.objects_per_slab;
        let target = self.cache_mut(cache)?;

        let existing = target
            .slabs
            .iter_mut()
            .find_map(|slab| slab.first_free().map(|slot| (slab, slot)));
        let (event, obj) = if let Some((slab, slot)) = existing {
            slab.used[slot] = true;
            let obj = ObjectRef {
                cache: cache.to_owned(),
                slab: slab.id,
                slot,
            };
            (SlabEvent::Alloc(obj.clone()), obj)
        } else {
            let mut slab = Slab::new(SlabId(target.next_slab), objects_per_slab);
            target.next_slab += 1;
            slab.used[0] = true;
            let obj = ObjectRef {
                cache: cache.to_owned(),
                slab: slab.id,
                slot: 0,
            };
            target.slabs.push(slab);
            (SlabEvent::NewSlab(obj.clone()), obj)
        };

        self.events.push(event);
        Ok(obj)
    }

    /// Returns an object to its slab.
    ///
    /// # Errors
    ///
    /// Fails if the cache, slab or slot does not exist, or if the slot is not
    /// allocated.
    pub fn free(&mut self, obj: &ObjectRef) -> Result<(), SlabError> {
        self.events.clear();
        let cache = self.cache_mut(&obj.cache)?;
        let slab = cache
            .slabs
            .iter_mut()
            .find(|s| s.id == obj.slab)
            .with_context(|| slab_error::UnknownSlabSnafu {
                cache: obj.cache.clone(),
                slab: obj.slab,
            })?;
        let capacity = slab.capacity();
        let used = slab
            .used
            .get_mut(obj.slot)
            .context(slab_error::SlotOutOfRangeSnafu {
                slab: obj.slab,
                slot: obj.slot,
                capacity,
            })?;
        ensure!(
            *used,
            slab_error::DoubleFreeSnafu {
                cache: obj.cache.clone(),
                slab: obj.slab,
                slot: obj.slot,
            }
        );
        *used = false;

        self.events.push(SlabEvent::Free(obj.clone()));
        Ok(())
    }

    /// Releases every slab of `cache` with no object in use and returns how
    /// many were released.
    ///
    /// # Errors
    ///
    /// Returns [`SlabError::UnknownCache`] if there is no such cache.
    pub fn shrink(&mut self, cache: &str) -> Result<usize, SlabError> {
        self.events.clear();
        let target = self.cache_mut(cache)?;
        let mut released = Vec::new();
        target.slabs.retain(|slab| {
            let empty = slab.in_use() == 0;
            if empty {
                released.push(slab.id);
            }
            !empty
        });
        let name = target.name.clone();
        self.events
            .extend(released.iter().map(|&slab| SlabEvent::Release {
                cache: name.clone(),
                slab,
            }));
        Ok(released.len())
    }

    /// Drops every slab of every cache.
    pub fn reset(&mut self) {
        for cache in &mut self.caches {
            cache.slabs.clear();
            cache.next_slab = 1;
        }
        self.events.clear();
    }
}

impl fmt::Display for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.name)?;
        if self.slabs.is_empty() {
            return write!(f, " (no slabs)");
        }
        for slab in &self.slabs {
            let cells: String = slab
                .used
                .iter()
                .map(|&used| if used { 'X' } else { '.' })
                .collect();
            write!(
                f,
                " {}[{cells}] {}/{}",
                slab.id,
                slab.in_use(),
                slab.capacity()
            )?;
        }
        Ok(())
    }
}

impl SlabAllocator {
    /// Short summary of every cache, one line each.
    #[must_use]
    pub fn summary(&self) -> Vec<String> {
        self.caches.iter().map(ToString::to_string).collect()
    }
}

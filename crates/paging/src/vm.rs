//! Demand paging for a set of processes sharing one frame pool.
//!
//! Each process owns `page_count` virtual pages. Pages are brought into
//! physical frames on first touch and evicted by a [`Clock`] replacer shared
//! by every process. The model also reports thrashing: when the pages the
//! live processes want exceed the frame pool by more than the configured
//! ratio, most accesses fault and little useful work gets done.

use alloc::{collections::BTreeMap, vec::Vec};
use core::fmt;

use bitflags::bitflags;
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};
use snafu_utils::{Located, Location};

use crate::clock::{Access, Clock, ClockConfig, ClockError};

/// Largest number of virtual pages one process may own.
pub const MAX_PROCESS_PAGES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VmConfig {
    pub frame_count: usize,
    /// Demand above `frame_count * thrashing_ratio` pages counts as thrashing.
    pub thrashing_ratio: f64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            frame_count: 8,
            thrashing_ratio: 1.5,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
#[display("{_0}")]
pub struct Pid(u32);

impl Pid {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

/// A virtual page of one process, written `pid-vpn`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
#[display("{pid}-{vpn}")]
pub struct VirtPage {
    pub pid: Pid,
    pub vpn: usize,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PteFlags: u8 {
        const PRESENT = 1 << 0;
        const REFERENCED = 1 << 1;
        const MODIFIED = 1 << 2;
    }
}

impl fmt::Display for PteFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, ch) in [
            (Self::PRESENT, 'P'),
            (Self::REFERENCED, 'R'),
            (Self::MODIFIED, 'M'),
        ] {
            let ch = if self.contains(flag) { ch } else { '-' };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    flags: PteFlags,
    frame: Option<usize>,
}

impl PageTableEntry {
    #[must_use]
    pub fn flags(&self) -> PteFlags {
        self.flags
    }

    #[must_use]
    pub fn frame(&self) -> Option<usize> {
        self.frame
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.flags.contains(PteFlags::PRESENT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum AccessType {
    Read,
    Write,
}

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum VmError {
    #[snafu(display("invalid frame pool"))]
    InvalidFramePool {
        source: ClockError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("thrashing ratio must be a positive number, got {ratio}"))]
    InvalidThrashingRatio {
        ratio: f64,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "a process needs between 1 and {MAX_PROCESS_PAGES} pages, got {page_count}"
    ))]
    InvalidPageCount {
        page_count: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no process with pid {pid}"))]
    UnknownProcess {
        pid: Pid,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("page {vpn} is outside process {pid} ({page_count} pages)"))]
    PageOutOfRange {
        pid: Pid,
        vpn: usize,
        page_count: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for VmError {
    fn location(&self) -> Location {
        match self {
            Self::InvalidFramePool { location, .. }
            | Self::InvalidThrashingRatio { location, .. }
            | Self::InvalidPageCount { location, .. }
            | Self::UnknownProcess { location, .. }
            | Self::PageOutOfRange { location, .. } => *location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::IsVariant)]
pub enum VmEvent {
    ProcessCreated { pid: Pid, page_count: usize },
    ProcessTerminated { pid: Pid, freed_frames: usize },
    PageFault { page: VirtPage },
    PageIn { page: VirtPage, frame: usize },
    /// `page` lost its frame; a modified page is written back first.
    Evicted { page: VirtPage, written_back: bool },
}

impl fmt::Display for VmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProcessCreated { pid, page_count } => {
                write!(f, "created process {pid} with {page_count} pages")
            }
            Self::ProcessTerminated { pid, freed_frames } => {
                write!(f, "terminated process {pid}, freed {freed_frames} frames")
            }
            Self::PageFault { page } => write!(f, "page fault on {page}"),
            Self::PageIn { page, frame } => write!(f, "loaded {page} into frame {frame}"),
            Self::Evicted {
                page,
                written_back: true,
            } => write!(f, "evicted {page}, wrote dirty page back"),
            Self::Evicted {
                page,
                written_back: false,
            } => write!(f, "evicted {page}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Process {
    pid: Pid,
    page_count: usize,
}

impl Process {
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrashingStatus {
    /// Pages wanted by all live processes.
    pub demand: usize,
    /// Physical frames.
    pub capacity: usize,
    pub threshold: f64,
    pub thrashing: bool,
}

impl fmt::Display for ThrashingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            demand,
            capacity,
            threshold,
            thrashing,
        } = self;
        let verdict = if *thrashing { "thrashing" } else { "stable" };
        write!(
            f,
            "{verdict}: demand {demand} pages, {capacity} frames, threshold {threshold:.1}"
        )
    }
}

#[derive(Debug, Clone)]
pub struct VirtualMemory {
    config: VmConfig,
    clock: Clock<VirtPage>,
    processes: BTreeMap<Pid, Process>,
    page_table: BTreeMap<VirtPage, PageTableEntry>,
    next_pid: u32,
    events: Vec<VmEvent>,
}

impl VirtualMemory {
    /// # Errors
    ///
    /// Fails on an empty frame pool or a ratio that is not a positive
    /// finite number.
    pub fn new(config: VmConfig) -> Result<Self, VmError> {
        let ratio = config.thrashing_ratio;
        ensure!(
            ratio.is_finite() && ratio > 0.0,
            vm_error::InvalidThrashingRatioSnafu { ratio }
        );
        let clock = Clock::new(ClockConfig {
            frame_count: config.frame_count,
        })
        .context(vm_error::InvalidFramePoolSnafu)?;
        Ok(Self {
            config,
            clock,
            processes: BTreeMap::new(),
            page_table: BTreeMap::new(),
            next_pid: 1,
            events: Vec::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> &Clock<VirtPage> {
        &self.clock
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    #[must_use]
    pub fn process(&self, pid: Pid) -> Option<&Process> {
        self.processes.get(&pid)
    }

    /// Page table entries of `pid` in page order.
    pub fn page_table(&self, pid: Pid) -> impl Iterator<Item = (&VirtPage, &PageTableEntry)> {
        self.page_table
            .range(VirtPage { pid, vpn: 0 }..=VirtPage { pid, vpn: usize::MAX })
    }

    #[must_use]
    pub fn entry(&self, page: VirtPage) -> Option<&PageTableEntry> {
        self.page_table.get(&page)
    }

    /// Events of the most recent operation.
    #[must_use]
    pub fn events(&self) -> &[VmEvent] {
        &self.events
    }

    /// Starts a process with `page_count` non-resident pages.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::InvalidPageCount`] if `page_count` is zero or larger
    /// than [`MAX_PROCESS_PAGES`].
    pub fn create_process(&mut self, page_count: usize) -> Result<Pid, VmError> {
        self.events.clear();
        ensure!(
            (1..=MAX_PROCESS_PAGES).contains(&page_count),
            vm_error::InvalidPageCountSnafu { page_count }
        );

        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        self.processes.insert(pid, Process { pid, page_count });
        for vpn in 0..page_count {
            self.page_table
                .insert(VirtPage { pid, vpn }, PageTableEntry::default());
        }
        self.events
            .push(VmEvent::ProcessCreated { pid, page_count });
        Ok(pid)
    }

    /// Touches page `vpn` of `pid`, faulting it in if needed.
    ///
    /// # Errors
    ///
    /// Fails if the process does not exist or `vpn` is beyond its pages.
    pub fn access(
        &mut self,
        pid: Pid,
        vpn: usize,
        kind: AccessType,
    ) -> Result<Access<VirtPage>, VmError> {
        self.events.clear();
        let process = self
            .processes
            .get(&pid)
            .context(vm_error::UnknownProcessSnafu { pid })?;
        ensure!(
            vpn < process.page_count,
            vm_error::PageOutOfRangeSnafu {
                pid,
                vpn,
                page_count: process.page_count,
            }
        );

        let page = VirtPage { pid, vpn };
        let access = self.clock.access(page);
        if access.kind.is_miss() {
            self.events.push(VmEvent::PageFault { page });
        }
        if let Some(evicted) = access.evicted {
            let mut written_back = false;
            if let Some(entry) = self.page_table.get_mut(&evicted) {
                written_back = entry.flags.contains(PteFlags::MODIFIED);
                *entry = PageTableEntry::default();
            }
            self.events.push(VmEvent::Evicted {
                page: evicted,
                written_back,
            });
        }
        if access.kind.is_miss() {
            self.events.push(VmEvent::PageIn {
                page,
                frame: access.frame,
            });
        }

        if let Some(entry) = self.page_table.get_mut(&page) {
            entry.flags.insert(PteFlags::PRESENT);
            entry.frame = Some(access.frame);
            if kind.is_write() {
                entry.flags.insert(PteFlags::MODIFIED);
            }
        }
        self.sync_reference_bits();
        Ok(access)
    }

    /// Copies the replacer's reference bits into the page table.
    fn sync_reference_bits(&mut self) {
        for frame in self.clock.frames() {
            let Some(page) = frame.page() else { continue };
            if let Some(entry) = self.page_table.get_mut(page) {
                entry
                    .flags
                    .set(PteFlags::REFERENCED, frame.referenced());
            }
        }
    }

    /// Ends `pid`, dropping its page table and releasing its frames.
    ///
    /// Returns the number of frames freed.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::UnknownProcess`] if there is no such process.
    pub fn terminate(&mut self, pid: Pid) -> Result<usize, VmError> {
        self.events.clear();
        self.processes
            .remove(&pid)
            .context(vm_error::UnknownProcessSnafu { pid })?;
        self.page_table.retain(|page, _| page.pid != pid);
        let freed_frames = self.clock.invalidate(|page| page.pid == pid).len();
        self.events
            .push(VmEvent::ProcessTerminated { pid, freed_frames });
        Ok(freed_frames)
    }

    /// Compares the pages wanted by live processes with the frame pool.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn thrashing(&self) -> ThrashingStatus {
        let demand = self.processes.values().map(|p| p.page_count).sum();
        let capacity = self.config.frame_count;
        let threshold = capacity as f64 * self.config.thrashing_ratio;
        ThrashingStatus {
            demand,
            capacity,
            threshold,
            thrashing: demand as f64 > threshold,
        }
    }
}

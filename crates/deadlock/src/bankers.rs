//! Banker's algorithm for deadlock avoidance.
//!
//! The system tracks, per process and resource type, the maximum claim and
//! the current allocation. A state is *safe* if the processes can be ordered
//! so that each one's remaining need fits in what is free once all earlier
//! processes have finished and returned their allocation. Requests are only
//! granted if the state they lead to is safe.
//!
//! ```
//! use deadlock::bankers::Bankers;
//!
//! let bankers = Bankers::new(
//!     vec![3, 3, 2],
//!     vec![vec![7, 5, 3], vec![3, 2, 2], vec![9, 0, 2], vec![2, 2, 2], vec![4, 3, 3]],
//!     vec![vec![0, 1, 0], vec![2, 0, 0], vec![3, 0, 2], vec![2, 1, 1], vec![0, 0, 2]],
//! )
//! .unwrap();
//! assert_eq!(bankers.safety(), Some(vec![1, 3, 4, 0, 2]));
//! ```

use alloc::vec::Vec;
use core::fmt;

use snafu::{Snafu, ensure};
use snafu_utils::{Located, Location};

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum BankersError {
    #[snafu(display("{matrix} has {actual} processes, expected {expected}"))]
    ProcessCountMismatch {
        matrix: &'static str,
        expected: usize,
        actual: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("{what} has {actual} resource types, expected {expected}"))]
    ResourceCountMismatch {
        what: &'static str,
        process: Option<usize>,
        expected: usize,
        actual: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "P{process} holds {allocated} of resource {resource} but claims at most {max}"
    ))]
    AllocationExceedsMax {
        process: usize,
        resource: usize,
        allocated: u32,
        max: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "resource {resource} has more than {} instances in total",
        u32::MAX
    ))]
    TooManyInstances {
        resource: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no process P{process}"))]
    UnknownProcess {
        process: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "P{process} requested {requested} of resource {resource}, exceeding its remaining need {need}"
    ))]
    ExceedsNeed {
        process: usize,
        resource: usize,
        requested: u32,
        need: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "P{process} requested {requested} of resource {resource}, only {available} available"
    ))]
    InsufficientResources {
        process: usize,
        resource: usize,
        requested: u32,
        available: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("granting the request of P{process} would leave the system unsafe"))]
    Unsafe {
        process: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for BankersError {
    fn location(&self) -> Location {
        match self {
            Self::ProcessCountMismatch { location, .. }
            | Self::ResourceCountMismatch { location, .. }
            | Self::AllocationExceedsMax { location, .. }
            | Self::TooManyInstances { location, .. }
            | Self::UnknownProcess { location, .. }
            | Self::ExceedsNeed { location, .. }
            | Self::InsufficientResources { location, .. }
            | Self::Unsafe { location, .. } => *location,
        }
    }
}

/// One process finishing during a safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyStep {
    pub process: usize,
    /// Free resources before the process finished.
    pub work: Vec<u32>,
    /// Free resources after it returned its allocation.
    pub released: Vec<u32>,
}

impl fmt::Display for SafetyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            process,
            work,
            released,
        } = self;
        write!(
            f,
            "P{process} can finish with work {work:?}, work becomes {released:?}"
        )
    }
}

/// Outcome of a safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyCheck {
    /// The safe sequence, or `None` if some process can never finish.
    pub sequence: Option<Vec<usize>>,
    pub steps: Vec<SafetyStep>,
}

impl SafetyCheck {
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.sequence.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bankers {
    available: Vec<u32>,
    max: Vec<Vec<u32>>,
    allocated: Vec<Vec<u32>>,
    need: Vec<Vec<u32>>,
}

fn fits(need: &[u32], work: &[u32]) -> bool {
    need.iter().zip(work).all(|(n, w)| n <= w)
}

impl Bankers {
    /// Builds the system state. Rows of `max` and `allocated` are processes,
    /// columns are resource types.
    ///
    /// # Errors
    ///
    /// Fails if the dimensions disagree, a process holds more than it
    /// claims, or the free and allocated instances of a resource add up to
    /// more than `u32::MAX`.
    pub fn new(
        available: Vec<u32>,
        max: Vec<Vec<u32>>,
        allocated: Vec<Vec<u32>>,
    ) -> Result<Self, BankersError> {
        let resources = available.len();
        ensure!(
            allocated.len() == max.len(),
            bankers_error::ProcessCountMismatchSnafu {
                matrix: "allocation",
                expected: max.len(),
                actual: allocated.len(),
            }
        );

        let mut need = Vec::with_capacity(max.len());
        for (process, (max_row, alloc_row)) in max.iter().zip(&allocated).enumerate() {
            for (what, row) in [("maximum", max_row), ("allocation", alloc_row)] {
                ensure!(
                    row.len() == resources,
                    bankers_error::ResourceCountMismatchSnafu {
                        what,
                        process: Some(process),
                        expected: resources,
                        actual: row.len(),
                    }
                );
            }
            let mut need_row = Vec::with_capacity(resources);
            for (resource, (&claim, &held)) in max_row.iter().zip(alloc_row).enumerate() {
                let Some(n) = claim.checked_sub(held) else {
                    return bankers_error::AllocationExceedsMaxSnafu {
                        process,
                        resource,
                        allocated: held,
                        max: claim,
                    }
                    .fail();
                };
                need_row.push(n);
            }
            need.push(need_row);
        }

        for (resource, &free) in available.iter().enumerate() {
            let total = allocated
                .iter()
                .try_fold(free, |sum, row| sum.checked_add(row[resource]));
            ensure!(
                total.is_some(),
                bankers_error::TooManyInstancesSnafu { resource }
            );
        }

        Ok(Self {
            available,
            max,
            allocated,
            need,
        })
    }

    #[must_use]
    pub fn process_count(&self) -> usize {
        self.max.len()
    }

    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.available.len()
    }

    #[must_use]
    pub fn available(&self) -> &[u32] {
        &self.available
    }

    #[must_use]
    pub fn max(&self) -> &[Vec<u32>] {
        &self.max
    }

    #[must_use]
    pub fn allocated(&self) -> &[Vec<u32>] {
        &self.allocated
    }

    #[must_use]
    pub fn need(&self) -> &[Vec<u32>] {
        &self.need
    }

    /// Runs the safety algorithm and records every process it lets finish.
    ///
    /// Processes are scanned in index order, repeatedly, until a full pass
    /// finishes nobody.
    #[must_use]
    pub fn check(&self) -> SafetyCheck {
        let mut work = self.available.clone();
        let mut finished = alloc::vec![false; self.process_count()];
        let mut sequence = Vec::with_capacity(self.process_count());
        let mut steps = Vec::new();

        let mut progress = true;
        while progress {
            progress = false;
            for process in 0..self.process_count() {
                if finished[process] || !fits(&self.need[process], &work) {
                    continue;
                }
                let before = work.clone();
                // Bounded by the per-resource totals checked in `new`.
                for (w, a) in work.iter_mut().zip(&self.allocated[process]) {
                    *w += a;
                }
                finished[process] = true;
                sequence.push(process);
                steps.push(SafetyStep {
                    process,
                    work: before,
                    released: work.clone(),
                });
                progress = true;
            }
        }

        let sequence = finished.iter().all(|&f| f).then_some(sequence);
        SafetyCheck { sequence, steps }
    }

    /// The safe sequence of the current state, if there is one.
    #[must_use]
    pub fn safety(&self) -> Option<Vec<usize>> {
        self.check().sequence
    }

    /// Grants `request` to `process` if it stays within the process's need,
    /// fits in the free resources, and leaves the system safe.
    ///
    /// On success the allocation is committed and the new safe sequence is
    /// returned. On error nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`BankersError::ExceedsNeed`],
    /// [`BankersError::InsufficientResources`] or [`BankersError::Unsafe`]
    /// when the request cannot be granted, or a lookup error for a bad
    /// process index or request length.
    pub fn request(&mut self, process: usize, request: &[u32]) -> Result<Vec<usize>, BankersError> {
        ensure!(
            process < self.process_count(),
            bankers_error::UnknownProcessSnafu { process }
        );
        ensure!(
            request.len() == self.resource_count(),
            bankers_error::ResourceCountMismatchSnafu {
                what: "request",
                process: Some(process),
                expected: self.resource_count(),
                actual: request.len(),
            }
        );
        for (resource, (&requested, &need)) in request.iter().zip(&self.need[process]).enumerate()
        {
            ensure!(
                requested <= need,
                bankers_error::ExceedsNeedSnafu {
                    process,
                    resource,
                    requested,
                    need,
                }
            );
        }
        for (resource, (&requested, &available)) in request.iter().zip(&self.available).enumerate()
        {
            ensure!(
                requested <= available,
                bankers_error::InsufficientResourcesSnafu {
                    process,
                    resource,
                    requested,
                    available,
                }
            );
        }

        let mut trial = self.clone();
        for (resource, &requested) in request.iter().enumerate() {
            trial.available[resource] -= requested;
            trial.allocated[process][resource] += requested;
            trial.need[process][resource] -= requested;
        }
        let Some(sequence) = trial.safety() else {
            return bankers_error::UnsafeSnafu { process }.fail();
        };
        *self = trial;
        Ok(sequence)
    }
}

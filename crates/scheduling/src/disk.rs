//! Disk-head scheduling.
//!
//! Given a queue of cylinder requests and the head's starting cylinder, each
//! algorithm produces the order the head visits cylinders in and the total
//! distance travelled.
//!
//! ```
//! use scheduling::disk::{Algorithm, DiskConfig, DiskScheduler};
//!
//! let disk = DiskScheduler::new(DiskConfig::default()).unwrap();
//! let requests = [98, 183, 37, 122, 14, 124, 65, 67];
//! let schedule = disk.schedule(Algorithm::Sstf, &requests, 53).unwrap();
//! assert_eq!(schedule.path, [53, 65, 67, 37, 14, 98, 122, 124, 183]);
//! assert_eq!(schedule.total_seek, 236);
//! ```

use alloc::{string::String, vec::Vec};
use core::{fmt, str::FromStr};

use snafu::{Snafu, ensure};
use snafu_utils::{Located, Location};

/// Head position used when none is given.
pub const DEFAULT_HEAD: u32 = 53;

/// Request queue used when none is given.
pub const DEFAULT_REQUESTS: [u32; 8] = [98, 183, 37, 122, 14, 124, 65, 67];

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Algorithm {
    #[display("FCFS")]
    Fcfs,
    #[display("SSTF")]
    Sstf,
    #[display("SCAN")]
    Scan,
    #[display("C-SCAN")]
    CScan,
    #[display("LOOK")]
    Look,
    #[display("C-LOOK")]
    CLook,
}

impl Algorithm {
    pub const ALL: [Self; 6] = [
        Self::Fcfs,
        Self::Sstf,
        Self::Scan,
        Self::CScan,
        Self::Look,
        Self::CLook,
    ];

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Fcfs => "First-Come, First-Served",
            Self::Sstf => "Shortest Seek Time First",
            Self::Scan => "SCAN (Elevator Algorithm)",
            Self::CScan => "Circular SCAN",
            Self::Look => "LOOK Algorithm",
            Self::CLook => "Circular LOOK",
        }
    }
}

impl FromStr for Algorithm {
    type Err = DiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let algorithm = match normalized.as_str() {
            "fcfs" => Self::Fcfs,
            "sstf" => Self::Sstf,
            "scan" => Self::Scan,
            "cscan" => Self::CScan,
            "look" => Self::Look,
            "clook" => Self::CLook,
            _ => {
                return disk_error::UnknownAlgorithmSnafu { name: s }.fail();
            }
        };
        Ok(algorithm)
    }
}

/// Direction of the first sweep for the SCAN family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::IsVariant)]
pub enum Direction {
    /// Towards higher cylinder numbers.
    #[default]
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = DiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" | "right" | "high" => Ok(Self::Up),
            "down" | "left" | "low" => Ok(Self::Down),
            _ => disk_error::UnknownDirectionSnafu { name: s }.fail(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskConfig {
    /// Cylinders are numbered `0..cylinders`.
    pub cylinders: u32,
    pub direction: Direction,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            cylinders: 200,
            direction: Direction::Up,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum DiskError {
    #[snafu(display("disk must have at least one cylinder"))]
    NoCylinders {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("head position {head} is beyond the last cylinder {last}"))]
    HeadOutOfRange {
        head: u32,
        last: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("request for cylinder {request} is beyond the last cylinder {last}"))]
    RequestOutOfRange {
        request: u32,
        last: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("unknown disk scheduling algorithm {name:?}"))]
    UnknownAlgorithm {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("unknown head direction {name:?}"))]
    UnknownDirection {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for DiskError {
    fn location(&self) -> Location {
        match self {
            Self::NoCylinders { location }
            | Self::HeadOutOfRange { location, .. }
            | Self::RequestOutOfRange { location, .. }
            | Self::UnknownAlgorithm { location, .. }
            | Self::UnknownDirection { location, .. } => *location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum Movement {
    Start,
    /// The head stayed put to serve another request on the same cylinder.
    Processing,
    #[display("Moving right")]
    MovingRight,
    #[display("Moving left")]
    MovingLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub position: u32,
    pub movement: Movement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub algorithm: Algorithm,
    /// Cylinders visited in order, starting with the head position.
    pub path: Vec<u32>,
    pub total_seek: u64,
}

impl Schedule {
    fn from_path(algorithm: Algorithm, path: Vec<u32>) -> Self {
        let total_seek = path
            .windows(2)
            .map(|w| u64::from(w[0].abs_diff(w[1])))
            .sum();
        Self {
            algorithm,
            path,
            total_seek,
        }
    }

    /// The path with each position labelled by how the head got there.
    pub fn steps(&self) -> impl Iterator<Item = Step> + '_ {
        let previous = core::iter::once(None).chain(self.path.iter().copied().map(Some));
        self.path
            .iter()
            .zip(previous)
            .map(|(&position, previous)| {
                let movement = match previous {
                    None => Movement::Start,
                    Some(prev) if prev == position => Movement::Processing,
                    Some(prev) if prev < position => Movement::MovingRight,
                    Some(_) => Movement::MovingLeft,
                };
                Step { position, movement }
            })
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.algorithm)?;
        for (i, position) in self.path.iter().enumerate() {
            let sep = if i == 0 { " " } else { " -> " };
            write!(f, "{sep}{position}")?;
        }
        write!(f, " (total seek {})", self.total_seek)
    }
}

#[derive(Debug, Clone)]
pub struct DiskScheduler {
    config: DiskConfig,
}

impl DiskScheduler {
    /// # Errors
    ///
    /// Returns [`DiskError::NoCylinders`] for an empty disk.
    pub fn new(config: DiskConfig) -> Result<Self, DiskError> {
        ensure!(config.cylinders > 0, disk_error::NoCylindersSnafu);
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    fn last_cylinder(&self) -> u32 {
        self.config.cylinders - 1
    }

    /// Orders `requests` with `algorithm`, starting from `head`.
    ///
    /// # Errors
    ///
    /// Fails if the head or any request lies beyond the last cylinder.
    pub fn schedule(
        &self,
        algorithm: Algorithm,
        requests: &[u32],
        head: u32,
    ) -> Result<Schedule, DiskError> {
        let last = self.last_cylinder();
        ensure!(head <= last, disk_error::HeadOutOfRangeSnafu { head, last });
        if let Some(&request) = requests.iter().find(|&&r| r > last) {
            return disk_error::RequestOutOfRangeSnafu { request, last }.fail();
        }

        let mut path = Vec::with_capacity(requests.len() + 3);
        path.push(head);
        match algorithm {
            Algorithm::Fcfs => path.extend_from_slice(requests),
            Algorithm::Sstf => sstf(&mut path, requests, head),
            Algorithm::Scan | Algorithm::CScan | Algorithm::Look | Algorithm::CLook => {
                self.sweep(&mut path, algorithm, requests, head);
            }
        }
        Ok(Schedule::from_path(algorithm, path))
    }

    fn sweep(&self, path: &mut Vec<u32>, algorithm: Algorithm, requests: &[u32], head: u32) {
        let up = self.config.direction.is_up();
        let mut sorted = requests.to_vec();
        sorted.sort_unstable();

        // Requests on the head's cylinder are served by the first sweep.
        let (mut ahead, mut behind): (Vec<u32>, Vec<u32>) = if up {
            sorted.iter().partition(|&&r| r >= head)
        } else {
            sorted.iter().partition(|&&r| r <= head)
        };
        if !up {
            ahead.reverse();
        }
        let circular = matches!(algorithm, Algorithm::CScan | Algorithm::CLook);
        if !circular == up {
            behind.reverse();
        }

        path.extend_from_slice(&ahead);
        if behind.is_empty() {
            return;
        }

        let (near_edge, far_edge) = if up {
            (self.last_cylinder(), 0)
        } else {
            (0, self.last_cylinder())
        };
        match algorithm {
            Algorithm::Scan => push_distinct(path, near_edge),
            Algorithm::CScan => {
                push_distinct(path, near_edge);
                push_distinct(path, far_edge);
            }
            _ => {}
        }
        for request in behind {
            path.push(request);
        }
    }
}

fn push_distinct(path: &mut Vec<u32>, position: u32) {
    if path.last() != Some(&position) {
        path.push(position);
    }
}

fn sstf(path: &mut Vec<u32>, requests: &[u32], head: u32) {
    let mut pending = requests.to_vec();
    let mut current = head;
    loop {
        let Some(index) = pending
            .iter()
            .enumerate()
            .min_by_key(|&(_, &r)| r.abs_diff(current))
            .map(|(index, _)| index)
        else {
            break;
        };
        current = pending.remove(index);
        path.push(current);
    }
}

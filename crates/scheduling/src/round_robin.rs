//! Round-robin CPU scheduling.
//!
//! Ready processes wait in a FIFO queue. The head of the queue runs for at
//! most one quantum; if it still has work left it goes to the back of the
//! queue, behind every process that arrived while it was running.

use alloc::{collections::vec_deque::VecDeque, vec::Vec};
use core::fmt;

use snafu::{Snafu, ensure};
use snafu_utils::{Located, Location};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display,
)]
#[display("P{_0}")]
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRobinConfig {
    pub quantum: u64,
}

impl Default for RoundRobinConfig {
    fn default() -> Self {
        Self { quantum: 1 }
    }
}

/// A process as submitted to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSpec {
    pub pid: Pid,
    pub arrival: u64,
    pub burst: u64,
}

#[derive(Debug, Snafu)]
#[snafu(module)]
pub enum RoundRobinError {
    #[snafu(display("time quantum must be positive"))]
    ZeroQuantum {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("process {pid} has no CPU burst"))]
    ZeroBurst {
        pid: Pid,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("process {pid} was submitted twice"))]
    DuplicatePid {
        pid: Pid,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for RoundRobinError {
    fn location(&self) -> Location {
        match self {
            Self::ZeroQuantum { location }
            | Self::ZeroBurst { location, .. }
            | Self::DuplicatePid { location, .. } => *location,
        }
    }
}

/// One bar of the Gantt chart. `pid` is `None` while the CPU is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub pid: Option<Pid>,
    pub start: u64,
    pub end: u64,
}

impl Slice {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pid.is_none()
    }

    #[must_use]
    pub fn duration(&self) -> u64 {
        self.end - self.start
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { pid, start, end } = self;
        match pid {
            Some(pid) => write!(f, "[{start}-{end}] {pid}"),
            None => write!(f, "[{start}-{end}] idle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessState {
    spec: ProcessSpec,
    remaining: u64,
    completion: Option<u64>,
}

impl ProcessState {
    #[must_use]
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[must_use]
    pub fn completion(&self) -> Option<u64> {
        self.completion
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessReport {
    pub pid: Pid,
    pub arrival: u64,
    pub burst: u64,
    pub completion: u64,
    /// `completion - arrival`
    pub turnaround: u64,
    /// `turnaround - burst`
    pub waiting: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundRobinReport {
    /// Completed processes in submission order.
    pub processes: Vec<ProcessReport>,
    pub average_turnaround: f64,
    pub average_waiting: f64,
}

#[derive(Debug, Clone)]
pub struct RoundRobin {
    config: RoundRobinConfig,
    processes: Vec<ProcessState>,
    /// Indices of processes that have not arrived yet, by arrival time.
    pending: VecDeque<usize>,
    ready: VecDeque<usize>,
    time: u64,
    gantt: Vec<Slice>,
}

impl RoundRobin {
    /// # Errors
    ///
    /// Fails on a zero quantum, a zero burst or a repeated pid.
    pub fn new(
        config: RoundRobinConfig,
        processes: impl IntoIterator<Item = ProcessSpec>,
    ) -> Result<Self, RoundRobinError> {
        ensure!(config.quantum > 0, round_robin_error::ZeroQuantumSnafu);

        let mut states: Vec<ProcessState> = Vec::new();
        for spec in processes {
            let pid = spec.pid;
            ensure!(spec.burst > 0, round_robin_error::ZeroBurstSnafu { pid });
            ensure!(
                states.iter().all(|s| s.spec.pid != pid),
                round_robin_error::DuplicatePidSnafu { pid }
            );
            states.push(ProcessState {
                spec,
                remaining: spec.burst,
                completion: None,
            });
        }

        let mut pending: Vec<usize> = (0..states.len()).collect();
        pending.sort_by_key(|&i| states[i].spec.arrival);

        Ok(Self {
            config,
            processes: states,
            pending: pending.into(),
            ready: VecDeque::new(),
            time: 0,
            gantt: Vec::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &RoundRobinConfig {
        &self.config
    }

    #[must_use]
    pub fn time(&self) -> u64 {
        self.time
    }

    #[must_use]
    pub fn processes(&self) -> &[ProcessState] {
        &self.processes
    }

    /// Processes waiting for the CPU, head first.
    pub fn ready_queue(&self) -> impl Iterator<Item = Pid> + '_ {
        self.ready.iter().map(|&i| self.processes[i].spec.pid)
    }

    #[must_use]
    pub fn gantt(&self) -> &[Slice] {
        &self.gantt
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.processes.iter().all(|p| p.completion.is_some())
    }

    /// Moves every process that has arrived by now into the ready queue.
    fn admit(&mut self) {
        while let Some(&index) = self.pending.front() {
            if self.processes[index].spec.arrival > self.time {
                break;
            }
            self.pending.pop_front();
            self.ready.push_back(index);
        }
    }

    /// Runs the next time slice, or one unit of idle time if nothing is
    /// ready. Returns `None` once every process has completed.
    pub fn step(&mut self) -> Option<Slice> {
        if self.is_finished() {
            return None;
        }
        self.admit();

        let start = self.time;
        let Some(index) = self.ready.pop_front() else {
            self.time += 1;
            let slice = Slice {
                pid: None,
                start,
                end: self.time,
            };
            self.gantt.push(slice);
            return Some(slice);
        };

        let process = &mut self.processes[index];
        let run = process.remaining.min(self.config.quantum);
        process.remaining -= run;
        let pid = process.spec.pid;
        let done = process.remaining == 0;
        self.time += run;
        if done {
            process.completion = Some(self.time);
        }

        self.admit();
        if !done {
            self.ready.push_back(index);
        }

        let slice = Slice {
            pid: Some(pid),
            start,
            end: self.time,
        };
        self.gantt.push(slice);
        Some(slice)
    }

    /// Steps until every process has completed and returns the slices run.
    pub fn run(&mut self) -> &[Slice] {
        let from = self.gantt.len();
        while self.step().is_some() {}
        &self.gantt[from..]
    }

    /// Timing statistics of the processes completed so far.
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn report(&self) -> RoundRobinReport {
        let processes: Vec<_> = self
            .processes
            .iter()
            .filter_map(|p| {
                let completion = p.completion?;
                let ProcessSpec {
                    pid,
                    arrival,
                    burst,
                } = p.spec;
                let turnaround = completion - arrival;
                Some(ProcessReport {
                    pid,
                    arrival,
                    burst,
                    completion,
                    turnaround,
                    waiting: turnaround - burst,
                })
            })
            .collect();

        let average = |f: fn(&ProcessReport) -> u64| {
            if processes.is_empty() {
                return 0.0;
            }
            processes.iter().map(f).sum::<u64>() as f64 / processes.len() as f64
        };
        let average_turnaround = average(|p| p.turnaround);
        let average_waiting = average(|p| p.waiting);

        RoundRobinReport {
            processes,
            average_turnaround,
            average_waiting,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::{string::ToString, vec, vec::Vec};

    use super::*;

    fn spec(pid: u32, arrival: u64, burst: u64) -> ProcessSpec {
        ProcessSpec {
            pid: Pid::from_raw(pid),
            arrival,
            burst,
        }
    }

    fn slice(pid: Option<u32>, start: u64, end: u64) -> Slice {
        Slice {
            pid: pid.map(Pid::from_raw),
            start,
            end,
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let err = RoundRobin::new(RoundRobinConfig { quantum: 0 }, []).unwrap_err();
        assert!(matches!(err, RoundRobinError::ZeroQuantum { .. }));

        let err = RoundRobin::new(RoundRobinConfig::default(), [spec(1, 0, 0)]).unwrap_err();
        assert!(matches!(err, RoundRobinError::ZeroBurst { .. }));

        let err = RoundRobin::new(
            RoundRobinConfig::default(),
            [spec(1, 0, 2), spec(1, 3, 2)],
        )
        .unwrap_err();
        assert!(matches!(err, RoundRobinError::DuplicatePid { .. }));
    }

    #[test]
    fn test_empty_is_finished() {
        let mut rr = RoundRobin::new(RoundRobinConfig::default(), []).unwrap();
        assert!(rr.is_finished());
        assert_eq!(rr.step(), None);
        assert!(rr.report().processes.is_empty());
    }

    #[test]
    fn test_quantum_two() {
        let mut rr = RoundRobin::new(
            RoundRobinConfig { quantum: 2 },
            [
                spec(1, 0, 5),
                spec(2, 1, 3),
                spec(3, 2, 1),
                spec(4, 3, 2),
                spec(5, 4, 3),
            ],
        )
        .unwrap();
        let gantt = rr.run().to_vec();
        assert_eq!(
            gantt,
            vec![
                slice(Some(1), 0, 2),
                slice(Some(2), 2, 4),
                slice(Some(3), 4, 5),
                slice(Some(1), 5, 7),
                slice(Some(4), 7, 9),
                slice(Some(5), 9, 11),
                slice(Some(2), 11, 12),
                slice(Some(1), 12, 13),
                slice(Some(5), 13, 14),
            ]
        );

        let report = rr.report();
        let completion: Vec<_> = report.processes.iter().map(|p| p.completion).collect();
        assert_eq!(completion, vec![13, 12, 5, 9, 14]);
        let waiting: Vec<_> = report.processes.iter().map(|p| p.waiting).collect();
        assert_eq!(waiting, vec![8, 8, 2, 4, 7]);
        assert!((report.average_turnaround - 8.6).abs() < 1e-9);
        assert!((report.average_waiting - 5.8).abs() < 1e-9);
    }

    #[test]
    fn test_arrival_goes_before_preempted() {
        let mut rr = RoundRobin::new(
            RoundRobinConfig { quantum: 3 },
            [spec(1, 0, 4), spec(2, 2, 1)],
        )
        .unwrap();
        rr.step();
        let queue: Vec<_> = rr.ready_queue().collect();
        assert_eq!(queue, vec![Pid::from_raw(2), Pid::from_raw(1)]);
    }

    #[test]
    fn test_idle_until_arrival() {
        let mut rr =
            RoundRobin::new(RoundRobinConfig { quantum: 2 }, [spec(7, 2, 1)]).unwrap();
        assert_eq!(rr.step(), Some(slice(None, 0, 1)));
        assert_eq!(rr.step(), Some(slice(None, 1, 2)));
        assert_eq!(rr.step(), Some(slice(Some(7), 2, 3)));
        assert_eq!(rr.step(), None);

        let report = rr.report();
        assert_eq!(report.processes[0].turnaround, 1);
        assert_eq!(report.processes[0].waiting, 0);
        assert_eq!(rr.gantt()[0].to_string(), "[0-1] idle");
        assert_eq!(rr.gantt()[2].to_string(), "[2-3] P7");
    }

    #[test]
    fn test_partial_report() {
        let mut rr = RoundRobin::new(
            RoundRobinConfig { quantum: 1 },
            [spec(1, 0, 1), spec(2, 0, 3)],
        )
        .unwrap();
        rr.step();
        rr.step();
        let report = rr.report();
        assert_eq!(report.processes.len(), 1);
        assert_eq!(report.processes[0].pid, Pid::from_raw(1));
        assert!(!rr.is_finished());
        assert_eq!(rr.processes()[1].remaining(), 2);
    }
}

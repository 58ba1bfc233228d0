use std::{fmt, str::FromStr};

use ansi_term::{Color, WithBg, WithFg};
use argh::FromArgs;
use scheduling::round_robin::{Pid, ProcessSpec, RoundRobin, RoundRobinConfig, RoundRobinReport};
use snafu::ResultExt as _;
use snafu_utils::GenericError;

use crate::op;

/// Simulate round-robin CPU scheduling.
#[derive(Debug, FromArgs)]
#[argh(
    subcommand,
    name = "rr",
    example = "osviz rr --quantum 2 0:5 1:3 2:1 3:2 4:3"
)]
pub struct Args {
    /// time quantum
    #[argh(option, default = "RoundRobinConfig::default().quantum")]
    quantum: u64,
    /// processes as `<arrival>:<burst>`, named P1, P2, ... in order
    #[argh(positional)]
    processes: Vec<ProcessArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessArg {
    arrival: u64,
    burst: u64,
}

impl FromStr for ProcessArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (arrival, burst) = op::split(s);
        let burst = burst.ok_or_else(|| format!("process `{s}` is not of the form <arrival>:<burst>"))?;
        Ok(Self {
            arrival: op::number("arrival time", arrival)?,
            burst: op::number("burst time", burst)?,
        })
    }
}

fn specs(processes: &[ProcessArg]) -> impl Iterator<Item = ProcessSpec> + '_ {
    (1..).zip(processes).map(|(pid, p)| ProcessSpec {
        pid: Pid::from_raw(pid),
        arrival: p.arrival,
        burst: p.burst,
    })
}

pub fn run(args: &Args) -> Result<(), GenericError> {
    let config = RoundRobinConfig {
        quantum: args.quantum,
    };
    debug!("round robin: {config:?}");
    let mut rr = RoundRobin::new(config, specs(&args.processes))
        .whatever_context("invalid round-robin workload")?;

    while let Some(slice) = rr.step() {
        let queue: Vec<String> = rr.ready_queue().map(|pid| pid.to_string()).collect();
        println!("{slice}  ready: [{}]", queue.join(" "));
    }
    info!("all {} processes completed at t={}", rr.processes().len(), rr.time());

    println!();
    println!("gantt: {}", Gantt(&rr));
    print!("{}", Report(&rr.report()));
    Ok(())
}

const PALETTE: [Color; 6] = [
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Red,
];

/// One cell per time unit.
struct Gantt<'a>(&'a RoundRobin);

impl fmt::Display for Gantt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for slice in self.0.gantt() {
            let Some(pid) = slice.pid else {
                write!(f, "{}", ".".repeat(usize::try_from(slice.duration()).unwrap_or(0)))?;
                continue;
            };
            let label = pid.as_raw().to_string();
            let cells: String = label
                .chars()
                .cycle()
                .take(usize::try_from(slice.duration()).unwrap_or(0))
                .collect();
            let color = PALETTE[usize::try_from(pid.as_raw()).unwrap_or(0) % PALETTE.len()];
            write!(f, "{}", WithBg::new(color, cells))?;
        }
        Ok(())
    }
}

struct Report<'a>(&'a RoundRobinReport);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "pid  arrival  burst  completion  turnaround  waiting")?;
        for p in &report.processes {
            let pid = p.pid.to_string();
            writeln!(
                f,
                "{pid:<4} {:>7}  {:>5}  {:>10}  {:>10}  {:>7}",
                p.arrival, p.burst, p.completion, p.turnaround, p.waiting
            )?;
        }
        writeln!(
            f,
            "{}",
            WithFg::new(
                Color::Green,
                format_args!(
                    "average turnaround {:.2}, average waiting {:.2}",
                    report.average_turnaround, report.average_waiting
                )
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process() {
        assert_eq!(
            "0:5".parse::<ProcessArg>(),
            Ok(ProcessArg {
                arrival: 0,
                burst: 5
            })
        );
        "5".parse::<ProcessArg>().unwrap_err();
        "a:5".parse::<ProcessArg>().unwrap_err();
    }

    #[test]
    fn test_pids_follow_argument_order() {
        let args = [
            ProcessArg {
                arrival: 3,
                burst: 1,
            },
            ProcessArg {
                arrival: 0,
                burst: 2,
            },
        ];
        let pids: Vec<_> = specs(&args).map(|s| s.pid.as_raw()).collect();
        assert_eq!(pids, vec![1, 2]);
    }

    #[test]
    fn test_gantt_and_report() {
        ansi_term::set_enabled(false);
        let args = [
            ProcessArg {
                arrival: 1,
                burst: 2,
            },
            ProcessArg {
                arrival: 1,
                burst: 1,
            },
        ];
        let mut rr = RoundRobin::new(RoundRobinConfig { quantum: 1 }, specs(&args)).unwrap();
        rr.run();
        assert_eq!(Gantt(&rr).to_string(), ".121");

        let text = Report(&rr.report()).to_string();
        assert!(text.contains("P1         1      2           4           3        1\n"));
        assert!(text.contains("average turnaround 2.50, average waiting 1.00"));
    }
}

use std::fmt;

use ansi_term::{Color, WithFg};
use argh::FromArgs;
use scheduling::disk::{
    Algorithm, DEFAULT_HEAD, DEFAULT_REQUESTS, Direction, DiskConfig, DiskScheduler, Schedule,
};
use snafu::ResultExt as _;
use snafu_utils::GenericError;

/// Simulate disk-head scheduling.
#[derive(Debug, FromArgs)]
#[argh(
    subcommand,
    name = "disk",
    example = "osviz disk --algorithm c-look --head 53 98 183 37 122 14 124 65 67"
)]
pub struct Args {
    /// fcfs, sstf, scan, c-scan, look or c-look (default: compare all)
    #[argh(option)]
    algorithm: Option<Algorithm>,
    /// cylinder the head starts on
    #[argh(option, default = "DEFAULT_HEAD")]
    head: u32,
    /// number of cylinders on the disk
    #[argh(option, default = "DiskConfig::default().cylinders")]
    cylinders: u32,
    /// direction of the first sweep, `up` or `down`
    #[argh(option, default = "Direction::default()")]
    direction: Direction,
    /// cylinder requests in arrival order (default: 98 183 37 122 14 124 65 67)
    #[argh(positional)]
    requests: Vec<u32>,
}

pub fn run(args: &Args) -> Result<(), GenericError> {
    let config = DiskConfig {
        cylinders: args.cylinders,
        direction: args.direction,
    };
    debug!("disk: {config:?}");
    let disk = DiskScheduler::new(config).whatever_context("invalid disk geometry")?;
    let requests = if args.requests.is_empty() {
        DEFAULT_REQUESTS.to_vec()
    } else {
        args.requests.clone()
    };
    debug!("head {}, requests {requests:?}", args.head);

    let algorithms = match args.algorithm {
        Some(algorithm) => vec![algorithm],
        None => Algorithm::ALL.to_vec(),
    };
    let mut schedules = Vec::with_capacity(algorithms.len());
    for algorithm in algorithms {
        let schedule = disk
            .schedule(algorithm, &requests, args.head)
            .with_whatever_context(|_| format!("failed to schedule with {algorithm}"))?;
        print!("{}", StepTable(&schedule));
        println!();
        schedules.push(schedule);
    }

    if schedules.len() > 1 {
        schedules.sort_by_key(|s| s.total_seek);
        println!("ranking by total seek:");
        for schedule in &schedules {
            println!("  {:<7} {}", schedule.algorithm.to_string(), schedule.total_seek);
        }
    }
    Ok(())
}

struct StepTable<'a>(&'a Schedule);

impl fmt::Display for StepTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schedule = self.0;
        writeln!(
            f,
            "{}",
            WithFg::new(
                Color::Cyan,
                format_args!(
                    "{} ({})",
                    schedule.algorithm,
                    schedule.algorithm.description()
                )
            )
        )?;
        writeln!(f, "step  position  action")?;
        for (index, step) in schedule.steps().enumerate() {
            writeln!(
                f,
                "{:>4}  {:>8}  {}",
                index + 1,
                step.position,
                step.movement
            )?;
        }
        writeln!(
            f,
            "total seek {}",
            WithFg::new(Color::Green, schedule.total_seek)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_table() {
        ansi_term::set_enabled(false);
        let disk = DiskScheduler::new(DiskConfig::default()).unwrap();
        let schedule = disk.schedule(Algorithm::Look, &[60, 40], 50).unwrap();
        let text = StepTable(&schedule).to_string();
        assert_eq!(
            text,
            "LOOK (LOOK Algorithm)\n\
             step  position  action\n   \
             1        50  Start\n   \
             2        60  Moving right\n   \
             3        40  Moving left\n\
             total seek 30\n"
        );
    }
}

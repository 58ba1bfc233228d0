use std::{fmt, str::FromStr};

use ansi_term::{Color, WithFg};
use argh::FromArgs;
use deadlock::bankers::{Bankers, SafetyCheck};
use snafu::{ResultExt as _, whatever};
use snafu_utils::GenericError;

use crate::op;

/// Check system safety and resource requests with the Banker's algorithm.
#[derive(Debug, FromArgs)]
#[argh(
    subcommand,
    name = "bankers",
    example = "osviz bankers 1:1,0,2 0:0,2,0",
    note = "Without --available, --max and --allocated the classic five \
            process, three resource example is used."
)]
pub struct Args {
    /// free instances of each resource, comma separated
    #[argh(option)]
    available: Option<Vector>,
    /// maximum claim per process, rows separated by `;`
    #[argh(option)]
    max: Option<Matrix>,
    /// current allocation per process, rows separated by `;`
    #[argh(option)]
    allocated: Option<Matrix>,
    /// requests as `<pid>:<r0>,<r1>,...`, applied in order
    #[argh(positional)]
    requests: Vec<Request>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vector(Vec<u32>);

impl FromStr for Vector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        op::list("resource count", s).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix(Vec<Vec<u32>>);

impl FromStr for Matrix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        op::matrix("resource count", s).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    process: usize,
    amounts: Vec<u32>,
}

impl FromStr for Request {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (process, amounts) = op::split(s);
        let process = process.strip_prefix(['P', 'p']).unwrap_or(process);
        Ok(Self {
            process: op::number("process", process)?,
            amounts: op::list("resource count", op::required(process, amounts)?)?,
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{} requests {:?}", self.process, self.amounts)
    }
}

fn classic() -> (Vec<u32>, Vec<Vec<u32>>, Vec<Vec<u32>>) {
    (
        vec![3, 3, 2],
        vec![
            vec![7, 5, 3],
            vec![3, 2, 2],
            vec![9, 0, 2],
            vec![2, 2, 2],
            vec![4, 3, 3],
        ],
        vec![
            vec![0, 1, 0],
            vec![2, 0, 0],
            vec![3, 0, 2],
            vec![2, 1, 1],
            vec![0, 0, 2],
        ],
    )
}

pub fn run(args: &Args) -> Result<(), GenericError> {
    let (available, max, allocated) = match (&args.available, &args.max, &args.allocated) {
        (None, None, None) => classic(),
        (Some(available), Some(max), Some(allocated)) => {
            (available.0.clone(), max.0.clone(), allocated.0.clone())
        }
        _ => whatever!("--available, --max and --allocated must be given together"),
    };
    let mut bankers =
        Bankers::new(available, max, allocated).whatever_context("invalid system state")?;

    print!("{}", State(&bankers));
    println!();
    print!("{}", Safety(&bankers.check()));

    for request in &args.requests {
        println!();
        println!("{}", WithFg::new(Color::Cyan, format_args!("> {request}")));
        match bankers.request(request.process, &request.amounts) {
            Ok(sequence) => {
                println!(
                    "  {} safe sequence {}",
                    WithFg::new(Color::Green, "granted,"),
                    Sequence(&sequence)
                );
                debug!("available now {:?}", bankers.available());
            }
            Err(err) => {
                println!("  {} {err}", WithFg::new(Color::Red, "denied:"));
                warn!("{request} denied");
            }
        }
    }
    Ok(())
}

struct Sequence<'a>(&'a [usize]);

impl fmt::Display for Sequence<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, process) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "P{process}")?;
        }
        Ok(())
    }
}

struct State<'a>(&'a Bankers);

impl fmt::Display for State<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bankers = self.0;
        writeln!(f, "available {:?}", bankers.available())?;
        writeln!(f, "process  allocated  max  need")?;
        for (process, ((allocated, max), need)) in bankers
            .allocated()
            .iter()
            .zip(bankers.max())
            .zip(bankers.need())
            .enumerate()
        {
            writeln!(f, "P{process:<7} {allocated:?}  {max:?}  {need:?}")?;
        }
        Ok(())
    }
}

struct Safety<'a>(&'a SafetyCheck);

impl fmt::Display for Safety<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.0.steps {
            writeln!(f, "  {step}")?;
        }
        match &self.0.sequence {
            Some(sequence) => writeln!(
                f,
                "{} {}",
                WithFg::new(Color::Green, "SAFE:"),
                Sequence(sequence)
            ),
            None => writeln!(
                f,
                "{} no order lets every process finish",
                WithFg::new(Color::Red, "UNSAFE:")
            ),
        }
    }
}

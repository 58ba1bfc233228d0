//! Step-by-step simulators for classic operating-systems algorithms.
//!
//! Each subcommand builds one simulator from its flags, applies the
//! operations given as positional arguments, prints what every operation did
//! and finishes with a snapshot of the final state.

use std::{env, process};

use argh::FromArgs;
use snafu_utils::{GenericError, Report};

#[macro_use]
mod log;

mod bankers;
mod buddy;
mod clock;
mod disk;
mod op;
mod rr;
mod slab;
mod vm;

/// Step-by-step simulators for classic operating-systems algorithms.
#[derive(Debug, FromArgs)]
struct Args {
    /// disable colored output (also disabled by NO_COLOR)
    #[argh(switch)]
    no_color: bool,
    /// trace, debug, info, warn or error (default: $OSVIZ_LOG or info)
    #[argh(option)]
    log_level: Option<log::LogLevel>,
    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Buddy(buddy::Args),
    Slab(slab::Args),
    Clock(clock::Args),
    Vm(vm::Args),
    Rr(rr::Args),
    Disk(disk::Args),
    Bankers(bankers::Args),
}

fn main() {
    let args: Args = argh::from_env();

    if args.no_color || env::var_os("NO_COLOR").is_some() {
        ansi_term::set_enabled(false);
    }
    log::init(args.log_level);

    if let Err(err) = run(&args) {
        let report = Report::new(err);
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), GenericError> {
    match &args.command {
        Command::Buddy(args) => buddy::run(args),
        Command::Slab(args) => slab::run(args),
        Command::Clock(args) => clock::run(args),
        Command::Vm(args) => vm::run(args),
        Command::Rr(args) => rr::run(args),
        Command::Disk(args) => disk::run(args),
        Command::Bankers(args) => bankers::run(args),
    }
}

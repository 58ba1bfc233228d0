use std::{fmt, str::FromStr};

use ansi_term::{Color, WithFg};
use argh::FromArgs;
use paging::vm::{AccessType, Pid, VirtualMemory, VmConfig};
use snafu::ResultExt as _;
use snafu_utils::GenericError;

use crate::op;

/// Simulate demand paging of several processes and detect thrashing.
#[derive(Debug, FromArgs)]
#[argh(
    subcommand,
    name = "vm",
    example = "osviz vm --frames 4 new:3 new:2 r:1:0 w:1:1 r:2:0 kill:1"
)]
pub struct Args {
    /// number of physical frames
    #[argh(option, default = "VmConfig::default().frame_count")]
    frames: usize,
    /// thrashing is reported once demand exceeds frames times this ratio
    #[argh(option, default = "VmConfig::default().thrashing_ratio")]
    ratio: f64,
    /// operations: `new:<pages>`, `r:<pid>:<page>`, `w:<pid>:<page>` or
    /// `kill:<pid>`
    #[argh(positional)]
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    New(usize),
    Access(Pid, usize, AccessType),
    Kill(Pid),
}

fn pid(s: &str) -> Result<Pid, String> {
    let raw = s.strip_prefix(['P', 'p']).unwrap_or(s);
    op::number("pid", raw).map(Pid::from_raw)
}

impl FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = op::split(s);
        let kind = match name {
            "new" | "n" => return Ok(Self::New(op::number("page count", op::required(name, arg)?)?)),
            "kill" | "k" => return Ok(Self::Kill(pid(op::required(name, arg)?)?)),
            "r" | "read" => AccessType::Read,
            "w" | "write" => AccessType::Write,
            _ => return Err(format!("unknown vm operation `{s}`")),
        };
        let arg = op::required(name, arg)?;
        let Some((p, vpn)) = arg.split_once(':') else {
            return Err(format!("`{s}` must be of the form {name}:<pid>:<page>"));
        };
        Ok(Self::Access(pid(p)?, op::number("page", vpn)?, kind))
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New(pages) => write!(f, "new:{pages}"),
            Self::Access(pid, vpn, AccessType::Read) => write!(f, "r:{pid}:{vpn}"),
            Self::Access(pid, vpn, AccessType::Write) => write!(f, "w:{pid}:{vpn}"),
            Self::Kill(pid) => write!(f, "kill:{pid}"),
        }
    }
}

pub fn run(args: &Args) -> Result<(), GenericError> {
    let config = VmConfig {
        frame_count: args.frames,
        thrashing_ratio: args.ratio,
    };
    debug!("virtual memory: {config:?}");
    let mut vm = VirtualMemory::new(config).whatever_context("invalid virtual memory configuration")?;

    let mut thrashing = vm.thrashing().thrashing;
    for op in &args.ops {
        println!("{}", WithFg::new(Color::Cyan, format_args!("> {op}")));
        let result = match *op {
            Op::New(pages) => vm.create_process(pages).map(drop),
            Op::Access(pid, vpn, kind) => vm.access(pid, vpn, kind).map(|access| {
                for step in &access.steps {
                    trace!("clock: {step}");
                }
            }),
            Op::Kill(pid) => vm.terminate(pid).map(drop),
        };
        for event in vm.events() {
            println!("  {event}");
        }
        if let Err(err) = result {
            warn!("{op} rejected: {err}");
        }

        let status = vm.thrashing();
        if status.thrashing != thrashing {
            if status.thrashing {
                warn!("system started thrashing: {status}");
            } else {
                info!("system recovered from thrashing: {status}");
            }
            thrashing = status.thrashing;
        }
    }

    println!();
    print!("{}", Snapshot(&vm));
    Ok(())
}

struct Snapshot<'a>(&'a VirtualMemory);

impl fmt::Display for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vm = self.0;
        for process in vm.processes() {
            writeln!(f, "process {} ({} pages):", process.pid(), process.page_count())?;
            for (page, entry) in vm.page_table(process.pid()) {
                let frame = entry
                    .frame()
                    .map_or_else(|| "-".to_owned(), |frame| frame.to_string());
                let page = page.to_string();
                writeln!(f, "  {page:<6} {} frame {frame}", entry.flags())?;
            }
        }

        write!(f, "frames:")?;
        let clock = vm.clock();
        for (index, frame) in clock.frames().iter().enumerate() {
            let hand = if index == clock.hand() { ">" } else { " " };
            match frame.page() {
                Some(page) => write!(f, " {hand}{page}:{}", frame.reference_bit())?,
                None => write!(f, " {hand}-")?,
            }
        }
        writeln!(f)?;

        let stats = clock.stats();
        writeln!(
            f,
            "page faults {} of {} accesses",
            stats.misses,
            stats.accesses()
        )?;
        let status = vm.thrashing();
        let color = if status.thrashing {
            Color::Red
        } else {
            Color::Green
        };
        writeln!(f, "{}", WithFg::new(color, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_op() {
        let p1 = Pid::from_raw(1);
        assert_eq!("new:4".parse::<Op>(), Ok(Op::New(4)));
        assert_eq!(
            "r:1:0".parse::<Op>(),
            Ok(Op::Access(p1, 0, AccessType::Read))
        );
        assert_eq!(
            "w:P1:3".parse::<Op>(),
            Ok(Op::Access(p1, 3, AccessType::Write))
        );
        assert_eq!("kill:1".parse::<Op>(), Ok(Op::Kill(p1)));
        "r:1".parse::<Op>().unwrap_err();
        "r:x:1".parse::<Op>().unwrap_err();
        "swap:1".parse::<Op>().unwrap_err();
        for op in [
            Op::New(2),
            Op::Access(p1, 1, AccessType::Write),
            Op::Kill(p1),
        ] {
            assert_eq!(op.to_string().parse::<Op>(), Ok(op));
        }
    }

    #[test]
    fn test_snapshot() {
        ansi_term::set_enabled(false);
        let mut vm = VirtualMemory::new(VmConfig {
            frame_count: 2,
            ..VmConfig::default()
        })
        .unwrap();
        let pid = vm.create_process(2).unwrap();
        vm.access(pid, 1, AccessType::Write).unwrap();
        let text = Snapshot(&vm).to_string();
        assert!(text.contains("process 1 (2 pages):\n"));
        assert!(text.contains("  1-0    --- frame -\n"));
        assert!(text.contains("  1-1    PRM frame 0\n"));
        assert!(text.contains("frames:  1-1:1 >-\n"));
        assert!(text.contains("page faults 1 of 1 accesses"));
        assert!(text.contains("stable: demand 2 pages, 2 frames, threshold 3.0"));
    }
}

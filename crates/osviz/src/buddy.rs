use std::{fmt, str::FromStr};

use allocator::buddy::{AllocId, BlockState, BuddyAllocator, BuddyConfig};
use ansi_term::{Color, WithBg, WithFg};
use argh::FromArgs;
use snafu::ResultExt as _;
use snafu_utils::GenericError;

use crate::op;

/// Simulate a buddy allocator.
#[derive(Debug, FromArgs)]
#[argh(
    subcommand,
    name = "buddy",
    example = "osviz buddy alloc:100 alloc:64 free:A1"
)]
pub struct Args {
    /// total memory in bytes, a power of two
    #[argh(option, default = "BuddyConfig::default().total_size")]
    total: usize,
    /// smallest block in bytes, a power of two
    #[argh(option, default = "BuddyConfig::default().min_block")]
    min_block: usize,
    /// operations: `alloc:<bytes>`, `free:<id>` or `reset`
    #[argh(positional)]
    ops: Vec<Op>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Alloc(usize),
    Free(AllocId),
    Reset,
}

impl FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = op::split(s);
        match name {
            "alloc" | "a" => Ok(Self::Alloc(op::number(
                "size",
                op::required(name, arg)?,
            )?)),
            "free" | "f" => {
                let id = op::required(name, arg)?;
                let raw = id.strip_prefix(['A', 'a']).unwrap_or(id);
                Ok(Self::Free(AllocId::from_raw(op::number("allocation id", raw)?)))
            }
            "reset" => Ok(Self::Reset),
            _ => Err(format!("unknown buddy operation `{s}`")),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc(size) => write!(f, "alloc:{size}"),
            Self::Free(id) => write!(f, "free:{id}"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

pub fn run(args: &Args) -> Result<(), GenericError> {
    let config = BuddyConfig {
        total_size: args.total,
        min_block: args.min_block,
    };
    debug!("buddy allocator: {config:?}");
    let mut buddy =
        BuddyAllocator::new(config).whatever_context("invalid buddy allocator configuration")?;

    for op in &args.ops {
        println!("{}", WithFg::new(Color::Cyan, format_args!("> {op}")));
        let result = match *op {
            Op::Alloc(size) => buddy.allocate(size).map(drop),
            Op::Free(id) => buddy.free(id),
            Op::Reset => {
                buddy.reset();
                println!("  reset to one free {} byte block", config.total_size);
                Ok(())
            }
        };
        for event in buddy.events() {
            println!("  {event}");
        }
        if let Err(err) = result {
            warn!("{op} rejected: {err}");
        }
        trace!("memory: [{}]", MemoryBar(&buddy));
    }

    println!();
    print!("{}", Snapshot(&buddy));
    Ok(())
}

const BAR_CELLS: usize = 64;

/// Memory map at most [`BAR_CELLS`] wide. A cell covers at least one minimum
/// block and is drawn as used when any byte in it is allocated.
struct MemoryBar<'a>(&'a BuddyAllocator);

impl fmt::Display for MemoryBar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0.config();
        let cell = (config.total_size / BAR_CELLS).max(config.min_block);
        let mut used = vec![false; config.total_size / cell];
        for block in self.0.blocks() {
            if block.state.is_allocated() {
                let first = block.offset / cell;
                let last = (block.offset + block.size - 1) / cell;
                used[first..=last].fill(true);
            }
        }
        for run in used.chunk_by(|a, b| a == b) {
            let (color, mark) = if run[0] {
                (Color::Red, "#")
            } else {
                (Color::Green, ".")
            };
            write!(f, "{}", WithBg::new(color, mark.repeat(run.len())))?;
        }
        Ok(())
    }
}

/// Block tree, memory map and usage totals.
struct Snapshot<'a>(&'a BuddyAllocator);

impl fmt::Display for Snapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buddy = self.0;
        writeln!(f, "blocks:")?;
        for block in buddy.blocks() {
            let indent = "  ".repeat(block.depth + 1);
            write!(f, "{indent}{}@{} ", block.size, block.offset)?;
            match block.state {
                BlockState::Free => writeln!(f, "{}", WithFg::new(Color::Green, "free"))?,
                BlockState::Split => writeln!(f, "{}", WithFg::new(Color::DarkGray, "split"))?,
                BlockState::Allocated(id) => {
                    let requested = buddy.allocation(id).map_or(0, |a| a.requested);
                    writeln!(
                        f,
                        "{}",
                        WithFg::new(
                            Color::Red,
                            format_args!("{id} ({requested} bytes requested)")
                        )
                    )?;
                }
            }
        }
        writeln!(f, "memory: [{}]", MemoryBar(buddy))?;
        writeln!(
            f,
            "free {} bytes, allocated {} bytes, largest free block {} bytes",
            buddy.free_bytes(),
            buddy.allocated_bytes(),
            buddy.largest_free_block()
        )?;
        let wasted: usize = buddy.allocations().map(|a| a.size - a.requested).sum();
        if wasted > 0 {
            writeln!(f, "internal fragmentation {wasted} bytes")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_op() {
        assert_eq!("alloc:100".parse::<Op>(), Ok(Op::Alloc(100)));
        assert_eq!("a:5".parse::<Op>(), Ok(Op::Alloc(5)));
        assert_eq!("free:A3".parse::<Op>(), Ok(Op::Free(AllocId::from_raw(3))));
        assert_eq!("f:7".parse::<Op>(), Ok(Op::Free(AllocId::from_raw(7))));
        assert_eq!("reset".parse::<Op>(), Ok(Op::Reset));
        "alloc".parse::<Op>().unwrap_err();
        "alloc:x".parse::<Op>().unwrap_err();
        "grow:1".parse::<Op>().unwrap_err();
    }

    #[test]
    fn test_op_display_parses_back() {
        for op in [Op::Alloc(64), Op::Free(AllocId::from_raw(2)), Op::Reset] {
            assert_eq!(op.to_string().parse::<Op>(), Ok(op));
        }
    }

    #[test]
    fn test_render_after_split() {
        ansi_term::set_enabled(false);
        let mut buddy = BuddyAllocator::new(BuddyConfig::default()).unwrap();
        buddy.allocate(100).unwrap();
        let text = Snapshot(&buddy).to_string();
        assert!(text.contains("        128@0 A1 (100 bytes requested)\n"));
        assert!(text.contains("    512@512 free\n"));
        let bar = "#".repeat(8) + &".".repeat(56);
        assert!(text.contains(&format!("memory: [{bar}]")));
        assert!(text.contains("internal fragmentation 28 bytes"));
    }

    #[test]
    fn test_render_huge_region() {
        ansi_term::set_enabled(false);
        let mut buddy = BuddyAllocator::new(BuddyConfig {
            total_size: 1 << (usize::BITS - 1),
            min_block: 1,
        })
        .unwrap();
        buddy.allocate(100).unwrap();
        let text = Snapshot(&buddy).to_string();
        let bar = "#".to_owned() + &".".repeat(BAR_CELLS - 1);
        assert!(text.contains(&format!("memory: [{bar}]\n")));
        assert!(text.contains("128@0 A1 (100 bytes requested)\n"));
    }

    #[test]
    fn test_bar_marks_partially_used_cells() {
        ansi_term::set_enabled(false);
        let mut buddy = BuddyAllocator::new(BuddyConfig {
            total_size: 4096,
            min_block: 16,
        })
        .unwrap();
        buddy.allocate(16).unwrap();
        let bar = MemoryBar(&buddy).to_string();
        assert_eq!(bar.len(), BAR_CELLS);
        assert_eq!(bar, "#".to_owned() + &".".repeat(BAR_CELLS - 1));
    }
}

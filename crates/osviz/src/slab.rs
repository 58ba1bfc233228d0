use std::{fmt, str::FromStr};

use allocator::slab::{ObjectRef, SlabAllocator, SlabConfig, SlabId};
use ansi_term::{Color, WithFg};
use argh::FromArgs;
use snafu::ResultExt as _;
use snafu_utils::GenericError;

use crate::op;

/// Simulate a slab allocator with named object caches.
#[derive(Debug, FromArgs)]
#[argh(
    subcommand,
    name = "slab",
    example = "osviz slab alloc:task_struct alloc:task_struct free:task_struct/S1/0 shrink:task_struct"
)]
pub struct Args {
    /// object slots per slab
    #[argh(option, default = "SlabConfig::default().objects_per_slab")]
    objects_per_slab: usize,
    /// cache to create, may be repeated (default: task_struct and inode_cache)
    #[argh(option)]
    cache: Vec<String>,
    /// operations: `alloc:<cache>`, `free:<cache>/S<slab>/<slot>`,
    /// `shrink:<cache>` or `reset`
    #[argh(positional)]
    ops: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Alloc(String),
    Free(ObjectRef),
    Shrink(String),
    Reset,
}

fn parse_object(s: &str) -> Result<ObjectRef, String> {
    let mut parts = s.split('/');
    let (Some(cache), Some(slab), Some(slot), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("object `{s}` is not of the form <cache>/S<slab>/<slot>"));
    };
    let slab = slab.strip_prefix(['S', 's']).unwrap_or(slab);
    Ok(ObjectRef {
        cache: cache.to_owned(),
        slab: SlabId::from_raw(op::number("slab id", slab)?),
        slot: op::number("slot", slot)?,
    })
}

impl FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = op::split(s);
        match name {
            "alloc" | "a" => Ok(Self::Alloc(op::required(name, arg)?.to_owned())),
            "free" | "f" => Ok(Self::Free(parse_object(op::required(name, arg)?)?)),
            "shrink" => Ok(Self::Shrink(op::required(name, arg)?.to_owned())),
            "reset" => Ok(Self::Reset),
            _ => Err(format!("unknown slab operation `{s}`")),
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alloc(cache) => write!(f, "alloc:{cache}"),
            Self::Free(obj) => write!(f, "free:{obj}"),
            Self::Shrink(cache) => write!(f, "shrink:{cache}"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

pub fn run(args: &Args) -> Result<(), GenericError> {
    let mut config = SlabConfig {
        objects_per_slab: args.objects_per_slab,
        ..SlabConfig::default()
    };
    if !args.cache.is_empty() {
        config.caches.clone_from(&args.cache);
    }
    debug!("slab allocator: {config:?}");
    let mut slabs = SlabAllocator::new(config).whatever_context("invalid slab configuration")?;

    for op in &args.ops {
        println!("{}", WithFg::new(Color::Cyan, format_args!("> {op}")));
        let result = match op {
            Op::Alloc(cache) => slabs.allocate(cache).map(drop),
            Op::Free(obj) => slabs.free(obj),
            Op::Shrink(cache) => slabs.shrink(cache).map(|released| {
                if released == 0 {
                    println!("  no empty slabs in {cache}");
                }
            }),
            Op::Reset => {
                slabs.reset();
                println!("  released every slab");
                Ok(())
            }
        };
        for event in slabs.events() {
            println!("  {event}");
        }
        if let Err(err) = result {
            warn!("{op} rejected: {err}");
        }
    }

    println!();
    println!("caches:");
    for line in slabs.summary() {
        println!("  {line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_op() {
        assert_eq!(
            "alloc:inode_cache".parse::<Op>(),
            Ok(Op::Alloc("inode_cache".to_owned()))
        );
        assert_eq!(
            "free:task_struct/S2/3".parse::<Op>(),
            Ok(Op::Free(ObjectRef {
                cache: "task_struct".to_owned(),
                slab: SlabId::from_raw(2),
                slot: 3,
            }))
        );
        assert_eq!(
            "shrink:task_struct".parse::<Op>(),
            Ok(Op::Shrink("task_struct".to_owned()))
        );
        assert_eq!("reset".parse::<Op>(), Ok(Op::Reset));
        "free:task_struct/S1".parse::<Op>().unwrap_err();
        "free:task_struct/S1/0/1".parse::<Op>().unwrap_err();
        "free:task_struct/Sx/0".parse::<Op>().unwrap_err();
        "alloc".parse::<Op>().unwrap_err();
    }

    #[test]
    fn test_free_handle_matches_display() {
        let mut slabs = SlabAllocator::new(SlabConfig::default()).unwrap();
        let obj = slabs.allocate("task_struct").unwrap();
        let op = format!("free:{obj}").parse::<Op>().unwrap();
        assert_eq!(op, Op::Free(obj));
    }
}
